//! Collaborator capabilities consumed by the control loop.
//!
//! The engine never talks to the session or the world directly; everything
//! external arrives through these traits, bundled into an immutable
//! [`Collaborators`] struct at construction. Implementations are expected to
//! be cheap to call and to surface transport problems as `anyhow` errors —
//! the engine decides which of those are fatal.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::region::{BlockInfo, BlockPos, NormalizedRegion, Vec3};

/// A movement goal handed to the underlying solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    /// Get within `range` of `point`.
    Near { point: Vec3, range: f64 },
    /// Reach the column at `(x, z)` at any height.
    Horizontal { x: i32, z: i32 },
    /// Reach `point` within `range`, for long-haul travel.
    Exact { point: Vec3, range: f64 },
}

/// Held movement control input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlInput {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Sneak,
}

/// Reason a stuck event was raised, attached to recovery telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckReason {
    /// Bounding volume overlapping solid terrain.
    Suffocation,
    /// No displacement while a navigation goal was active.
    Stall,
    /// Returning to the same spot repeatedly.
    Loop,
}

impl std::fmt::Display for StuckReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suffocation => write!(f, "suffocation"),
            Self::Stall => write!(f, "stall"),
            Self::Loop => write!(f, "loop"),
        }
    }
}

/// Movement goal solver (pathfinder).
#[async_trait]
pub trait GoalSolver: Send + Sync {
    /// Solve and execute movement toward `goal`; resolves when the goal is
    /// reached or errors when the solver gives up.
    async fn solve(&self, goal: Goal) -> Result<()>;

    /// Cancel the in-flight solve, if any.
    async fn cancel(&self);

    /// Scale movement speed (1.0 = full speed).
    fn set_speed(&self, multiplier: f64);
}

/// Read-only world queries.
pub trait WorldQuery: Send + Sync {
    /// Block at `pos`, or `None` when the chunk is not loaded.
    fn block_at(&self, pos: BlockPos) -> Option<BlockInfo>;

    /// Whether the agent has line of sight to the block.
    fn visible(&self, pos: BlockPos) -> bool;
}

/// Destructive block-breaking actions.
#[async_trait]
pub trait Digger: Send + Sync {
    /// Break the block at `pos`; resolves when the client-side dig
    /// completes.
    async fn dig(&self, pos: BlockPos) -> Result<()>;

    /// Abort the dig in progress.
    async fn cancel_dig(&self);
}

/// The agent's own body: pose, vitals, and control inputs.
pub trait AgentBody: Send + Sync {
    fn position(&self) -> Vec3;
    fn yaw(&self) -> f64;
    fn on_ground(&self) -> bool;
    fn health(&self) -> f32;
    fn food(&self) -> u32;

    /// Blocks currently intersecting the agent's bounding volume.
    fn overlapping_blocks(&self) -> Vec<BlockPos>;

    fn set_control(&self, input: ControlInput, state: bool);
    fn clear_controls(&self);
    fn look_at(&self, point: Vec3);
}

/// Tool selection for destructive actions.
pub trait ToolBelt: Send + Sync {
    /// Whether this block is worth excavating at all (skips air, fluids,
    /// and terrain no tool can break).
    fn should_excavate(&self, block: &BlockInfo) -> bool;

    /// Equip the best tool for `block`; returns the equipped tool's name.
    fn equip_for(&self, block: &BlockInfo) -> Result<String>;
}

/// Inventory state and storage deposits.
#[async_trait]
pub trait Inventory: Send + Sync {
    fn is_full(&self) -> bool;

    /// Deposit the haul into storage near `region`; `Ok(false)` means no
    /// storage accepted the deposit.
    async fn deposit_to_storage(&self, region: &NormalizedRegion) -> Result<bool>;
}

/// Hunger upkeep.
#[async_trait]
pub trait Sustenance: Send + Sync {
    /// Eat as needed to keep food at or above `threshold`.
    async fn maintain(&self, threshold: u32) -> Result<()>;
}

/// Live link telemetry.
pub trait TelemetrySource: Send + Sync {
    /// Current round-trip latency in milliseconds.
    fn latency_ms(&self) -> f64;

    /// Server tick rate (nominal 20/s).
    fn tick_rate(&self) -> f64;
}

/// Immutable bundle of every collaborator, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub solver: Arc<dyn GoalSolver>,
    pub world: Arc<dyn WorldQuery>,
    pub digger: Arc<dyn Digger>,
    pub body: Arc<dyn AgentBody>,
    pub tools: Arc<dyn ToolBelt>,
    pub inventory: Arc<dyn Inventory>,
    pub sustenance: Arc<dyn Sustenance>,
    pub telemetry: Arc<dyn TelemetrySource>,
}
