//! Quarry — a supervisory control loop for autonomous volume excavation
//! over a high-latency link.
//!
//! The engine drives a remote agent through a rectangular region one block
//! at a time: plan a serpentine traversal, approach each target, dig it,
//! wait for the server to confirm the block is gone, persist progress, and
//! repeat. Everything that can go wrong on a laggy link — slow ticks,
//! rubber-banding, stuck agents, dropped confirmations — is handled by
//! adaptive timing and an escalating recovery ladder rather than fixed
//! timeouts.
//!
//! # Architecture
//!
//! - [`engine::ExcavationEngine`]: the run loop and its control surface
//!   (`start`, `pause`, `resume`, `stop`, `go_to_base`).
//! - [`traversal::TraversalPlan`]: pure serpentine ordering over the
//!   region, indexable for O(1) resume.
//! - [`timing::AdaptiveTiming`]: every timeout, delay, and threshold
//!   derived from a sliding window of observed latency and tick rate.
//! - [`recovery::RecoverySystem`]: stuck detection (suffocation, stalls,
//!   movement loops, rubber-banding) feeding a 0–5 escalation ladder.
//! - [`navigator::Navigator`]: goal-directed movement with per-mode
//!   budgets and a stall watchdog.
//! - [`capabilities`]: the trait seam to the actual world — tests plug in
//!   fakes, production plugs in the real client.
//!
//! All components communicate outward through a broadcast [`events`] bus;
//! nothing in the crate blocks on a slow observer.

pub mod capabilities;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod events;
pub mod navigator;
pub mod progress;
pub mod recovery;
pub mod region;
pub mod state;
pub mod timeout;
pub mod timing;
pub mod traversal;

pub use capabilities::{
    AgentBody, Collaborators, ControlInput, Digger, Goal, GoalSolver, Inventory, StuckReason,
    Sustenance, TelemetrySource, ToolBelt, WorldQuery,
};
pub use config::QuarryConfig;
pub use engine::ExcavationEngine;
pub use error::{MinerError, MinerResult};
pub use events::{EventBus, QuarryEvent, SharedEventBus};
pub use navigator::NavMode;
pub use recovery::RecoverySystem;
pub use region::{BlockInfo, BlockPos, NormalizedRegion, Region, Vec3};
pub use state::{ExcavationState, MinerStatus, PauseReason};
pub use traversal::TraversalPlan;
