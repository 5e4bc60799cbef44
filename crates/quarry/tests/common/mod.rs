//! Shared in-memory world fake backing the integration tests.
//!
//! One `FakeWorld` implements every collaborator trait; tests mutate its
//! knobs (latency, inventory fullness, hung solver) mid-run to drive the
//! engine through its pause and failure paths.

// Not every test binary uses every knob.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use quarry::{
    AgentBody, BlockInfo, BlockPos, Collaborators, ControlInput, Digger, Goal, GoalSolver,
    Inventory, NormalizedRegion, Sustenance, TelemetrySource, ToolBelt, Vec3, WorldQuery,
};

pub fn stone() -> BlockInfo {
    BlockInfo {
        name: "stone".into(),
        diggable: true,
        passable: false,
        hardness: Some(1.5),
    }
}

pub fn bedrock() -> BlockInfo {
    BlockInfo {
        name: "bedrock".into(),
        diggable: false,
        passable: false,
        hardness: None,
    }
}

/// Solid, finite hardness, but no tool can touch it.
pub fn reinforced_deepslate() -> BlockInfo {
    BlockInfo {
        name: "reinforced_deepslate".into(),
        diggable: false,
        passable: false,
        hardness: Some(55.0),
    }
}

pub fn air() -> BlockInfo {
    BlockInfo {
        name: "air".into(),
        diggable: false,
        passable: true,
        hardness: Some(0.0),
    }
}

#[derive(Default)]
pub struct FakeWorld {
    pub blocks: Mutex<HashMap<BlockPos, BlockInfo>>,
    pub position: Mutex<Vec3>,
    pub yaw: Mutex<f64>,
    pub health: Mutex<f32>,
    pub food: Mutex<u32>,
    pub latency: Mutex<f64>,
    pub tick_rate: Mutex<f64>,
    pub overlaps: Mutex<Vec<BlockPos>>,
    pub inventory_full: AtomicBool,
    pub storage_accepts: AtomicBool,
    /// When set, digs complete but the block stays in the map.
    pub stubborn: AtomicBool,
    /// When set, `solve` never returns.
    pub solver_hangs: AtomicBool,
    pub dig_log: Mutex<Vec<BlockPos>>,
    pub goals: Mutex<Vec<Goal>>,
    pub controls: Mutex<HashMap<ControlInput, bool>>,
    pub solver_cancels: Mutex<u32>,
}

/// Capture traces per test; `RUST_LOG` filters as usual. Subsequent calls
/// in the same binary are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl FakeWorld {
    pub fn new() -> Arc<Self> {
        init_tracing();
        let world = Self {
            health: Mutex::new(20.0),
            food: Mutex::new(20),
            latency: Mutex::new(50.0),
            tick_rate: Mutex::new(20.0),
            ..Self::default()
        };
        Arc::new(world)
    }

    /// Fill `region` with stone.
    pub fn fill_stone(&self, region: &NormalizedRegion) {
        let mut blocks = self.blocks.lock().unwrap();
        for x in region.min.x..=region.max.x {
            for y in region.min.y..=region.max.y {
                for z in region.min.z..=region.max.z {
                    blocks.insert(BlockPos::new(x, y, z), stone());
                }
            }
        }
    }

    pub fn set_block(&self, pos: BlockPos, block: BlockInfo) {
        self.blocks.lock().unwrap().insert(pos, block);
    }

    pub fn set_latency(&self, ms: f64) {
        *self.latency.lock().unwrap() = ms;
    }

    pub fn dig_count(&self) -> usize {
        self.dig_log.lock().unwrap().len()
    }

    pub fn dug(&self, pos: BlockPos) -> bool {
        self.dig_log.lock().unwrap().contains(&pos)
    }

    /// Bundle this fake behind every collaborator seam.
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            solver: Arc::clone(self) as Arc<dyn GoalSolver>,
            world: Arc::clone(self) as Arc<dyn WorldQuery>,
            digger: Arc::clone(self) as Arc<dyn Digger>,
            body: Arc::clone(self) as Arc<dyn AgentBody>,
            tools: Arc::clone(self) as Arc<dyn ToolBelt>,
            inventory: Arc::clone(self) as Arc<dyn Inventory>,
            sustenance: Arc::clone(self) as Arc<dyn Sustenance>,
            telemetry: Arc::clone(self) as Arc<dyn TelemetrySource>,
        }
    }
}

#[async_trait]
impl GoalSolver for FakeWorld {
    async fn solve(&self, goal: Goal) -> Result<()> {
        self.goals.lock().unwrap().push(goal);
        if self.solver_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let target = match goal {
            Goal::Near { point, .. } | Goal::Exact { point, .. } => point,
            Goal::Horizontal { x, z } => {
                let y = self.position.lock().unwrap().y;
                Vec3::new(x as f64, y, z as f64)
            }
        };
        *self.position.lock().unwrap() = target;
        Ok(())
    }

    async fn cancel(&self) {
        *self.solver_cancels.lock().unwrap() += 1;
    }

    fn set_speed(&self, _multiplier: f64) {}
}

impl WorldQuery for FakeWorld {
    fn block_at(&self, pos: BlockPos) -> Option<BlockInfo> {
        Some(
            self.blocks
                .lock()
                .unwrap()
                .get(&pos)
                .cloned()
                .unwrap_or_else(air),
        )
    }

    fn visible(&self, _pos: BlockPos) -> bool {
        true
    }
}

#[async_trait]
impl Digger for FakeWorld {
    async fn dig(&self, pos: BlockPos) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.dig_log.lock().unwrap().push(pos);
        if !self.stubborn.load(Ordering::SeqCst) {
            self.blocks.lock().unwrap().remove(&pos);
        }
        Ok(())
    }

    async fn cancel_dig(&self) {}
}

impl AgentBody for FakeWorld {
    fn position(&self) -> Vec3 {
        *self.position.lock().unwrap()
    }

    fn yaw(&self) -> f64 {
        *self.yaw.lock().unwrap()
    }

    fn on_ground(&self) -> bool {
        true
    }

    fn health(&self) -> f32 {
        *self.health.lock().unwrap()
    }

    fn food(&self) -> u32 {
        *self.food.lock().unwrap()
    }

    fn overlapping_blocks(&self) -> Vec<BlockPos> {
        self.overlaps.lock().unwrap().clone()
    }

    fn set_control(&self, input: ControlInput, state: bool) {
        self.controls.lock().unwrap().insert(input, state);
    }

    fn clear_controls(&self) {
        self.controls.lock().unwrap().clear();
    }

    fn look_at(&self, _point: Vec3) {}
}

impl ToolBelt for FakeWorld {
    fn should_excavate(&self, block: &BlockInfo) -> bool {
        block.name != "chest"
    }

    fn equip_for(&self, _block: &BlockInfo) -> Result<String> {
        Ok("pickaxe".into())
    }
}

#[async_trait]
impl Inventory for FakeWorld {
    fn is_full(&self) -> bool {
        self.inventory_full.load(Ordering::SeqCst)
    }

    async fn deposit_to_storage(&self, _region: &NormalizedRegion) -> Result<bool> {
        if self.storage_accepts.load(Ordering::SeqCst) {
            self.inventory_full.store(false, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl Sustenance for FakeWorld {
    async fn maintain(&self, threshold: u32) -> Result<()> {
        let mut food = self.food.lock().unwrap();
        if *food < threshold.min(20) {
            *food = 20;
        }
        Ok(())
    }
}

impl TelemetrySource for FakeWorld {
    fn latency_ms(&self) -> f64 {
        *self.latency.lock().unwrap()
    }

    fn tick_rate(&self) -> f64 {
        *self.tick_rate.lock().unwrap()
    }
}
