//! The excavation engine — the supervisory loop that drives one region
//! from `start` to `finished`.
//!
//! `start` validates, plans, and spawns the run loop; `pause`, `resume`,
//! and `stop` are cheap control operations against shared state. The loop
//! itself owns all state mutation: everyone else reads snapshots.
//!
//! Stopping is not failing. `stop` fires a cancellation token and the
//! loop winds down to `Idle` without surfacing an error; only genuine
//! failures land in `Error`.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capabilities::{Collaborators, ToolBelt};
use crate::config::QuarryConfig;
use crate::confirm::ConfirmationWaiter;
use crate::error::{MinerError, MinerResult};
use crate::events::{EventBus, QuarryEvent, SharedEventBus};
use crate::navigator::{NavMode, Navigator};
use crate::progress::{PersistedProgress, ProgressStore};
use crate::recovery::RecoverySystem;
use crate::region::{BlockInfo, BlockPos, Region};
use crate::state::{ExcavationState, MinerStatus, PauseReason};
use crate::timeout::with_timeout;
use crate::timing::AdaptiveTiming;
use crate::traversal::TraversalPlan;

/// Poll period while waiting out a pause condition.
const PAUSE_POLL: std::time::Duration = std::time::Duration::from_millis(500);

/// Grace period after cancelling a timed-out dig, so the cancellation can
/// take effect server-side before the next attempt starts.
const DIG_CANCEL_GRACE: std::time::Duration = std::time::Duration::from_millis(250);

/// How the run loop ended.
enum RunOutcome {
    Completed,
    Stopped,
    Failed(MinerError),
}

/// How one attempt at one target ended.
enum Attempt {
    /// Dug and confirmed gone.
    Cleared,
    /// Nothing to do here (air, excluded, or unresolvable); advance.
    Skip,
    /// Recoverable failure; the next attempt retries.
    Retry(MinerError),
    /// The run itself must end.
    Abort(RunOutcome),
}

pub struct ExcavationEngine {
    deps: Collaborators,
    config: QuarryConfig,
    timing: AdaptiveTiming,
    events: SharedEventBus,
    recovery: Arc<RecoverySystem>,
    navigator: Navigator,
    confirm: ConfirmationWaiter,
    store: ProgressStore,
    state: Mutex<ExcavationState>,
    cancel: Mutex<Option<CancellationToken>>,
    run_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every `start`; a superseded run loop skips finalization.
    generation: std::sync::atomic::AtomicU64,
}

impl ExcavationEngine {
    pub fn new(deps: Collaborators, config: QuarryConfig) -> Arc<Self> {
        let timing = AdaptiveTiming::new(Arc::clone(&deps.telemetry));
        let events = EventBus::new().shared();
        let recovery = RecoverySystem::new(deps.clone(), timing.clone(), Arc::clone(&events));
        let navigator = Navigator::new(deps.clone(), timing.clone(), Arc::clone(&recovery));
        let confirm = ConfirmationWaiter::new(Arc::clone(&deps.world), timing.clone());
        let store = ProgressStore::new(config.progress_path.clone());
        Arc::new(Self {
            deps,
            config,
            timing,
            events,
            recovery,
            navigator,
            confirm,
            store,
            state: Mutex::new(ExcavationState::new()),
            cancel: Mutex::new(None),
            run_task: Mutex::new(None),
            generation: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Event stream for observers. Slow subscribers lag, never block.
    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Read-only snapshot of the run state, with vitals and link quality
    /// refreshed from the collaborators.
    pub fn state(&self) -> ExcavationState {
        let mut snapshot = self.state.lock().unwrap().clone();
        snapshot.vitals.health = self.deps.body.health();
        snapshot.vitals.food = self.deps.body.food();
        snapshot.network.latency_ms = self.timing.latency_ms();
        snapshot.network.tick_rate = self.timing.tick_rate();
        snapshot.last_position = Some(self.deps.body.position());
        snapshot
    }

    /// Begin excavating a region from `start_index` along the serpentine
    /// order. Corner order does not matter; the region is normalized before
    /// planning. A fresh start (index 0) while a run is live is rejected;
    /// a nonzero index supersedes the live run, which is how a resume
    /// restarts an interrupted region. Starting during base travel is
    /// rejected as busy regardless of index.
    pub fn start(self: &Arc<Self>, region: Region, start_index: u64) -> MinerResult<()> {
        let normalized = region.normalized();
        let plan = TraversalPlan::new(normalized);
        let start_index = start_index.min(plan.len());

        {
            let mut state = self.state.lock().unwrap();
            if state.status == MinerStatus::Traveling {
                return Err(MinerError::BotBusy {
                    state: state.status.to_string(),
                });
            }
            if state.status.is_active() && start_index == 0 {
                return Err(MinerError::AlreadyMining);
            }
            state.status = MinerStatus::Mining;
            state.pause_reason = None;
            state.error = None;
            state.region = Some(normalized);
            state.total_targets = plan.len();
            state.mined = start_index;
        }

        info!(region = %normalized, targets = plan.len(), start_index, "excavation started");
        self.events.publish(QuarryEvent::Started {
            region: normalized,
            timestamp: Utc::now(),
        });

        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let token = CancellationToken::new();
        if let Some(old) = self.cancel.lock().unwrap().replace(token.clone()) {
            old.cancel();
        }
        self.recovery.enable();

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.run(plan, start_index, generation, token).await;
        });
        *self.run_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Operator pause. No-op unless mining.
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status != MinerStatus::Mining {
            return;
        }
        state.status = MinerStatus::Paused;
        state.pause_reason = Some(PauseReason::Manual);
        drop(state);
        self.persist();
        info!("excavation paused by operator");
        self.events.publish(QuarryEvent::Paused {
            reason: PauseReason::Manual,
            timestamp: Utc::now(),
        });
    }

    /// Operator resume. Only lifts a manual pause; condition-driven pauses
    /// lift themselves when the condition clears.
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status != MinerStatus::Paused
            || state.pause_reason != Some(PauseReason::Manual)
        {
            return;
        }
        state.status = MinerStatus::Mining;
        state.pause_reason = None;
        drop(state);
        info!("excavation resumed by operator");
        self.events.publish(QuarryEvent::Resumed {
            timestamp: Utc::now(),
        });
    }

    /// Stop the run and discard the persisted checkpoint. Resuming after a
    /// stop is a fresh `start` with an explicit index.
    pub async fn stop(&self) {
        let token = self.cancel.lock().unwrap().take();
        let Some(token) = token else { return };
        info!("excavation stopping");
        token.cancel();
        self.deps.solver.cancel().await;
        self.deps.digger.cancel_dig().await;
        self.deps.body.clear_controls();
        let handle = self.run_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Restart the run recorded in the progress file, if any. Returns
    /// whether a run was resumed.
    pub fn resume_if_needed(self: &Arc<Self>) -> MinerResult<bool> {
        let Some(saved) = self.store.load() else {
            return Ok(false);
        };
        if saved.mined >= TraversalPlan::new(saved.region).len() {
            debug!("persisted progress is already complete; clearing");
            self.store.clear();
            return Ok(false);
        }
        info!(region = %saved.region, mined = saved.mined, "resuming persisted run");
        self.start(
            Region {
                corner_a: saved.region.min,
                corner_b: saved.region.max,
            },
            saved.mined,
        )?;
        Ok(true)
    }

    /// Travel to the configured base. Mutually exclusive with a run.
    pub async fn go_to_base(&self) -> MinerResult<()> {
        let base = self.config.base.ok_or(MinerError::BaseNotConfigured)?;
        {
            let mut state = self.state.lock().unwrap();
            if state.status.is_active() || state.status == MinerStatus::Traveling {
                return Err(MinerError::BotBusy {
                    state: state.status.to_string(),
                });
            }
            state.status = MinerStatus::Traveling;
        }
        info!(?base, "traveling to base");
        let result = self
            .navigator
            .goto_near(base, self.config.base_range, NavMode::Travel)
            .await;
        let mut state = self.state.lock().unwrap();
        match &result {
            Ok(()) => state.status = MinerStatus::Idle,
            Err(err) => {
                state.status = MinerStatus::Error;
                state.error = Some(format!("failed to reach base: {err}"));
            }
        }
        result
    }

    async fn run(
        self: Arc<Self>,
        plan: TraversalPlan,
        start_index: u64,
        generation: u64,
        token: CancellationToken,
    ) {
        let mut outcome = self.mine_plan(&plan, start_index, &token).await;
        if self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation {
            // A newer start superseded this loop; its finalization wins.
            return;
        }
        // A failure that races with stop is expected cancellation.
        if token.is_cancelled() && matches!(outcome, RunOutcome::Failed(_)) {
            outcome = RunOutcome::Stopped;
        }
        self.recovery.disable();
        self.deps.body.clear_controls();

        match outcome {
            RunOutcome::Completed => {
                self.store.clear();
                let mut state = self.state.lock().unwrap();
                state.status = MinerStatus::Finished;
                state.pause_reason = None;
                drop(state);
                info!("excavation finished");
                self.events.publish(QuarryEvent::Finished {
                    timestamp: Utc::now(),
                });
            }
            RunOutcome::Stopped => {
                self.store.clear();
                let mut state = self.state.lock().unwrap();
                state.status = MinerStatus::Idle;
                state.pause_reason = None;
                drop(state);
                info!("excavation stopped");
            }
            RunOutcome::Failed(err) => {
                self.persist();
                let message = err.to_string();
                let mut state = self.state.lock().unwrap();
                state.status = MinerStatus::Error;
                state.error = Some(message.clone());
                drop(state);
                warn!(error = %message, "excavation failed");
                self.events.publish(QuarryEvent::Error {
                    message,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    async fn mine_plan(
        &self,
        plan: &TraversalPlan,
        start_index: u64,
        token: &CancellationToken,
    ) -> RunOutcome {
        for index in start_index..plan.len() {
            if token.is_cancelled() {
                return RunOutcome::Stopped;
            }
            if let Err(outcome) = self.between_targets(token).await {
                return outcome;
            }

            // coordinate_at is total over 0..len.
            let Some(target) = plan.coordinate_at(index) else {
                return RunOutcome::Failed(MinerError::Capability(anyhow::anyhow!(
                    "traversal index {index} out of bounds"
                )));
            };

            match self.process_target(target, token).await {
                Ok(()) => {}
                Err(outcome) => return outcome,
            }

            let mined = {
                let mut state = self.state.lock().unwrap();
                state.mined = index + 1;
                state.mined
            };
            self.events.publish(QuarryEvent::Progress {
                mined,
                total: plan.len(),
                timestamp: Utc::now(),
            });
            if mined % self.config.persist_interval == 0 {
                self.persist();
            }

            tokio::select! {
                _ = token.cancelled() => return RunOutcome::Stopped,
                _ = tokio::time::sleep(self.timing.inter_step_delay()) => {}
            }
        }
        RunOutcome::Completed
    }

    /// Gates evaluated before every target: manual pause, vitals, hunger,
    /// link quality, and inventory capacity. `Err` carries the loop's
    /// final outcome when a gate aborts the run.
    async fn between_targets(&self, token: &CancellationToken) -> Result<(), RunOutcome> {
        // Degraded link: hold until the window recovers. Progress is
        // untouched either side of the pause.
        if self.timing.auto_pause() {
            self.enter_pause(PauseReason::HighPing);
            self.wait_while(token, || {
                self.timing.sample();
                self.timing.auto_pause()
            })
            .await?;
            self.leave_pause();
        }

        // Critically low vitals: pause, eat, wait for recovery.
        if self.deps.body.health() < self.config.critical_health
            || self.deps.body.food() < self.config.critical_food
        {
            self.enter_pause(PauseReason::Healing);
            loop {
                if let Err(err) = self.deps.sustenance.maintain(u32::MAX).await {
                    debug!(error = %err, "healing feed failed");
                }
                if self.deps.body.health() >= self.config.recovered_health
                    && self.deps.body.food() >= self.config.hunger_threshold
                {
                    break;
                }
                self.sleep_or_stop(token, PAUSE_POLL).await?;
            }
            self.leave_pause();
        }

        // Manual pause holds the loop in place.
        self.wait_while(token, || {
            let state = self.state.lock().unwrap();
            state.status == MinerStatus::Paused
                && state.pause_reason == Some(PauseReason::Manual)
        })
        .await?;

        // Routine hunger upkeep; failure here is not fatal.
        if let Err(err) = self
            .deps
            .sustenance
            .maintain(self.config.hunger_threshold)
            .await
        {
            debug!(error = %err, "hunger upkeep failed");
        }

        Ok(())
    }

    /// One target: bounded retries, then skip. A target that defeats all
    /// attempts never stalls the run.
    async fn process_target(
        &self,
        target: BlockPos,
        token: &CancellationToken,
    ) -> Result<(), RunOutcome> {
        for attempt in 1..=self.config.max_attempts {
            if token.is_cancelled() {
                return Err(RunOutcome::Stopped);
            }
            match self.attempt_target(target, token).await {
                Attempt::Cleared | Attempt::Skip => return Ok(()),
                Attempt::Retry(err) => {
                    warn!(%target, attempt, error = %err, "attempt failed; retrying");
                }
                Attempt::Abort(outcome) => return Err(outcome),
            }
        }
        warn!(%target, attempts = self.config.max_attempts, "attempts exhausted; skipping target");
        Ok(())
    }

    /// One attempt at one block, in strict order: clear self-overlaps,
    /// verify worth, deal with a full inventory, approach if out of reach
    /// or occluded, re-verify, equip, orient, re-verify reachability, dig
    /// against the adaptive budget, then wait for server confirmation.
    async fn attempt_target(&self, target: BlockPos, token: &CancellationToken) -> Attempt {
        self.recovery.clear_overlapping().await;

        // Worth check. A missing block here usually means an unloaded
        // chunk; the approach below resolves it.
        if let Some(block) = self.deps.world.block_at(target) {
            if !worth_excavating(&block, &*self.deps.tools) {
                debug!(%target, name = %block.name, "target not worth excavating; skipping");
                return Attempt::Skip;
            }
        }

        if self.deps.inventory.is_full() {
            match self.make_capacity(token).await {
                Ok(()) => {}
                Err(outcome) => return Attempt::Abort(outcome),
            }
        }

        // Approach when out of reach or occluded. Navigation failures are
        // swallowed; the next attempt retries from scratch.
        let center = target.center();
        let out_of_reach =
            self.deps.body.position().distance_to(&center) > self.config.reach_distance;
        if out_of_reach || !self.deps.world.visible(target) {
            if let Err(err) = self
                .navigator
                .goto_near(center, self.config.approach_range, NavMode::Mining)
                .await
            {
                debug!(%target, error = %err, "approach failed");
                return Attempt::Retry(err);
            }
        }

        // Re-verify after moving.
        let block = match self.deps.world.block_at(target) {
            Some(block) => block,
            None => {
                debug!(%target, "block unresolvable after approach; skipping");
                return Attempt::Skip;
            }
        };
        if !worth_excavating(&block, &*self.deps.tools) {
            debug!(%target, name = %block.name, "target not worth excavating; skipping");
            return Attempt::Skip;
        }

        match self.deps.tools.equip_for(&block) {
            Ok(tool) => self.state.lock().unwrap().current_tool = Some(tool),
            Err(err) => debug!(%target, error = %err, "equip failed; digging bare"),
        }
        self.deps.body.look_at(center);

        // Turning can put a corner of the world between us and the target.
        if !self.deps.world.visible(target) {
            return Attempt::Retry(MinerError::DigTimeout { pos: target });
        }

        let digger = &self.deps.digger;
        let dig = with_timeout(self.timing.dig_timeout(), digger.dig(target), async {
            digger.cancel_dig().await;
            tokio::time::sleep(DIG_CANCEL_GRACE).await;
        })
        .await;
        match dig.into_completed() {
            Some(Ok(())) => {}
            Some(Err(err)) => return Attempt::Abort(RunOutcome::Failed(err.into())),
            None => return Attempt::Retry(MinerError::DigTimeout { pos: target }),
        }

        // The server has the last word on whether the block is gone.
        if !self.confirm.wait_cleared(target).await {
            return Attempt::Retry(MinerError::DigTimeout { pos: target });
        }

        self.events.publish(QuarryEvent::BlockCleared {
            position: target,
            name: block.name,
            timestamp: Utc::now(),
        });
        self.recovery.checkpoint_here();
        self.persist();
        Attempt::Cleared
    }

    /// Try to deposit; failing that, pause until capacity frees up.
    async fn make_capacity(&self, token: &CancellationToken) -> Result<(), RunOutcome> {
        self.events.publish(QuarryEvent::InventoryFull {
            timestamp: Utc::now(),
        });
        let region = self.state.lock().unwrap().region;
        let deposited = match region {
            Some(region) => self
                .deps
                .inventory
                .deposit_to_storage(&region)
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "deposit failed");
                    false
                }),
            None => false,
        };
        if !deposited {
            warn!(error = %MinerError::InventoryFullNoStorage, "pausing until capacity frees");
            self.enter_pause(PauseReason::AwaitingCapacity);
            self.wait_while(token, || self.deps.inventory.is_full()).await?;
            self.leave_pause();
        }
        Ok(())
    }

    fn enter_pause(&self, reason: PauseReason) {
        {
            let mut state = self.state.lock().unwrap();
            state.status = MinerStatus::Paused;
            state.pause_reason = Some(reason);
        }
        self.persist();
        info!(%reason, "excavation auto-paused");
        self.events.publish(QuarryEvent::Paused {
            reason,
            timestamp: Utc::now(),
        });
    }

    fn leave_pause(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.status = MinerStatus::Mining;
            state.pause_reason = None;
        }
        info!("excavation auto-resumed");
        self.events.publish(QuarryEvent::Resumed {
            timestamp: Utc::now(),
        });
    }

    /// Polls `cond` until it turns false. `Err(Stopped)` on cancellation.
    async fn wait_while(
        &self,
        token: &CancellationToken,
        cond: impl Fn() -> bool,
    ) -> Result<(), RunOutcome> {
        while cond() {
            self.sleep_or_stop(token, PAUSE_POLL).await?;
        }
        Ok(())
    }

    async fn sleep_or_stop(
        &self,
        token: &CancellationToken,
        duration: std::time::Duration,
    ) -> Result<(), RunOutcome> {
        tokio::select! {
            _ = token.cancelled() => Err(RunOutcome::Stopped),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Write the checkpoint. Persistence failures are logged, never fatal.
    fn persist(&self) {
        let state = self.state.lock().unwrap();
        let Some(region) = state.region else {
            return;
        };
        let progress = PersistedProgress {
            region,
            mined: state.mined,
        };
        drop(state);
        if let Err(err) = self.store.save(&progress) {
            warn!(error = %err, "failed to persist progress");
        }
    }
}

/// Air and fluids need no work; indestructible or tool-refused terrain
/// gets none.
fn worth_excavating(block: &BlockInfo, tools: &dyn ToolBelt) -> bool {
    block.is_obstruction() && !block.is_indestructible() && tools.should_excavate(block)
}

impl std::fmt::Debug for ExcavationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExcavationEngine")
            .field("state", &self.state.lock().unwrap().summary())
            .finish()
    }
}
