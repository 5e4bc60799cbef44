//! Obstruction recovery — detection and escalation for stuck conditions.
//!
//! Two independently scheduled monitors (per-tick and periodic stall) feed
//! one escalation ladder. The ladder is a single integer level 0–5 owned by
//! this subsystem: triggers raise it to the adaptive floor, a failed
//! recovery escalates one level, a verified-clear recovery de-escalates
//! one. Re-entrancy is guarded by a flag rather than a lock held across
//! awaits — the monitors interleave on one runtime, they do not race.

mod ladder;
mod monitors;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::capabilities::{Collaborators, StuckReason};
use crate::events::{QuarryEvent, SharedEventBus};
use crate::region::{BlockPos, Vec3};
use crate::timing::AdaptiveTiming;

/// Highest ladder level.
pub const MAX_RECOVERY_LEVEL: u8 = 5;

/// Displacement per tick above this is a real teleport, not rubber-banding.
pub(crate) const TELEPORT_THRESHOLD: f64 = 20.0;

/// Checkpoints retained.
pub(crate) const MAX_CHECKPOINTS: usize = 15;

/// Minimum spacing between consecutive checkpoints.
pub(crate) const CHECKPOINT_SPACING: f64 = 1.0;

/// Mutable recovery bookkeeping, mutated only between awaits.
#[derive(Debug)]
pub(crate) struct RecoveryShared {
    /// Current ladder level, 0..=5.
    pub(crate) level: u8,
    /// Re-entrancy guard: one recovery at a time.
    pub(crate) in_recovery: bool,
    /// When the last recovery executed, for cooldown rate-limiting.
    pub(crate) last_recovery: Option<Instant>,
    /// Consecutive ticks spent overlapping solid terrain.
    pub(crate) stuck_ticks: u32,
    /// Whether the previous tick observed an overlap.
    pub(crate) was_overlapping: bool,
    /// Last known clear, grounded positions (most recent last).
    pub(crate) checkpoints: VecDeque<Vec3>,
}

impl RecoveryShared {
    fn new() -> Self {
        Self {
            level: 0,
            in_recovery: false,
            last_recovery: None,
            stuck_ticks: 0,
            was_overlapping: false,
            checkpoints: VecDeque::new(),
        }
    }

    pub(crate) fn push_checkpoint(&mut self, pos: Vec3) {
        if let Some(last) = self.checkpoints.back() {
            if last.distance_to(&pos) < CHECKPOINT_SPACING {
                return;
            }
        }
        if self.checkpoints.len() == MAX_CHECKPOINTS {
            self.checkpoints.pop_front();
        }
        self.checkpoints.push_back(pos);
    }
}

/// The recovery subsystem.
pub struct RecoverySystem {
    pub(crate) deps: Collaborators,
    pub(crate) timing: AdaptiveTiming,
    pub(crate) events: SharedEventBus,
    pub(crate) shared: Mutex<RecoveryShared>,
    /// Set by the navigator while a goal solve is in flight.
    goal_active: AtomicBool,
    /// Set by the navigator's stall-kick after a targeted clear; the stall
    /// monitor escalates instead of repeating the clear.
    pub(crate) stall_clear_attempted: AtomicBool,
    monitor_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RecoverySystem {
    pub fn new(deps: Collaborators, timing: AdaptiveTiming, events: SharedEventBus) -> Arc<Self> {
        Arc::new(Self {
            deps,
            timing,
            events,
            shared: Mutex::new(RecoveryShared::new()),
            goal_active: AtomicBool::new(false),
            stall_clear_attempted: AtomicBool::new(false),
            monitor_handles: Mutex::new(Vec::new()),
        })
    }

    /// Start both monitors. Idempotent: enabling twice leaves one pair.
    pub fn enable(self: &Arc<Self>) {
        let mut handles = self.monitor_handles.lock().unwrap();
        if !handles.is_empty() {
            return;
        }
        info!("recovery monitors enabled");
        handles.push(tokio::spawn(Arc::clone(self).tick_monitor_loop()));
        handles.push(tokio::spawn(Arc::clone(self).stall_monitor_loop()));
    }

    /// Stop the monitors and reset the ladder.
    pub fn disable(&self) {
        let mut handles = self.monitor_handles.lock().unwrap();
        for handle in handles.drain(..) {
            handle.abort();
        }
        let mut shared = self.shared.lock().unwrap();
        shared.level = 0;
        shared.stuck_ticks = 0;
        shared.in_recovery = false;
        info!("recovery monitors disabled");
    }

    /// Current ladder level.
    pub fn level(&self) -> u8 {
        self.shared.lock().unwrap().level
    }

    /// Most recent safe checkpoint, if any.
    pub fn last_checkpoint(&self) -> Option<Vec3> {
        self.shared.lock().unwrap().checkpoints.back().copied()
    }

    /// Navigator hook: a goal solve is in flight.
    pub fn set_goal_active(&self, active: bool) {
        self.goal_active.store(active, Ordering::SeqCst);
        if !active {
            self.stall_clear_attempted.store(false, Ordering::SeqCst);
        }
    }

    pub fn goal_active(&self) -> bool {
        self.goal_active.load(Ordering::SeqCst)
    }

    /// Record the agent's position as a safe checkpoint when it is clear
    /// and grounded. Called opportunistically by the tick monitor and by
    /// the engine after each confirmed dig.
    pub fn checkpoint_here(&self) {
        if !self.deps.body.on_ground() || !self.overlapping_obstructions().is_empty() {
            return;
        }
        let pos = self.deps.body.position();
        self.shared.lock().unwrap().push_checkpoint(pos);
    }

    /// Blocks currently intersecting the agent that are solid and
    /// destructible — indestructible terrain is not a recovery problem we
    /// can dig our way out of.
    pub(crate) fn overlapping_obstructions(&self) -> Vec<BlockPos> {
        self.deps
            .body
            .overlapping_blocks()
            .into_iter()
            .filter(|pos| {
                self.deps
                    .world
                    .block_at(*pos)
                    .map(|b| b.is_obstruction() && !b.is_indestructible())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Whether the agent is obstructed right now (overlap or blocked
    /// heading).
    pub(crate) fn is_obstructed(&self) -> bool {
        !self.overlapping_obstructions().is_empty() || !self.path_blocking_positions().is_empty()
    }

    /// Escalating recovery. Re-entrancy-guarded and cooldown-rate-limited:
    /// a second trigger during an active recovery or inside the cooldown
    /// window is dropped.
    pub async fn trigger(&self, reason: StuckReason) {
        let level = {
            let mut shared = self.shared.lock().unwrap();
            if shared.in_recovery {
                debug!(%reason, "recovery already active; trigger dropped");
                return;
            }
            if let Some(last) = shared.last_recovery {
                if last.elapsed() < self.timing.recovery_cooldown() {
                    debug!(%reason, "recovery inside cooldown; trigger dropped");
                    return;
                }
            }
            shared.in_recovery = true;
            shared.last_recovery = Some(Instant::now());
            // High latency makes the gentle levels wasted round trips.
            shared.level = shared.level.max(self.timing.recovery_floor());
            shared.level
        };

        info!(level, %reason, "recovery triggered");
        self.events.publish(QuarryEvent::Stuck {
            level,
            reason,
            timestamp: Utc::now(),
        });

        self.run_level(level).await;

        let still_obstructed = self.is_obstructed();
        {
            let mut shared = self.shared.lock().unwrap();
            if still_obstructed {
                shared.level = (shared.level + 1).min(MAX_RECOVERY_LEVEL);
                debug!(level = shared.level, "still obstructed; ladder escalated");
            } else {
                shared.level = shared.level.saturating_sub(1);
                shared.stuck_ticks = 0;
            }
            shared.in_recovery = false;
        }
        if !still_obstructed {
            info!("recovery verified clear");
            self.events.publish(QuarryEvent::Unstuck {
                timestamp: Utc::now(),
            });
        }
    }
}
