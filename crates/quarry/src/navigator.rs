//! Goal-directed movement with timeouts and an embedded stall watchdog.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::capabilities::{Collaborators, ControlInput, Goal};
use crate::error::{MinerError, MinerResult};
use crate::recovery::RecoverySystem;
use crate::region::Vec3;
use crate::timing::AdaptiveTiming;

/// How movement is budgeted and policed.
///
/// `Mining` hops are short moves inside the excavation with tight budgets
/// and aggressive unsticking; `Travel` legs are long hauls (to base, back
/// to the face) with generous budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavMode {
    Mining,
    Travel,
}

/// Watchdog sampling period.
const WATCH_PERIOD: Duration = Duration::from_millis(250);

/// Displacement per sample below this accumulates no-progress time.
const WATCH_EPSILON: f64 = 0.2;

/// Accumulated no-progress time that triggers a kick.
const WATCH_KICK_AFTER: Duration = Duration::from_millis(2000);

pub struct Navigator {
    deps: Collaborators,
    timing: AdaptiveTiming,
    recovery: Arc<RecoverySystem>,
}

impl Navigator {
    pub fn new(deps: Collaborators, timing: AdaptiveTiming, recovery: Arc<RecoverySystem>) -> Self {
        Self {
            deps,
            timing,
            recovery,
        }
    }

    /// Move to within `range` of a point.
    pub async fn goto_near(&self, point: Vec3, range: f64, mode: NavMode) -> MinerResult<()> {
        self.goto(Goal::Near { point, range }, mode).await
    }

    /// Move to a horizontal column, any altitude.
    pub async fn goto_xz(&self, x: i32, z: i32, mode: NavMode) -> MinerResult<()> {
        self.goto(Goal::Horizontal { x, z }, mode).await
    }

    /// Drive one goal to completion, racing the solve against the mode's
    /// timeout and a stall watchdog. Controls are released and the
    /// goal-active flag dropped on every exit path.
    pub async fn goto(&self, goal: Goal, mode: NavMode) -> MinerResult<()> {
        let budget = match mode {
            NavMode::Mining => self.timing.path_timeout(),
            NavMode::Travel => self.timing.long_nav_timeout(),
        };
        self.deps.solver.set_speed(self.timing.speed_multiplier());
        self.recovery.set_goal_active(true);
        let _guard = ControlGuard {
            deps: &self.deps,
            recovery: &self.recovery,
        };

        debug!(?goal, ?mode, budget_ms = budget.as_millis() as u64, "navigating");
        tokio::select! {
            result = self.deps.solver.solve(goal) => {
                result.map_err(MinerError::Capability)
            }
            _ = tokio::time::sleep(budget) => {
                warn!(?mode, "navigation timed out");
                self.deps.solver.cancel().await;
                Err(MinerError::PathTimeout {
                    timeout_ms: budget.as_millis() as u64,
                })
            }
            _ = self.stall_watchdog(mode) => unreachable!("watchdog never completes"),
        }
    }

    /// Samples position every 250 ms and kicks the agent when it has made
    /// no progress for two seconds straight: a targeted path clear in
    /// mining mode (terrain is ours to dig), a jump in either mode.
    async fn stall_watchdog(&self, mode: NavMode) {
        let mut last = self.deps.body.position();
        let mut no_progress = Duration::ZERO;
        loop {
            tokio::time::sleep(WATCH_PERIOD).await;
            let pos = self.deps.body.position();
            if last.distance_to(&pos) < WATCH_EPSILON {
                no_progress += WATCH_PERIOD;
            } else {
                no_progress = Duration::ZERO;
            }
            last = pos;

            if no_progress >= WATCH_KICK_AFTER {
                debug!(?mode, "navigation stalled; kicking");
                no_progress = Duration::ZERO;
                if mode == NavMode::Mining {
                    self.recovery.clear_path_ahead().await;
                }
                self.deps.body.set_control(ControlInput::Jump, true);
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.deps.body.set_control(ControlInput::Jump, false);
            }
        }
    }
}

/// Releases movement inputs and the goal-active flag on any exit from a
/// navigation, including cancellation.
struct ControlGuard<'a> {
    deps: &'a Collaborators,
    recovery: &'a Arc<RecoverySystem>,
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        self.deps.body.clear_controls();
        self.recovery.set_goal_active(false);
    }
}
