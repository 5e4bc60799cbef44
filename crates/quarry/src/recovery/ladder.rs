//! Escalation ladder actions and targeted clearing.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::capabilities::ControlInput;
use crate::events::QuarryEvent;
use crate::region::{BlockPos, Vec3};
use crate::timeout::with_timeout;

use super::{RecoverySystem, MAX_RECOVERY_LEVEL};

/// How long a jump impulse is held.
const IMPULSE: Duration = Duration::from_millis(200);

/// How long the move-away push at level 1 is held.
const MOVE_AWAY: Duration = Duration::from_millis(300);

impl RecoverySystem {
    /// Execute one ladder level. Each level is strictly more disruptive
    /// than the previous; level 5 abandons the current goal entirely.
    pub(crate) async fn run_level(&self, level: u8) {
        match level {
            0 => {
                self.clear_path_ahead().await;
                self.jump_impulse().await;
            }
            1 => {
                self.clear_path_ahead().await;
                self.clear_overlapping().await;
                self.hold_controls(&[ControlInput::Jump, ControlInput::Forward], IMPULSE)
                    .await;
                let remaining = self.overlapping_obstructions();
                if let Some(obstacle) = remaining.first() {
                    self.move_away_from(*obstacle).await;
                }
            }
            2 => {
                self.jump_impulse().await;
                self.clear_overlapping().await;
            }
            3 => {
                self.clear_shell(1, 0..=1).await;
                self.jump_impulse().await;
            }
            4 => {
                self.clear_shell(1, 0..=1).await;
                self.clear_column_above(3).await;
                self.jump_impulse().await;
            }
            _ => {
                // Emergency: carve a 3x3x5 pocket, drop the goal, start over.
                self.clear_shell(1, -1..=3).await;
                self.deps.body.clear_controls();
                self.deps.solver.cancel().await;
                self.set_goal_active(false);
                let mut shared = self.shared.lock().unwrap();
                shared.level = 0;
                warn!("emergency recovery executed; goal abandoned, ladder reset");
            }
        }
        debug_assert!(level <= MAX_RECOVERY_LEVEL);
    }

    /// Clear the blocks blocking the agent's heading: the two cardinal
    /// neighbors plus the diagonal corner, at foot and head height.
    pub async fn clear_path_ahead(&self) -> bool {
        let targets = self.path_blocking_positions();
        let mut any = false;
        for pos in targets {
            any |= self.clear_block(pos).await;
        }
        any
    }

    /// Clear every destructible block overlapping the agent's volume.
    pub async fn clear_overlapping(&self) {
        for pos in self.overlapping_obstructions() {
            self.clear_block(pos).await;
        }
    }

    /// Positions along the current heading that hold obstructions.
    pub(crate) fn path_blocking_positions(&self) -> Vec<BlockPos> {
        let feet = self.deps.body.position().floored();
        let (sx, sz) = heading_step(self.deps.body.yaw());
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (dx, dz) in [(sx, 0), (0, sz), (sx, sz)] {
            if dx == 0 && dz == 0 {
                continue;
            }
            for dy in 0..=1 {
                let pos = feet.offset(dx, dy, dz);
                if !seen.insert(pos) {
                    continue;
                }
                let blocked = self
                    .deps
                    .world
                    .block_at(pos)
                    .map(|b| b.is_obstruction() && !b.is_indestructible())
                    .unwrap_or(false);
                if blocked {
                    out.push(pos);
                }
            }
        }
        out
    }

    /// Dig one block with the safe-clear timeout, cancelling the dig if
    /// the budget elapses. Skips air, indestructible terrain, and blocks
    /// the tool policy refuses. Returns whether the block was dug.
    pub(crate) async fn clear_block(&self, pos: BlockPos) -> bool {
        let block = match self.deps.world.block_at(pos) {
            Some(b) if b.is_obstruction() && !b.is_indestructible() => b,
            _ => return false,
        };
        if !self.deps.tools.should_excavate(&block) {
            debug!(%pos, name = %block.name, "tool policy refused clear");
            return false;
        }
        if let Err(err) = self.deps.tools.equip_for(&block) {
            debug!(%pos, error = %err, "equip failed during clear");
        }
        self.deps.body.look_at(pos.center());

        let digger = &self.deps.digger;
        let result = with_timeout(
            self.timing.safe_clear_timeout(),
            digger.dig(pos),
            digger.cancel_dig(),
        )
        .await;

        match result.into_completed() {
            Some(Ok(())) => {
                self.events.publish(QuarryEvent::BlockCleared {
                    position: pos,
                    name: block.name,
                    timestamp: Utc::now(),
                });
                true
            }
            Some(Err(err)) => {
                debug!(%pos, error = %err, "clear dig failed");
                false
            }
            None => {
                warn!(%pos, "clear dig timed out");
                false
            }
        }
    }

    /// Clear a horizontal shell of the given radius around the agent over
    /// a vertical span relative to foot level.
    async fn clear_shell(&self, radius: i32, dy: std::ops::RangeInclusive<i32>) {
        let feet = self.deps.body.position().floored();
        for y in dy {
            for dx in -radius..=radius {
                for dz in -radius..=radius {
                    self.clear_block(feet.offset(dx, y, dz)).await;
                }
            }
        }
    }

    /// Clear the vertical column directly above the agent's head.
    async fn clear_column_above(&self, height: i32) {
        let feet = self.deps.body.position().floored();
        for dy in 2..2 + height {
            self.clear_block(feet.offset(0, dy, 0)).await;
        }
    }

    /// Brief jump with no horizontal input.
    pub(crate) async fn jump_impulse(&self) {
        self.hold_controls(&[ControlInput::Jump], IMPULSE).await;
    }

    /// Face away from the obstacle and push off it.
    async fn move_away_from(&self, obstacle: BlockPos) {
        let here = self.deps.body.position();
        let center = obstacle.center();
        let away = Vec3::new(
            here.x + (here.x - center.x),
            here.y,
            here.z + (here.z - center.z),
        );
        self.deps.body.look_at(away);
        self.hold_controls(&[ControlInput::Forward, ControlInput::Jump], MOVE_AWAY)
            .await;
    }

    async fn hold_controls(&self, inputs: &[ControlInput], duration: Duration) {
        for input in inputs {
            self.deps.body.set_control(*input, true);
        }
        tokio::time::sleep(duration).await;
        for input in inputs {
            self.deps.body.set_control(*input, false);
        }
    }
}

/// Unit step of the agent's horizontal heading, derived from yaw with the
/// conventional x = -sin, z = cos mapping.
fn heading_step(yaw: f64) -> (i32, i32) {
    let fx = -yaw.sin();
    let fz = yaw.cos();
    let sx = if fx > 0.5 {
        1
    } else if fx < -0.5 {
        -1
    } else {
        0
    };
    let sz = if fz > 0.5 {
        1
    } else if fz < -0.5 {
        -1
    } else {
        0
    };
    (sx, sz)
}
