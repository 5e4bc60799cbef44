//! Server-side confirmation of destructive actions.
//!
//! A dig completing locally proves nothing under lag: the authoritative
//! server may still have the block solid and will rubber-band the agent
//! into it. The waiter polls tick by tick, up to the adaptive confirm-tick
//! budget, for the target to actually read as passable. Callers treat an
//! unconfirmed result as a failed dig and retry.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::debug;

use crate::capabilities::WorldQuery;
use crate::region::BlockPos;
use crate::timing::AdaptiveTiming;

/// Waits for the server to acknowledge a cleared block.
#[derive(Clone)]
pub struct ConfirmationWaiter {
    world: Arc<dyn WorldQuery>,
    timing: AdaptiveTiming,
}

impl ConfirmationWaiter {
    pub fn new(world: Arc<dyn WorldQuery>, timing: AdaptiveTiming) -> Self {
        Self { world, timing }
    }

    /// Poll until `pos` reads empty/passable, for at most the adaptive
    /// number of ticks. Returns whether the clear was confirmed.
    pub async fn wait_cleared(&self, pos: BlockPos) -> bool {
        let ticks = self.timing.confirm_ticks();
        let tick = self.timing.tick_duration();

        for attempt in 0..ticks {
            match self.world.block_at(pos) {
                None => return true,
                Some(block) if block.is_air() || block.passable => return true,
                Some(_) => {}
            }
            debug!(%pos, attempt, ticks, "block still solid; waiting a tick");
            sleep(tick).await;
        }

        // One final read after the last wait.
        match self.world.block_at(pos) {
            None => true,
            Some(block) => block.is_air() || block.passable,
        }
    }
}
