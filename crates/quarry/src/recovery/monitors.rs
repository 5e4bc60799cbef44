//! Background monitors feeding the escalation ladder.
//!
//! The tick monitor runs at world-tick cadence and handles the cheap
//! per-tick checks: rubber-band detection, suffocation counting, and
//! checkpoint capture. The stall monitor runs once a second and handles
//! the checks that need history: navigation stalls and movement loops.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::capabilities::StuckReason;
use crate::region::Vec3;

use super::{RecoverySystem, TELEPORT_THRESHOLD};

/// Ticks between checkpoint captures.
const CHECKPOINT_INTERVAL_TICKS: u64 = 20;

/// Position samples retained by the stall monitor.
const SAMPLE_CAPACITY: usize = 30;

/// Sampling period of the stall monitor.
const SAMPLE_PERIOD: Duration = Duration::from_millis(1000);

/// Displacement per sample below this counts as no progress.
const STALL_EPSILON: f64 = 0.15;

/// Radius within which samples count as a return to the same spot.
const LOOP_RADIUS: f64 = 2.5;

/// Disjoint returns required to flag a movement loop.
const LOOP_VISITS: usize = 4;

impl RecoverySystem {
    /// Per-tick monitor. Sleeps one adaptive tick per iteration and feeds
    /// the observed interval back into the timing window.
    pub(crate) async fn tick_monitor_loop(self: Arc<Self>) {
        let mut last_pos: Option<Vec3> = None;
        let mut last_tick = Instant::now();
        let mut tick_count: u64 = 0;
        loop {
            tokio::time::sleep(self.timing.tick_duration()).await;
            let now = Instant::now();
            self.timing.record_tick_interval(now - last_tick);
            last_tick = now;
            self.timing.sample();
            tick_count += 1;

            let pos = self.deps.body.position();

            // Rubber-band: the server snapped us back. Clear movement
            // inputs so we do not keep pushing into the same wall.
            if let Some(prev) = last_pos {
                let jumped = prev.distance_to(&pos);
                if jumped > self.timing.rubber_band_distance() && jumped < TELEPORT_THRESHOLD {
                    debug!(distance = jumped, "rubber-band detected; releasing controls");
                    self.deps.body.clear_controls();
                }
            }
            last_pos = Some(pos);

            // Suffocation: consecutive ticks overlapping solid terrain.
            let overlapping = !self.overlapping_obstructions().is_empty();
            let suffocating = {
                let mut shared = self.shared.lock().unwrap();
                if overlapping {
                    shared.stuck_ticks += 1;
                    shared.was_overlapping = true;
                    shared.stuck_ticks > self.timing.stuck_tick_threshold()
                } else {
                    if shared.was_overlapping {
                        shared.level = shared.level.saturating_sub(1);
                        shared.was_overlapping = false;
                    }
                    shared.stuck_ticks = 0;
                    false
                }
            };
            if suffocating {
                warn!("suffocation threshold exceeded");
                self.trigger(StuckReason::Suffocation).await;
            }

            if tick_count % CHECKPOINT_INTERVAL_TICKS == 0 {
                self.checkpoint_here();
            }
        }
    }

    /// One-second monitor: stall and loop detection over a position ring.
    pub(crate) async fn stall_monitor_loop(self: Arc<Self>) {
        let mut samples: VecDeque<Vec3> = VecDeque::with_capacity(SAMPLE_CAPACITY);
        let mut stalled_for = Duration::ZERO;
        loop {
            tokio::time::sleep(SAMPLE_PERIOD).await;
            let pos = self.deps.body.position();

            // Stall: a goal is active but we are not going anywhere.
            if self.goal_active() {
                let moved = samples
                    .back()
                    .map(|prev| prev.distance_to(&pos))
                    .unwrap_or(f64::MAX);
                if moved < STALL_EPSILON {
                    stalled_for += SAMPLE_PERIOD;
                } else {
                    stalled_for = Duration::ZERO;
                    self.stall_clear_attempted.store(false, Ordering::SeqCst);
                }
                if stalled_for >= self.timing.stall_threshold() {
                    stalled_for = Duration::ZERO;
                    if !self.stall_clear_attempted.swap(true, Ordering::SeqCst) {
                        debug!("stall detected; trying a targeted clear first");
                        self.clear_path_ahead().await;
                        self.jump_impulse().await;
                    } else {
                        warn!("stall persisted after targeted clear");
                        self.trigger(StuckReason::Stall).await;
                    }
                }
            } else {
                stalled_for = Duration::ZERO;
            }

            if samples.len() == SAMPLE_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(pos);

            // Loop: repeatedly coming back to the same spot.
            if disjoint_visits(samples.iter(), &pos, LOOP_RADIUS) >= LOOP_VISITS {
                warn!("movement loop detected");
                samples.clear();
                self.trigger(StuckReason::Loop).await;
            }
        }
    }
}

/// Counts maximal runs of consecutive samples within `radius` of `center`.
/// Each run is one visit; leaving and coming back starts a new one.
fn disjoint_visits<'a>(
    samples: impl Iterator<Item = &'a Vec3>,
    center: &Vec3,
    radius: f64,
) -> usize {
    let mut visits = 0;
    let mut inside = false;
    for sample in samples {
        let near = sample.distance_to(center) <= radius;
        if near && !inside {
            visits += 1;
        }
        inside = near;
    }
    visits
}
