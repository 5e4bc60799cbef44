//! Adaptive timing policy — every timeout and threshold in the crate is a
//! function of live link telemetry.
//!
//! Nothing here is stored state beyond the bounded sample window: each
//! getter recomputes its quantity from the smoothed latency `L` (ms) and
//! tick rate `T` (nominal 20/s) on demand, so a latency spike is reflected
//! in the very next decision. Caps keep a pathological link from producing
//! unbounded waits.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capabilities::TelemetrySource;

/// Maximum samples retained per series.
const WINDOW_CAPACITY: usize = 32;

/// Bounded recent history of latency and tick-interval samples.
#[derive(Debug, Default)]
pub struct NetworkWindow {
    latencies_ms: VecDeque<f64>,
    tick_intervals_ms: VecDeque<f64>,
}

impl NetworkWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&mut self, latency_ms: f64) {
        if self.latencies_ms.len() == WINDOW_CAPACITY {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency_ms.max(0.0));
    }

    pub fn record_tick_interval(&mut self, interval_ms: f64) {
        if self.tick_intervals_ms.len() == WINDOW_CAPACITY {
            self.tick_intervals_ms.pop_front();
        }
        self.tick_intervals_ms.push_back(interval_ms.max(1.0));
    }

    /// Smoothed latency, or `None` with no samples yet.
    pub fn latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    /// Smoothed tick rate derived from observed intervals.
    pub fn tick_rate(&self) -> Option<f64> {
        if self.tick_intervals_ms.is_empty() {
            return None;
        }
        let mean_interval =
            self.tick_intervals_ms.iter().sum::<f64>() / self.tick_intervals_ms.len() as f64;
        Some(1000.0 / mean_interval)
    }

    pub fn sample_count(&self) -> usize {
        self.latencies_ms.len()
    }
}

/// The timing policy. Cheap to clone and share.
#[derive(Clone)]
pub struct AdaptiveTiming {
    source: Arc<dyn TelemetrySource>,
    window: Arc<Mutex<NetworkWindow>>,
}

impl AdaptiveTiming {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self {
            source,
            window: Arc::new(Mutex::new(NetworkWindow::new())),
        }
    }

    /// Pull one observation from the telemetry source into the window.
    pub fn sample(&self) {
        let latency = self.source.latency_ms();
        let rate = self.source.tick_rate().max(0.1);
        let mut window = self.window.lock().unwrap();
        window.record_latency(latency);
        window.record_tick_interval(1000.0 / rate);
    }

    /// Record an observed inter-tick interval (fed by the tick monitor).
    pub fn record_tick_interval(&self, interval: Duration) {
        self.window
            .lock()
            .unwrap()
            .record_tick_interval(interval.as_secs_f64() * 1000.0);
    }

    /// Smoothed latency, falling back to the instantaneous source before
    /// the window has samples.
    pub fn latency_ms(&self) -> f64 {
        self.window
            .lock()
            .unwrap()
            .latency_ms()
            .unwrap_or_else(|| self.source.latency_ms())
    }

    /// Smoothed tick rate with the same fallback.
    pub fn tick_rate(&self) -> f64 {
        self.window
            .lock()
            .unwrap()
            .tick_rate()
            .unwrap_or_else(|| self.source.tick_rate())
    }

    /// Nominal duration of one server tick at the current rate.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate().max(1.0))
    }

    /// Timeout for one destructive dig action.
    pub fn dig_timeout(&self) -> Duration {
        Duration::from_millis(dig_timeout_ms(self.latency_ms(), self.tick_rate()))
    }

    /// Timeout for a short approach path.
    pub fn path_timeout(&self) -> Duration {
        Duration::from_millis(path_timeout_ms(self.latency_ms()))
    }

    /// Timeout for long-haul navigation (e.g., returning to base).
    pub fn long_nav_timeout(&self) -> Duration {
        Duration::from_millis(long_nav_timeout_ms(self.latency_ms()))
    }

    /// Ticks to wait for the server to acknowledge a destructive action.
    pub fn confirm_ticks(&self) -> u32 {
        confirm_ticks(self.latency_ms())
    }

    /// Pacing delay between loop steps.
    pub fn inter_step_delay(&self) -> Duration {
        Duration::from_millis(inter_step_delay_ms(self.latency_ms()))
    }

    /// Movement speed multiplier handed to the goal solver.
    pub fn speed_multiplier(&self) -> f64 {
        speed_multiplier(self.latency_ms())
    }

    /// Whether the link is bad enough to pause the run.
    pub fn auto_pause(&self) -> bool {
        auto_pause(self.latency_ms(), self.tick_rate())
    }

    /// No-displacement time before the stall monitor reacts.
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(stall_threshold_ms(self.latency_ms()))
    }

    /// Minimum gap between two recovery executions.
    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_millis(recovery_cooldown_ms(self.latency_ms()))
    }

    /// Consecutive overlapping ticks before suffocation recovery fires.
    pub fn stuck_tick_threshold(&self) -> u32 {
        stuck_tick_threshold(self.latency_ms())
    }

    /// Minimum ladder level on trigger; low levels are wasted round trips
    /// at high latency.
    pub fn recovery_floor(&self) -> u8 {
        recovery_floor(self.latency_ms())
    }

    /// Timeout for one recovery block clear.
    pub fn safe_clear_timeout(&self) -> Duration {
        Duration::from_millis(safe_clear_timeout_ms(self.latency_ms()))
    }

    /// Per-tick displacement above which a position jump is treated as
    /// server rubber-banding rather than real movement.
    pub fn rubber_band_distance(&self) -> f64 {
        rubber_band_distance(self.latency_ms())
    }
}

// Derivation formulas, kept as free functions so each is testable as a pure
// function of (L, T).

pub(crate) fn dig_timeout_ms(latency_ms: f64, tick_rate: f64) -> u64 {
    let tick_factor = 20.0 / tick_rate.max(1.0);
    (((6000.0 + 2.0 * latency_ms) * tick_factor) as u64).min(30_000)
}

pub(crate) fn path_timeout_ms(latency_ms: f64) -> u64 {
    ((8000.0 + 3.0 * latency_ms) as u64).min(30_000)
}

pub(crate) fn long_nav_timeout_ms(latency_ms: f64) -> u64 {
    ((180_000.0 + 10.0 * latency_ms) as u64).min(300_000)
}

pub(crate) fn confirm_ticks(latency_ms: f64) -> u32 {
    if latency_ms > 400.0 {
        6
    } else if latency_ms > 200.0 {
        4
    } else if latency_ms > 100.0 {
        3
    } else {
        2
    }
}

pub(crate) fn inter_step_delay_ms(latency_ms: f64) -> u64 {
    (((latency_ms - 50.0).max(0.0) * 0.4) as u64).min(200)
}

pub(crate) fn speed_multiplier(latency_ms: f64) -> f64 {
    if latency_ms > 400.0 {
        0.45
    } else if latency_ms > 200.0 {
        0.55
    } else if latency_ms > 100.0 {
        0.65
    } else {
        0.8
    }
}

pub(crate) fn auto_pause(latency_ms: f64, tick_rate: f64) -> bool {
    latency_ms > 1000.0 || tick_rate < 5.0
}

pub(crate) fn stall_threshold_ms(latency_ms: f64) -> u64 {
    (3000.0 + 2.0 * latency_ms) as u64
}

pub(crate) fn recovery_cooldown_ms(latency_ms: f64) -> u64 {
    (2000.0 + latency_ms) as u64
}

pub(crate) fn stuck_tick_threshold(latency_ms: f64) -> u32 {
    if latency_ms > 300.0 {
        5
    } else if latency_ms > 150.0 {
        4
    } else {
        3
    }
}

pub(crate) fn recovery_floor(latency_ms: f64) -> u8 {
    if latency_ms > 300.0 {
        2
    } else if latency_ms > 150.0 {
        1
    } else {
        0
    }
}

pub(crate) fn safe_clear_timeout_ms(latency_ms: f64) -> u64 {
    ((5000.0 + 2.0 * latency_ms) as u64).min(15_000)
}

pub(crate) fn rubber_band_distance(latency_ms: f64) -> f64 {
    if latency_ms > 300.0 {
        1.0
    } else if latency_ms > 150.0 {
        0.7
    } else {
        0.5
    }
}
