//! Run state — the single mutable record behind the engine.
//!
//! `ExcavationState` has exactly one logical writer: the engine's own
//! control flow. Everyone else sees cloned snapshots.

use serde::{Deserialize, Serialize};

use crate::region::{NormalizedRegion, Vec3};

/// Top-level run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinerStatus {
    Idle,
    Mining,
    Paused,
    Traveling,
    Finished,
    Error,
}

impl MinerStatus {
    /// Whether a run loop is live (mining or temporarily paused).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Mining | Self::Paused)
    }
}

impl std::fmt::Display for MinerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Mining => write!(f, "mining"),
            Self::Paused => write!(f, "paused"),
            Self::Traveling => write!(f, "traveling"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Why the run is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Operator-requested pause.
    Manual,
    /// The link degraded past the auto-pause threshold.
    HighPing,
    /// Vitals critically low; eating until recovered.
    Healing,
    /// Inventory full with no storage accepting deposits.
    AwaitingCapacity,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::HighPing => write!(f, "high_ping"),
            Self::Healing => write!(f, "healing"),
            Self::AwaitingCapacity => write!(f, "awaiting_capacity"),
        }
    }
}

/// Agent vitals snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f32,
    pub food: u32,
}

/// Link quality snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkQuality {
    pub latency_ms: f64,
    pub tick_rate: f64,
}

/// The engine's run record, exposed only as read-only snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcavationState {
    pub status: MinerStatus,
    pub pause_reason: Option<PauseReason>,
    pub region: Option<NormalizedRegion>,
    pub total_targets: u64,
    pub mined: u64,
    pub current_tool: Option<String>,
    pub last_position: Option<Vec3>,
    pub error: Option<String>,
    pub vitals: Vitals,
    pub network: NetworkQuality,
}

impl ExcavationState {
    pub fn new() -> Self {
        Self {
            status: MinerStatus::Idle,
            pause_reason: None,
            region: None,
            total_targets: 0,
            mined: 0,
            current_tool: None,
            last_position: None,
            error: None,
            vitals: Vitals::default(),
            network: NetworkQuality::default(),
        }
    }

    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "status={} mined={}/{} ping={:.0}ms tps={:.1}",
            self.status, self.mined, self.total_targets, self.network.latency_ms,
            self.network.tick_rate,
        )
    }
}

impl Default for ExcavationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ExcavationState::new();
        assert_eq!(state.status, MinerStatus::Idle);
        assert!(state.region.is_none());
        assert_eq!(state.mined, 0);
        assert!(state.pause_reason.is_none());
    }

    #[test]
    fn test_status_activity() {
        assert!(MinerStatus::Mining.is_active());
        assert!(MinerStatus::Paused.is_active());
        assert!(!MinerStatus::Idle.is_active());
        assert!(!MinerStatus::Traveling.is_active());
        assert!(!MinerStatus::Finished.is_active());
    }

    #[test]
    fn test_pause_reason_wire_format() {
        let json = serde_json::to_string(&PauseReason::HighPing).unwrap();
        assert_eq!(json, "\"high_ping\"");
        assert_eq!(PauseReason::HighPing.to_string(), "high_ping");
        assert_eq!(PauseReason::AwaitingCapacity.to_string(), "awaiting_capacity");
    }

    #[test]
    fn test_summary_format() {
        let mut state = ExcavationState::new();
        state.status = MinerStatus::Mining;
        state.mined = 12;
        state.total_targets = 64;
        let s = state.summary();
        assert!(s.contains("status=mining"));
        assert!(s.contains("12/64"));
    }
}
