//! Event catalog for the excavation loop.
//!
//! A closed set of tagged variants — collaborators subscribe to the bus and
//! match on these rather than registering ad hoc callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capabilities::StuckReason;
use crate::region::{BlockPos, NormalizedRegion};
use crate::state::PauseReason;

/// Everything the engine publishes over its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuarryEvent {
    /// A run started over `region`.
    Started {
        region: NormalizedRegion,
        timestamp: DateTime<Utc>,
    },

    /// Progress advanced past one target (mined or skipped).
    Progress {
        mined: u64,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run paused.
    Paused {
        reason: PauseReason,
        timestamp: DateTime<Utc>,
    },

    /// The run resumed after a pause.
    Resumed { timestamp: DateTime<Utc> },

    /// Every target was processed.
    Finished { timestamp: DateTime<Utc> },

    /// The run failed.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A block was cleared, either as a target or during recovery.
    BlockCleared {
        position: BlockPos,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Inventory filled up mid-run.
    InventoryFull { timestamp: DateTime<Utc> },

    /// Recovery fired at `level`.
    Stuck {
        level: u8,
        reason: StuckReason,
        timestamp: DateTime<Utc>,
    },

    /// Recovery verified the agent is free again.
    Unstuck { timestamp: DateTime<Utc> },
}

impl QuarryEvent {
    /// Timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Started { timestamp, .. } => *timestamp,
            Self::Progress { timestamp, .. } => *timestamp,
            Self::Paused { timestamp, .. } => *timestamp,
            Self::Resumed { timestamp } => *timestamp,
            Self::Finished { timestamp } => *timestamp,
            Self::Error { timestamp, .. } => *timestamp,
            Self::BlockCleared { timestamp, .. } => *timestamp,
            Self::InventoryFull { timestamp } => *timestamp,
            Self::Stuck { timestamp, .. } => *timestamp,
            Self::Unstuck { timestamp } => *timestamp,
        }
    }

    /// Stable type tag, matching the serde representation.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Progress { .. } => "progress",
            Self::Paused { .. } => "paused",
            Self::Resumed { .. } => "resumed",
            Self::Finished { .. } => "finished",
            Self::Error { .. } => "error",
            Self::BlockCleared { .. } => "block_cleared",
            Self::InventoryFull { .. } => "inventory_full",
            Self::Stuck { .. } => "stuck",
            Self::Unstuck { .. } => "unstuck",
        }
    }
}
