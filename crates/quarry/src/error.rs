//! Error taxonomy for the excavation loop.
//!
//! User errors (`AlreadyMining`, `BotBusy`) are rejected synchronously.
//! `PathTimeout` and `DigTimeout` are recoverable and retried by their
//! callers within bounded budgets. Cancellation is never an error variant:
//! the engine distinguishes "stopped" from "failed" by its status flag.

use thiserror::Error;

use crate::region::BlockPos;

/// Result alias for engine operations.
pub type MinerResult<T> = Result<T, MinerError>;

/// Errors surfaced by the excavation engine and its subsystems.
#[derive(Debug, Error)]
pub enum MinerError {
    /// A run is already in progress; a fresh `start` is a user error.
    #[error("excavation already in progress")]
    AlreadyMining,

    /// Navigation did not reach its goal within the adaptive budget.
    #[error("navigation timed out after {timeout_ms} ms")]
    PathTimeout { timeout_ms: u64 },

    /// A dig did not complete within the adaptive budget.
    #[error("dig timed out at {pos}")]
    DigTimeout { pos: BlockPos },

    /// `go_to_base` was called with no base location configured.
    #[error("base location not configured")]
    BaseNotConfigured,

    /// A mutually exclusive operation is active.
    #[error("bot is busy: {state}")]
    BotBusy { state: String },

    /// Inventory is full and no storage accepted a deposit.
    #[error("inventory full and no storage available")]
    InventoryFullNoStorage,

    /// A collaborator failed in a way the engine cannot retry.
    #[error(transparent)]
    Capability(#[from] anyhow::Error),
}

impl MinerError {
    /// Whether the caller may retry this failure within its attempt budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PathTimeout { .. } | Self::DigTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            MinerError::AlreadyMining.to_string(),
            "excavation already in progress"
        );
        assert_eq!(
            MinerError::PathTimeout { timeout_ms: 8000 }.to_string(),
            "navigation timed out after 8000 ms"
        );
        assert!(MinerError::DigTimeout {
            pos: BlockPos::new(1, 2, 3)
        }
        .to_string()
        .contains("(1, 2, 3)"));
    }

    #[test]
    fn test_retryability() {
        assert!(MinerError::PathTimeout { timeout_ms: 1 }.is_retryable());
        assert!(MinerError::DigTimeout {
            pos: BlockPos::new(0, 0, 0)
        }
        .is_retryable());
        assert!(!MinerError::AlreadyMining.is_retryable());
        assert!(!MinerError::BaseNotConfigured.is_retryable());
    }

    #[test]
    fn test_capability_from_anyhow() {
        let err: MinerError = anyhow::anyhow!("socket closed").into();
        assert!(matches!(err, MinerError::Capability(_)));
        assert_eq!(err.to_string(), "socket closed");
    }
}
