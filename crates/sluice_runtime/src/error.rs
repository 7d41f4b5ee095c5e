//! Engine errors.

use sluice_core::ActivationIndex;
use sluice_plan::PlanError;
use sluice_storage::{CacheError, StoreError};
use std::fmt;

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Which emission of a commit failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionStage {
    /// The finalize-prefix instruction
    Finalize,
    /// The exit request for one worker
    ExitRequest(ActivationIndex),
}

impl fmt::Display for EmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finalize => write!(f, "finalize"),
            Self::ExitRequest(index) => write!(f, "exit request {}", index),
        }
    }
}

/// Round failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A balance, roster or request read failed or timed out. Nothing mutated.
    #[error("source unavailable ({name}): {reason}")]
    SourceUnavailable {
        /// Source that failed
        name: String,
        /// Read error or timeout
        reason: String,
    },

    /// Inputs contradict the durable cursors; the cache or a ledger is corrupt
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A sink write did not confirm; confirmed work before it is recorded
    #[error("emission failed at {stage}: {reason}")]
    EmissionFailure {
        /// Emission that did not confirm
        stage: EmissionStage,
        /// Sink error or timeout
        reason: String,
    },

    /// Round cache could not be read or written
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Check if the error must stop the control loop instead of waiting for
    /// the next scheduled round
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Config(_))
    }
}

impl From<PlanError> for EngineError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::ZeroWorkerBalance => Self::Config(err.to_string()),
            other => Self::InvariantViolation(other.to_string()),
        }
    }
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        Self::InvariantViolation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::RequestId;

    #[test]
    fn test_plan_error_mapping() {
        let err: EngineError = PlanError::AlreadyFinalized {
            id: RequestId::new(1),
            last_finalized: RequestId::new(2),
        }
        .into();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        assert!(err.is_fatal());

        let err: EngineError = PlanError::ZeroWorkerBalance.into();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_retryable_errors() {
        let err = EngineError::SourceUnavailable {
            name: "deposit_buffer".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "source unavailable (deposit_buffer): timeout");

        let err = EngineError::EmissionFailure {
            stage: EmissionStage::ExitRequest(ActivationIndex::new(4)),
            reason: "rejected".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "emission failed at exit request #4: rejected");
    }
}
