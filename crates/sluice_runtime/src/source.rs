//! Collaborator contracts.
//!
//! The engine reads balances, the withdrawal queue and the roster, and
//! writes finalize and exit instructions, only through these traits.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use sluice_core::{Wei, WithdrawalRequest, WorkerKey, WorkerRecord};
use sluice_plan::FinalizeBatch;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Error reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Transient failure; the read or write may succeed later
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the call
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Read-only ether balance
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Source name for logs and errors
    fn name(&self) -> &str;

    /// Current balance
    async fn balance(&self) -> Result<Wei, SourceError>;
}

/// Read-only withdrawal queue
#[async_trait]
pub trait RequestSource: Send + Sync {
    /// Every request not yet finalized, ascending by id. Restartable.
    async fn queued_requests(&self) -> Result<Vec<WithdrawalRequest>, SourceError>;
}

/// Read-only worker roster
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// All workers, ascending by activation index
    async fn workers(&self) -> Result<Vec<WorkerRecord>, SourceError>;
}

/// Finalize-prefix sink, idempotent by id range
#[async_trait]
pub trait FinalizationSink: Send + Sync {
    /// Finalize every request up to `batch.last_id`
    async fn finalize_up_to(&self, batch: &FinalizeBatch) -> Result<(), SourceError>;
}

/// Exit-request sink. Must be called at most once per worker.
#[async_trait]
pub trait ExitSink: Send + Sync {
    /// Instruct `key` to begin exiting
    async fn request_exit(&self, key: &WorkerKey) -> Result<(), SourceError>;
}

/// Every collaborator a round touches
#[derive(Clone)]
pub struct Collaborators {
    /// Withdrawal-credentials holding
    pub withdrawal_credentials: Arc<dyn BalanceSource>,
    /// Execution-layer rewards holding
    pub el_rewards: Arc<dyn BalanceSource>,
    /// Deposit buffer
    pub deposit_buffer: Arc<dyn BalanceSource>,
    /// Withdrawal queue
    pub requests: Arc<dyn RequestSource>,
    /// Worker roster
    pub roster: Arc<dyn RosterSource>,
    /// Finalize sink
    pub finalization: Arc<dyn FinalizationSink>,
    /// Exit-request sink
    pub exits: Arc<dyn ExitSink>,
}

/// Await a collaborator read, mapping failure and timeout to
/// `SourceUnavailable`
pub(crate) async fn read_within<T, F>(name: &str, limit: Duration, read: F) -> EngineResult<T>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(EngineError::SourceUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        }),
        Err(_) => Err(EngineError::SourceUnavailable {
            name: name.to_string(),
            reason: format!("no response within {:?}", limit),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_within_ok() {
        let value = read_within("test", Duration::from_millis(50), async { Ok::<_, SourceError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_read_within_error() {
        let err = read_within("roster", Duration::from_millis(50), async {
            Err::<u8, _>(SourceError::Unavailable("rpc down".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::SourceUnavailable {
                name: "roster".to_string(),
                reason: "unavailable: rpc down".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_read_within_timeout() {
        let err = read_within("requests", Duration::from_millis(10), async {
            std::future::pending::<Result<u8, SourceError>>().await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::SourceUnavailable { .. }));
    }
}
