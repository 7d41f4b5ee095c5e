//! In-memory collaborators.
//!
//! `MemoryWorld` plays every external system at once: the three balance
//! holdings, the withdrawal queue, the roster and both sinks. Sinks mutate
//! the world the way the real systems would, so a round's effects are
//! visible to the next round's reads. Faults can be injected per source.

use crate::source::{
    BalanceSource, Collaborators, ExitSink, FinalizationSink, RequestSource, RosterSource,
    SourceError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sluice_core::{Shares, Timestamp, Wei, WithdrawalRequest, WorkerKey, WorkerRecord, WorkerStatus};
use sluice_plan::FinalizeBatch;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Source names used in logs, errors and fault injection
pub mod names {
    /// Withdrawal-credentials balance
    pub const WITHDRAWAL_CREDENTIALS: &str = "withdrawal_credentials";
    /// Execution-layer rewards balance
    pub const EL_REWARDS: &str = "el_rewards";
    /// Deposit buffer balance
    pub const DEPOSIT_BUFFER: &str = "deposit_buffer";
    /// Withdrawal queue
    pub const REQUESTS: &str = "requests";
    /// Worker roster
    pub const ROSTER: &str = "roster";
}

/// External state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct World {
    /// Withdrawal-credentials balance
    pub withdrawal_credentials: Wei,
    /// Execution-layer rewards balance
    pub el_rewards: Wei,
    /// Deposit buffer balance
    pub deposit_buffer: Wei,
    /// Pooled-ether snapshot
    pub total_pooled_ether: Wei,
    /// Share-supply snapshot
    pub total_shares: Shares,
    /// Current block height
    pub block_number: u64,
    /// Current time
    pub clock: Timestamp,
    /// Non-finalized requests, ascending by id
    pub queue: Vec<WithdrawalRequest>,
    /// Roster, ascending by activation index
    pub workers: Vec<WorkerRecord>,
    /// Every finalize instruction applied
    pub finalized: Vec<FinalizeBatch>,
    /// Every exit request applied, in order
    pub exit_requests: Vec<WorkerKey>,
}

impl World {
    /// Spend `amount` from the holdings, withdrawal credentials first
    fn spend(&mut self, amount: Wei) {
        let mut left = amount;
        for holding in [
            &mut self.withdrawal_credentials,
            &mut self.el_rewards,
            &mut self.deposit_buffer,
        ] {
            let taken = if *holding < left { *holding } else { left };
            *holding = holding.saturating_sub(taken);
            left = left.saturating_sub(taken);
        }
    }
}

/// Injected failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Source that returns an error
    pub unavailable: Option<String>,
    /// Source that never answers
    pub stalled: Option<String>,
    /// Reject finalize instructions
    pub reject_finalize: bool,
    /// Reject exit requests once this many have been applied
    pub reject_exits_after: Option<usize>,
    /// Apply sink writes, then report failure
    pub lose_acks: bool,
}

/// Shared in-memory world
#[derive(Debug, Default)]
pub struct MemoryWorld {
    world: Mutex<World>,
    faults: Mutex<Faults>,
}

impl MemoryWorld {
    /// Wrap `world`
    #[must_use]
    pub fn new(world: World) -> Self {
        Self {
            world: Mutex::new(world),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Copy of the current world
    #[must_use]
    pub fn snapshot(&self) -> World {
        self.lock_world().clone()
    }

    /// Mutate the world
    pub fn update<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.lock_world())
    }

    /// Replace the injected faults
    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    /// Clear all injected faults
    pub fn clear_faults(&self) {
        self.set_faults(Faults::default());
    }

    /// Collaborators backed by this world
    #[must_use]
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        let balance = |name: &'static str| -> Arc<dyn BalanceSource> {
            Arc::new(MemoryBalance {
                world: Arc::clone(self),
                name,
            })
        };
        Collaborators {
            withdrawal_credentials: balance(names::WITHDRAWAL_CREDENTIALS),
            el_rewards: balance(names::EL_REWARDS),
            deposit_buffer: balance(names::DEPOSIT_BUFFER),
            requests: Arc::clone(self) as Arc<dyn RequestSource>,
            roster: Arc::clone(self) as Arc<dyn RosterSource>,
            finalization: Arc::clone(self) as Arc<dyn FinalizationSink>,
            exits: Arc::clone(self) as Arc<dyn ExitSink>,
        }
    }

    fn lock_world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> Faults {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply read faults for `name`
    async fn before_read(&self, name: &str) -> Result<(), SourceError> {
        let faults = self.faults();
        if faults.stalled.as_deref() == Some(name) {
            std::future::pending::<()>().await;
        }
        if faults.unavailable.as_deref() == Some(name) {
            return Err(SourceError::Unavailable(format!("{} is down", name)));
        }
        Ok(())
    }
}

struct MemoryBalance {
    world: Arc<MemoryWorld>,
    name: &'static str,
}

#[async_trait]
impl BalanceSource for MemoryBalance {
    fn name(&self) -> &str {
        self.name
    }

    async fn balance(&self) -> Result<Wei, SourceError> {
        self.world.before_read(self.name).await?;
        let world = self.world.lock_world();
        Ok(match self.name {
            names::WITHDRAWAL_CREDENTIALS => world.withdrawal_credentials,
            names::EL_REWARDS => world.el_rewards,
            _ => world.deposit_buffer,
        })
    }
}

#[async_trait]
impl RequestSource for MemoryWorld {
    async fn queued_requests(&self) -> Result<Vec<WithdrawalRequest>, SourceError> {
        self.before_read(names::REQUESTS).await?;
        Ok(self.lock_world().queue.clone())
    }
}

#[async_trait]
impl RosterSource for MemoryWorld {
    async fn workers(&self) -> Result<Vec<WorkerRecord>, SourceError> {
        self.before_read(names::ROSTER).await?;
        Ok(self.lock_world().workers.clone())
    }
}

#[async_trait]
impl FinalizationSink for MemoryWorld {
    async fn finalize_up_to(&self, batch: &FinalizeBatch) -> Result<(), SourceError> {
        let faults = self.faults();
        if faults.reject_finalize {
            return Err(SourceError::Rejected("finalization paused".to_string()));
        }

        {
            let mut world = self.lock_world();
            let before = world.queue.len();
            world.queue.retain(|r| r.id > batch.last_id);
            // Replays of an applied range change nothing
            if world.queue.len() < before {
                world.spend(batch.ether_locked);
                world.finalized.push(batch.clone());
                debug!(last_id = %batch.last_id, count = before - world.queue.len(), "requests finalized");
            }
        }

        if faults.lose_acks {
            return Err(SourceError::Unavailable("finalize receipt lost".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExitSink for MemoryWorld {
    async fn request_exit(&self, key: &WorkerKey) -> Result<(), SourceError> {
        let faults = self.faults();

        {
            let mut world = self.lock_world();
            if faults
                .reject_exits_after
                .is_some_and(|limit| world.exit_requests.len() >= limit)
            {
                return Err(SourceError::Rejected("exit quota reached".to_string()));
            }

            let at = world.clock;
            let worker = world
                .workers
                .iter_mut()
                .find(|w| &w.key == key)
                .ok_or_else(|| SourceError::Rejected(format!("unknown worker {}", key)))?;
            if !worker.status.is_active() {
                return Err(SourceError::Rejected(format!(
                    "worker {} is already {}",
                    key, worker.status
                )));
            }
            worker.status = WorkerStatus::ExitRequested { at };
            world.exit_requests.push(key.clone());
        }

        if faults.lose_acks {
            return Err(SourceError::Unavailable("exit receipt lost".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::RequestId;

    fn world() -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::new(World {
            withdrawal_credentials: Wei::from_ether(5),
            el_rewards: Wei::from_ether(5),
            queue: (1..=3)
                .map(|i| WithdrawalRequest::new(i, i, Wei::from_ether(4), Shares::new(4)))
                .collect(),
            workers: (0..3)
                .map(|i| WorkerRecord::active(i, 1, 1, &format!("0x{:02x}", i), Wei::from_ether(32)))
                .collect(),
            ..World::default()
        }))
    }

    fn batch(last: u64) -> FinalizeBatch {
        FinalizeBatch {
            first_id: RequestId::new(1),
            last_id: RequestId::new(last),
            count: last,
            ether_locked: Wei::from_ether(4 * last),
            shares_to_burn: Shares::new(4 * u128::from(last)),
            total_pooled_ether: Wei::ZERO,
            total_shares: Shares::ZERO,
        }
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let world = world();
        world.finalize_up_to(&batch(2)).await.unwrap();
        world.finalize_up_to(&batch(2)).await.unwrap();

        let snapshot = world.snapshot();
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.finalized.len(), 1);
        // 8 ether spent, withdrawal credentials first
        assert_eq!(snapshot.withdrawal_credentials, Wei::ZERO);
        assert_eq!(snapshot.el_rewards, Wei::from_ether(2));
    }

    #[tokio::test]
    async fn test_exit_rejects_repeat() {
        let world = world();
        let key = world.snapshot().workers[1].key.clone();
        world.request_exit(&key).await.unwrap();
        let err = world.request_exit(&key).await.unwrap_err();
        assert!(matches!(err, SourceError::Rejected(_)));
        assert_eq!(world.snapshot().exit_requests, vec![key]);
    }

    #[tokio::test]
    async fn test_lost_ack_still_applies() {
        let world = world();
        world.set_faults(Faults {
            lose_acks: true,
            ..Faults::default()
        });
        let key = world.snapshot().workers[0].key.clone();
        assert!(world.request_exit(&key).await.is_err());
        assert!(!world.snapshot().workers[0].status.is_active());
    }

    #[tokio::test]
    async fn test_unavailable_read() {
        let world = world();
        world.set_faults(Faults {
            unavailable: Some(names::ROSTER.to_string()),
            ..Faults::default()
        });
        assert!(world.workers().await.is_err());
        assert_eq!(world.queued_requests().await.unwrap().len(), 3);
    }

    #[test]
    fn test_world_json_defaults() {
        let world: World = serde_json::from_str(r#"{"deposit_buffer": "7"}"#).unwrap();
        assert_eq!(world.deposit_buffer, Wei::new(7));
        assert!(world.queue.is_empty());
    }
}
