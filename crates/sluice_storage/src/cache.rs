//! Round cache: the durable state carried from one round to the next.
//!
//! A round works on a clone of the stored cache. The clone is reconciled
//! with the roster, advanced by the reporter as emissions confirm, and only
//! then written back. An aborted round drops its clone and leaves the stored
//! cache untouched.

use crate::journal::CommitJournal;
use serde::{Deserialize, Serialize};
use sluice_core::{
    ActivationIndex, Duration, RequestId, Timestamp, Wei, WorkerKey, WorkerRecord, WorkerStatus,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Accrual and decay rules for expected inflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InflowPolicy {
    /// How long an exit request counts before the worker shows a voluntary exit
    pub exit_request_timeout: Duration,
    /// Whether workers observed exiting keep counting until they settle
    pub count_exiting: bool,
}

impl Default for InflowPolicy {
    fn default() -> Self {
        Self {
            exit_request_timeout: Duration::from_hours(72),
            count_exiting: true,
        }
    }
}

/// Cache error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Exit cursor would not move forward
    #[error("exit cursor regression: {proposed} is not after {current}")]
    CursorRegression {
        /// Cursor in the cache
        current: ActivationIndex,
        /// Index the caller tried to record
        proposed: ActivationIndex,
    },

    /// Finalized cursor would not move forward
    #[error("finalization regression: {proposed} is not after {current}")]
    FinalizedRegression {
        /// Cursor in the cache
        current: RequestId,
        /// Id the caller tried to record
        proposed: RequestId,
    },

    /// Worker already has a pending exit
    #[error("worker {0} already has a pending exit")]
    DuplicateExit(ActivationIndex),
}

/// A worker whose exit was requested and whose ether has not settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExit {
    /// Worker identity
    pub key: WorkerKey,
    /// Balance promised by the exit
    pub amount: Wei,
    /// Last known lifecycle stage
    pub status: WorkerStatus,
}

impl PendingExit {
    /// Check if this promise counts toward expected inflow at `now`
    #[must_use]
    pub fn counts(&self, now: Timestamp, policy: &InflowPolicy) -> bool {
        match self.status {
            WorkerStatus::ExitRequested { .. } => {
                self.status.within_timeout(now, policy.exit_request_timeout)
            }
            WorkerStatus::Exiting => policy.count_exiting,
            WorkerStatus::Active | WorkerStatus::Exited => false,
        }
    }
}

/// What reconciliation with the roster changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Entries dropped because the worker exited
    pub settled: Vec<ActivationIndex>,
    /// Entries dropped because the exit request timed out
    pub expired: Vec<ActivationIndex>,
    /// Entries whose status moved forward
    pub advanced: usize,
}

/// Durable round state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCache {
    /// Number of committed rounds
    pub round: u64,
    /// Activation index of the last worker requested to exit
    pub last_exit_cursor: Option<ActivationIndex>,
    /// Highest finalized request id
    pub last_finalized_request_id: Option<RequestId>,
    /// In-flight exits by activation index
    pub pending_exits: BTreeMap<ActivationIndex, PendingExit>,
    /// Commit in progress, if the last round was interrupted
    pub journal: Option<CommitJournal>,
}

impl RoundCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ether promised by in-flight exits still inside their window
    #[must_use]
    pub fn expected_inflow(&self, now: Timestamp, policy: &InflowPolicy) -> Wei {
        self.pending_exits
            .values()
            .filter(|entry| entry.counts(now, policy))
            .map(|entry| entry.amount)
            .sum()
    }

    /// Merge externally confirmed worker status into the pending set.
    ///
    /// Status only moves forward. Exited workers and timed-out requests are
    /// dropped, so each promise leaves the accumulator exactly once. `roster`
    /// must be ascending by activation index.
    pub fn reconcile(
        &mut self,
        roster: &[WorkerRecord],
        now: Timestamp,
        policy: &InflowPolicy,
    ) -> Reconciliation {
        let mut report = Reconciliation::default();

        self.pending_exits.retain(|index, entry| {
            match roster.binary_search_by_key(index, |w| w.activation_index) {
                Ok(pos) => {
                    let observed = roster[pos].status;
                    if observed.stage() > entry.status.stage() {
                        debug!(worker = %index, from = %entry.status, to = %observed, "exit progressed");
                        entry.status = observed;
                        report.advanced += 1;
                    }
                }
                Err(_) => warn!(worker = %index, "pending exit missing from roster"),
            }

            if entry.status.is_exited() {
                report.settled.push(*index);
                return false;
            }
            if matches!(entry.status, WorkerStatus::ExitRequested { .. })
                && !entry.status.within_timeout(now, policy.exit_request_timeout)
            {
                warn!(worker = %index, amount = %entry.amount, "exit request timed out, dropping expected inflow");
                report.expired.push(*index);
                return false;
            }
            true
        });

        report
    }

    /// Advance the finalized cursor to `up_to`
    ///
    /// # Errors
    ///
    /// Returns error if `up_to` is not after the current cursor
    pub fn mark_finalized(&mut self, up_to: RequestId) -> Result<(), CacheError> {
        if let Some(current) = self.last_finalized_request_id {
            if up_to <= current {
                return Err(CacheError::FinalizedRegression {
                    current,
                    proposed: up_to,
                });
            }
        }
        self.last_finalized_request_id = Some(up_to);
        Ok(())
    }

    /// Record a confirmed exit request and advance the exit cursor to it
    ///
    /// # Errors
    ///
    /// Returns error if the worker is not after the current cursor or is
    /// already pending
    pub fn mark_exit_requested(
        &mut self,
        worker: &WorkerRecord,
        at: Timestamp,
    ) -> Result<(), CacheError> {
        let index = worker.activation_index;
        if let Some(current) = self.last_exit_cursor {
            if index <= current {
                return Err(CacheError::CursorRegression {
                    current,
                    proposed: index,
                });
            }
        }
        if self.pending_exits.contains_key(&index) {
            return Err(CacheError::DuplicateExit(index));
        }

        self.last_exit_cursor = Some(index);
        self.pending_exits.insert(
            index,
            PendingExit {
                key: worker.key.clone(),
                amount: worker.balance,
                status: WorkerStatus::ExitRequested { at },
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn worker(index: u64) -> WorkerRecord {
        WorkerRecord::active(index, 1, 1, &format!("0x{:02x}", index), Wei::from_ether(32))
    }

    fn roster(n: u64) -> Vec<WorkerRecord> {
        (0..n).map(worker).collect()
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = RoundCache::new();
        assert_eq!(cache.round, 0);
        assert!(cache.last_exit_cursor.is_none());
        assert!(cache.last_finalized_request_id.is_none());
        assert_eq!(
            cache.expected_inflow(Timestamp::from_secs(0), &InflowPolicy::default()),
            Wei::ZERO
        );
    }

    #[test]
    fn test_mark_finalized_monotonic() {
        let mut cache = RoundCache::new();
        cache.mark_finalized(RequestId::new(3)).unwrap();
        cache.mark_finalized(RequestId::new(5)).unwrap();
        assert_eq!(
            cache.mark_finalized(RequestId::new(5)),
            Err(CacheError::FinalizedRegression {
                current: RequestId::new(5),
                proposed: RequestId::new(5),
            })
        );
        assert_eq!(cache.last_finalized_request_id, Some(RequestId::new(5)));
    }

    #[test]
    fn test_mark_exit_requested() {
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(100);
        cache.mark_exit_requested(&worker(4), at).unwrap();
        cache.mark_exit_requested(&worker(6), at).unwrap();
        assert_eq!(cache.last_exit_cursor, Some(ActivationIndex::new(6)));
        assert!(matches!(
            cache.mark_exit_requested(&worker(5), at),
            Err(CacheError::CursorRegression { .. })
        ));
        assert_eq!(
            cache.expected_inflow(at, &InflowPolicy::default()),
            Wei::from_ether(64)
        );
    }

    #[test]
    fn test_inflow_timeout_inclusive() {
        let policy = InflowPolicy::default();
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(1_000);
        cache.mark_exit_requested(&worker(0), at).unwrap();

        let edge = at.add(policy.exit_request_timeout);
        assert_eq!(cache.expected_inflow(edge, &policy), Wei::from_ether(32));
        let past = edge.add(Duration::from_secs(1));
        assert_eq!(cache.expected_inflow(past, &policy), Wei::ZERO);
    }

    #[test]
    fn test_reconcile_expires_once() {
        let policy = InflowPolicy::default();
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(0);
        cache.mark_exit_requested(&worker(0), at).unwrap();
        cache.mark_exit_requested(&worker(1), at).unwrap();

        let later = at.add(Duration::from_hours(73));
        let report = cache.reconcile(&roster(3), later, &policy);
        assert_eq!(report.expired.len(), 2);
        assert!(cache.pending_exits.is_empty());
        // cursor is untouched by expiry
        assert_eq!(cache.last_exit_cursor, Some(ActivationIndex::new(1)));

        let again = cache.reconcile(&roster(3), later, &policy);
        assert!(again.expired.is_empty());
        assert_eq!(cache.expected_inflow(later, &policy), Wei::ZERO);
    }

    #[test]
    fn test_reconcile_exiting_keeps_counting() {
        let policy = InflowPolicy::default();
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(0);
        cache.mark_exit_requested(&worker(0), at).unwrap();

        let mut workers = roster(2);
        workers[0].status = WorkerStatus::Exiting;
        let later = at.add(Duration::from_hours(100));
        let report = cache.reconcile(&workers, later, &policy);
        assert_eq!(report.advanced, 1);
        assert!(report.expired.is_empty());
        assert_eq!(cache.expected_inflow(later, &policy), Wei::from_ether(32));

        let strict = InflowPolicy {
            count_exiting: false,
            ..policy
        };
        assert_eq!(cache.expected_inflow(later, &strict), Wei::ZERO);
    }

    #[test]
    fn test_reconcile_settles_exited() {
        let policy = InflowPolicy::default();
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(0);
        cache.mark_exit_requested(&worker(0), at).unwrap();

        let mut workers = roster(1);
        workers[0].status = WorkerStatus::Exited;
        let report = cache.reconcile(&workers, at, &policy);
        assert_eq!(report.settled, vec![ActivationIndex::new(0)]);
        assert!(cache.pending_exits.is_empty());
    }

    #[test]
    fn test_reconcile_never_moves_backward() {
        let policy = InflowPolicy::default();
        let mut cache = RoundCache::new();
        let at = Timestamp::from_secs(0);
        cache.mark_exit_requested(&worker(0), at).unwrap();

        // Roster still reports the worker active (confirmation lag)
        let report = cache.reconcile(&roster(1), at, &policy);
        assert_eq!(report.advanced, 0);
        let entry = &cache.pending_exits[&ActivationIndex::new(0)];
        assert_eq!(entry.status, WorkerStatus::ExitRequested { at });
    }

    #[test]
    fn test_cache_json_roundtrip() {
        let mut cache = RoundCache::new();
        cache.round = 7;
        cache.mark_finalized(RequestId::new(12)).unwrap();
        cache
            .mark_exit_requested(&worker(3), Timestamp::from_secs(9))
            .unwrap();
        let json = serde_json::to_vec(&cache).unwrap();
        let decoded: RoundCache = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, cache);
    }

    fn observed(code: u8) -> WorkerStatus {
        match code {
            0 => WorkerStatus::Active,
            1 => WorkerStatus::ExitRequested {
                at: Timestamp::from_secs(0),
            },
            2 => WorkerStatus::Exiting,
            _ => WorkerStatus::Exited,
        }
    }

    proptest! {
        #[test]
        fn prop_reconcile_only_moves_forward(
            rounds in proptest::collection::vec(
                (proptest::collection::vec(0u8..4, 4), 0u64..40_000),
                1..12,
            ),
        ) {
            let policy = InflowPolicy::default();
            let mut cache = RoundCache::new();
            for index in 0..4 {
                cache.mark_exit_requested(&worker(index), Timestamp::from_secs(0)).unwrap();
            }
            let mut now = Timestamp::from_secs(0);
            let mut stages: BTreeMap<ActivationIndex, u8> = cache
                .pending_exits
                .iter()
                .map(|(index, entry)| (*index, entry.status.stage()))
                .collect();
            let mut inflow = cache.expected_inflow(now, &policy);

            for (codes, step) in rounds {
                now = now.add(Duration::from_secs(step));
                let mut workers = roster(4);
                for (w, code) in workers.iter_mut().zip(codes) {
                    w.status = observed(code);
                }
                cache.reconcile(&workers, now, &policy);

                // Entries never come back and never regress
                for (index, entry) in &cache.pending_exits {
                    let before = stages.get(index).copied();
                    prop_assert!(before.is_some_and(|stage| entry.status.stage() >= stage));
                }
                stages = cache
                    .pending_exits
                    .iter()
                    .map(|(index, entry)| (*index, entry.status.stage()))
                    .collect();

                let after = cache.expected_inflow(now, &policy);
                prop_assert!(after <= inflow);
                inflow = after;
                prop_assert_eq!(cache.last_exit_cursor, Some(ActivationIndex::new(3)));
            }
        }
    }
}
