//! Reporter: emits a plan and commits the round cache.
//!
//! Emission order is fixed: finalize, then exit requests in activation
//! order, then the final cache write. A journal is saved before the first
//! emission and after every confirmed one, so a failure or crash leaves the
//! confirmed prefix recorded and the rest detectable.

use crate::error::{EmissionStage, EngineError, EngineResult};
use crate::source::{ExitSink, FinalizationSink, SourceError};
use serde::{Deserialize, Serialize};
use sluice_core::{Hash, Timestamp, WithdrawalRequest, WorkerRecord};
use sluice_plan::RoundPlan;
use sluice_storage::{CacheStore, CommitJournal, RoundCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What recovery found for an interrupted commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Round whose commit was interrupted
    pub round: u64,
    /// Digest of the interrupted plan
    pub plan_digest: Hash,
    /// Finalize confirmed by read-back
    pub finalize_recovered: bool,
    /// Exits confirmed by read-back
    pub exits_recovered: usize,
    /// Exits that never landed and were dropped from the cache
    pub exits_abandoned: usize,
}

/// Emits plans to the sinks and persists the cache
#[derive(Clone)]
pub struct Reporter {
    store: Arc<dyn CacheStore>,
    finalization: Arc<dyn FinalizationSink>,
    exits: Arc<dyn ExitSink>,
    write_timeout: Duration,
}

impl Reporter {
    /// Create a reporter
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        finalization: Arc<dyn FinalizationSink>,
        exits: Arc<dyn ExitSink>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            finalization,
            exits,
            write_timeout,
        }
    }

    /// Emit `plan` and commit the cache.
    ///
    /// Returns the committed cache with `round` advanced. A no-op plan still
    /// commits so the round counter moves.
    ///
    /// # Errors
    ///
    /// Returns `EmissionFailure` if a sink does not confirm. Everything
    /// confirmed before the failure is already persisted.
    pub async fn commit(
        &self,
        mut cache: RoundCache,
        plan: &RoundPlan,
        digest: Hash,
        now: Timestamp,
    ) -> EngineResult<RoundCache> {
        let round = cache.round + 1;

        if !plan.is_noop() {
            let mut journal = CommitJournal::open(round, digest, plan, now);
            cache.journal = Some(journal.clone());
            self.store.save(&cache)?;
            debug!(round, digest = %digest.short(), "commit journal opened");

            if let Some(batch) = &plan.finalize {
                self.emit(EmissionStage::Finalize, self.finalization.finalize_up_to(batch))
                    .await?;
                cache.mark_finalized(batch.last_id)?;
                journal.finalize_confirmed = true;
                cache.journal = Some(journal.clone());
                self.store.save(&cache)?;
                info!(first = %batch.first_id, last = %batch.last_id, ether = %batch.ether_locked, "finalized");
            }

            for worker in &plan.exits.selected {
                self.emit(
                    EmissionStage::ExitRequest(worker.activation_index),
                    self.exits.request_exit(&worker.key),
                )
                .await?;
                cache.mark_exit_requested(worker, now)?;
                journal.exits_confirmed += 1;
                cache.journal = Some(journal.clone());
                self.store.save(&cache)?;
                info!(worker = %worker.activation_index, key = %worker.key, "exit requested");
            }
        }

        cache.journal = None;
        cache.round = round;
        self.store.save(&cache)?;
        Ok(cache)
    }

    /// Resolve an interrupted commit against freshly read external state.
    ///
    /// The finalize half counts as landed iff no queued request is at or
    /// below its last id. Exits count as landed while the roster shows the
    /// worker no longer active; the first still-active worker and everything
    /// after it are abandoned, since emission is ordered. The result is not
    /// persisted here; the round's own commit writes it.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the journal contradicts the cache
    pub fn recover(
        &self,
        mut cache: RoundCache,
        queued: &[WithdrawalRequest],
        roster: &[WorkerRecord],
    ) -> EngineResult<(RoundCache, Option<RecoveryReport>)> {
        let Some(journal) = cache.journal.take() else {
            return Ok((cache, None));
        };

        let mut report = RecoveryReport {
            round: journal.round,
            plan_digest: journal.plan_digest,
            finalize_recovered: false,
            exits_recovered: 0,
            exits_abandoned: 0,
        };

        let mut finalize_landed = !journal.finalize_pending();
        if let Some(batch) = journal.finalize.as_ref().filter(|_| !finalize_landed) {
            if queued.iter().all(|r| r.id > batch.last_id) {
                cache.mark_finalized(batch.last_id)?;
                report.finalize_recovered = true;
                finalize_landed = true;
            }
        }

        let unconfirmed = journal.unconfirmed_exits();
        // Exits are only emitted after the finalize half confirms
        if finalize_landed {
            for worker in unconfirmed {
                let landed = roster
                    .binary_search_by_key(&worker.activation_index, |w| w.activation_index)
                    .is_ok_and(|pos| !roster[pos].status.is_active());
                if !landed {
                    break;
                }
                cache.mark_exit_requested(worker, journal.started_at)?;
                report.exits_recovered += 1;
            }
        }
        report.exits_abandoned = unconfirmed.len() - report.exits_recovered;

        cache.round = cache.round.max(journal.round);
        warn!(
            round = journal.round,
            digest = %journal.plan_digest.short(),
            finalize_recovered = report.finalize_recovered,
            exits_recovered = report.exits_recovered,
            exits_abandoned = report.exits_abandoned,
            "recovered interrupted commit"
        );
        Ok((cache, Some(report)))
    }

    async fn emit<F>(&self, stage: EmissionStage, write: F) -> EngineResult<()>
    where
        F: Future<Output = Result<(), SourceError>>,
    {
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(EngineError::EmissionFailure {
                stage,
                reason: err.to_string(),
            }),
            Err(_) => Err(EngineError::EmissionFailure {
                stage,
                reason: format!("no confirmation within {:?}", self.write_timeout),
            }),
        }
    }
}
