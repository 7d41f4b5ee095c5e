//! Round engine.
//!
//! One round: load the cache, read every source once, resolve any
//! interrupted commit, reconcile pending exits, plan, and hand the plan to
//! the reporter. Rounds never overlap; `run_round` takes `&mut self`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::liquidity::{Liquidity, LiquidityAggregator};
use crate::reporter::{RecoveryReport, Reporter};
use crate::source::{read_within, Collaborators};
use serde::{Deserialize, Serialize};
use sluice_core::{Hash, Shares, Timestamp, Wei};
use sluice_plan::{check_roster, plan_round, PartialFulfillment, PlanInputs, RequestLedger, RoundPlan};
use sluice_storage::{CacheStore, Reconciliation, RoundCache};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Caller-supplied facts for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundContext {
    /// Wall-clock time of the round
    pub now: Timestamp,
    /// Block the round reports against; enables the request age gate
    pub reference_block: Option<u64>,
    /// Pooled-ether snapshot for the finalization price
    pub total_pooled_ether: Wei,
    /// Share-supply snapshot for the finalization price
    pub total_shares: Shares,
    /// Use the slashing liquidity policy
    pub slashing_suspected: bool,
}

impl RoundContext {
    /// Context at `now` with empty price snapshots
    #[must_use]
    pub fn at(now: Timestamp) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }
}

/// Result of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Round number
    pub round: u64,
    /// Plan digest, hex
    pub digest: String,
    /// Whether the plan was emitted and the cache committed
    pub committed: bool,
    /// Liquidity breakdown
    pub liquidity: Liquidity,
    /// The plan
    pub plan: RoundPlan,
    /// Pending-exit changes observed on the roster
    pub reconciliation: Reconciliation,
    /// Interrupted commit resolved at the start of the round
    pub recovery: Option<RecoveryReport>,
    /// Cache after the round
    pub cache: RoundCache,
}

impl RoundOutcome {
    /// Partial-fulfillment warning, if the round selected fewer exits than needed
    #[must_use]
    pub fn partial(&self) -> Option<&PartialFulfillment> {
        self.plan.exits.partial.as_ref()
    }
}

struct Prepared {
    cache: RoundCache,
    liquidity: Liquidity,
    plan: RoundPlan,
    digest: Hash,
    reconciliation: Reconciliation,
    recovery: Option<RecoveryReport>,
}

/// Drives reporting rounds
pub struct RoundEngine {
    config: EngineConfig,
    collaborators: Collaborators,
    liquidity: LiquidityAggregator,
    reporter: Reporter,
    store: Arc<dyn CacheStore>,
}

impl RoundEngine {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration fails validation
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        store: Arc<dyn CacheStore>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let liquidity = LiquidityAggregator::new(
            collaborators.withdrawal_credentials.clone(),
            collaborators.el_rewards.clone(),
            collaborators.deposit_buffer.clone(),
            config.read_timeout(),
        );
        let reporter = Reporter::new(
            store.clone(),
            collaborators.finalization.clone(),
            collaborators.exits.clone(),
            config.write_timeout(),
        );
        Ok(Self {
            config,
            collaborators,
            liquidity,
            reporter,
            store,
        })
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plan a round without emitting or writing anything
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be read or the inputs contradict the
    /// cache
    pub async fn dry_run(&self, ctx: &RoundContext) -> EngineResult<RoundOutcome> {
        let cache = self.store.load()?;
        let span = info_span!("round", round = cache.round + 1, dry_run = true);
        async {
            let prepared = self.prepare(cache, ctx).await.inspect_err(log_failure)?;
            Ok(RoundOutcome {
                round: prepared.cache.round + 1,
                digest: prepared.digest.to_hex(),
                committed: false,
                liquidity: prepared.liquidity,
                plan: prepared.plan,
                reconciliation: prepared.reconciliation,
                recovery: prepared.recovery,
                cache: prepared.cache,
            })
        }
        .instrument(span)
        .await
    }

    /// Run one round end to end
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` or `InvariantViolation` with nothing
    /// mutated, or `EmissionFailure` with the confirmed prefix persisted
    pub async fn run_round(&mut self, ctx: &RoundContext) -> EngineResult<RoundOutcome> {
        let cache = self.store.load()?;
        let span = info_span!("round", round = cache.round + 1);
        async {
            let prepared = self.prepare(cache, ctx).await.inspect_err(log_failure)?;

            if let Some(partial) = &prepared.plan.exits.partial {
                warn!(
                    needed = partial.needed,
                    selected = partial.selected,
                    deficit = partial.deficit(),
                    capped = partial.capped,
                    "partial exit fulfillment"
                );
            }

            let committed = self
                .reporter
                .commit(prepared.cache, &prepared.plan, prepared.digest, ctx.now)
                .await
                .inspect_err(log_failure)?;

            info!(
                digest = %prepared.digest.short(),
                finalized = prepared.plan.finalize.as_ref().map_or(0, |b| b.count),
                exits = prepared.plan.exits.selected.len(),
                missing = %prepared.plan.shortfall.missing,
                "round committed"
            );

            Ok(RoundOutcome {
                round: committed.round,
                digest: prepared.digest.to_hex(),
                committed: true,
                liquidity: prepared.liquidity,
                plan: prepared.plan,
                reconciliation: prepared.reconciliation,
                recovery: prepared.recovery,
                cache: committed,
            })
        }
        .instrument(span)
        .await
    }

    async fn prepare(&self, cache: RoundCache, ctx: &RoundContext) -> EngineResult<Prepared> {
        let policy = self.config.liquidity_policy(ctx.slashing_suspected);
        let timeout = self.config.read_timeout();
        let (liquidity, queued, roster) = futures::try_join!(
            self.liquidity.available_ether(policy),
            read_within("requests", timeout, self.collaborators.requests.queued_requests()),
            read_within("roster", timeout, self.collaborators.roster.workers()),
        )?;

        check_roster(&roster, None)?;
        let (mut cache, recovery) = self.reporter.recover(cache, &queued, &roster)?;
        let reconciliation = cache.reconcile(&roster, ctx.now, &self.config.inflow);

        let mut ledger = RequestLedger::new(queued, cache.last_finalized_request_id)?;
        if let Some(block) = ctx.reference_block {
            ledger = ledger.with_block_cutoff(block.saturating_sub(self.config.request_block_gap));
        }

        let expected_inflow = cache.expected_inflow(ctx.now, &self.config.inflow);
        let plan = plan_round(
            &PlanInputs {
                ledger: &ledger,
                roster: &roster,
                available: liquidity.available,
                expected_inflow,
                last_exit_cursor: cache.last_exit_cursor,
                total_pooled_ether: ctx.total_pooled_ether,
                total_shares: ctx.total_shares,
            },
            &self.config.plan_params(),
        )?;
        let digest = plan
            .digest()
            .map_err(|e| EngineError::InvariantViolation(e.to_string()))?;

        Ok(Prepared {
            cache,
            liquidity,
            plan,
            digest,
            reconciliation,
            recovery,
        })
    }
}

fn log_failure(err: &EngineError) {
    if err.is_fatal() {
        error!(%err, "round aborted");
    } else {
        warn!(%err, "round failed");
    }
}
