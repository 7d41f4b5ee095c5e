//! Round planning: selector, estimator and scheduler composed.
//!
//! `plan_round` is a pure function of a cache snapshot and one read of each
//! source. Two calls with the same inputs return equal plans with equal
//! digests, which is what makes a failed round safe to recompute from scratch.

use crate::error::PlanError;
use crate::ledger::RequestLedger;
use crate::schedule::{check_roster, select_next, validators_needed, ExitSelection};
use crate::select::select;
use crate::shortfall::{estimate, Shortfall};
use serde::{Deserialize, Serialize};
use sluice_core::{ActivationIndex, CoreResult, Hash, RequestId, Shares, Wei, WorkerRecord};
use tracing::debug;

/// Planner parameters taken from engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanParams {
    /// Nominal stake released by one exiting worker
    pub expected_worker_balance: Wei,
    /// Upper bound on exits per round (0 = unlimited)
    pub max_exits_per_round: u64,
}

/// Inputs of one round
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    /// Validated withdrawal queue
    pub ledger: &'a RequestLedger,
    /// Roster, ascending by activation index
    pub roster: &'a [WorkerRecord],
    /// Ether available for withdrawals now
    pub available: Wei,
    /// Ether promised by in-flight exits
    pub expected_inflow: Wei,
    /// Last worker requested to exit
    pub last_exit_cursor: Option<ActivationIndex>,
    /// Pooled-ether snapshot for the finalization price
    pub total_pooled_ether: Wei,
    /// Share-supply snapshot for the finalization price
    pub total_shares: Shares,
}

/// Finalize-prefix instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeBatch {
    /// First request in the batch
    pub first_id: RequestId,
    /// Last request in the batch; everything up to it is finalized
    pub last_id: RequestId,
    /// Number of requests
    pub count: u64,
    /// Ether locked for the batch
    pub ether_locked: Wei,
    /// Shares retired by the batch
    pub shares_to_burn: Shares,
    /// Pooled-ether snapshot supplied by the caller
    pub total_pooled_ether: Wei,
    /// Share-supply snapshot supplied by the caller
    pub total_shares: Shares,
}

/// Everything a round decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPlan {
    /// Liquidity the selector worked with
    pub available: Wei,
    /// Expected inflow the estimator worked with
    pub expected_inflow: Wei,
    /// Finalization, if any request fits
    pub finalize: Option<FinalizeBatch>,
    /// Estimator result over the unfinanced remainder
    pub shortfall: Shortfall,
    /// Workers to ask to exit
    pub exits: ExitSelection,
    /// Requests held back by the block cutoff
    pub deferred_requests: u64,
}

impl RoundPlan {
    /// Stable digest of the plan
    ///
    /// # Errors
    ///
    /// Returns error if the plan cannot be encoded
    pub fn digest(&self) -> CoreResult<Hash> {
        Hash::of(self)
    }

    /// Ether locked by the finalization half
    #[must_use]
    pub fn financed(&self) -> Wei {
        self.finalize
            .as_ref()
            .map_or(Wei::ZERO, |batch| batch.ether_locked)
    }

    /// Check if the round emits nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.finalize.is_none() && self.exits.is_empty()
    }
}

/// Plan one round
///
/// # Errors
///
/// Returns error if the roster contradicts the exit cursor or the
/// configuration is unusable
pub fn plan_round(inputs: &PlanInputs<'_>, params: &PlanParams) -> Result<RoundPlan, PlanError> {
    check_roster(inputs.roster, inputs.last_exit_cursor)?;

    let tail = inputs.ledger.non_finalized_tail();
    let selection = select(tail, inputs.available);

    let finalize = match (selection.to_finalize.first(), selection.to_finalize.last()) {
        (Some(first), Some(last)) => Some(FinalizeBatch {
            first_id: first.id,
            last_id: last.id,
            count: selection.to_finalize.len() as u64,
            ether_locked: selection.financed,
            shares_to_burn: selection.to_finalize.iter().map(|r| r.shares_to_burn).sum(),
            total_pooled_ether: inputs.total_pooled_ether,
            total_shares: inputs.total_shares,
        }),
        _ => None,
    };

    let shortfall = estimate(
        selection.remainder,
        inputs.available,
        selection.financed,
        inputs.expected_inflow,
    );

    let needed = validators_needed(shortfall.missing, params.expected_worker_balance)?;
    let count = if params.max_exits_per_round > 0 {
        needed.min(params.max_exits_per_round)
    } else {
        needed
    };
    let exits = select_next(inputs.roster, inputs.last_exit_cursor, count, needed);

    debug!(
        tail = tail.len(),
        finalize = selection.to_finalize.len(),
        financed = %selection.financed,
        budget = %shortfall.budget,
        covered = shortfall.covered,
        missing = %shortfall.missing,
        needed,
        selected = exits.selected.len(),
        "round planned"
    );

    Ok(RoundPlan {
        available: inputs.available,
        expected_inflow: inputs.expected_inflow,
        finalize,
        shortfall,
        exits,
        deferred_requests: inputs.ledger.deferred().len() as u64,
    })
}
