//! Shortfall estimator.
//!
//! Ether promised by exits already in motion can cover requests the selector
//! could not finance, but it has not arrived, so those requests stay queued.
//! What the promise cannot cover is the shortfall that new exits must fill.

use crate::select::fitting_prefix;
use serde::{Deserialize, Serialize};
use sluice_core::{Wei, WithdrawalRequest};

/// Result of the second pass over the unfinanced remainder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    /// `available - financed + expected_inflow`
    pub budget: Wei,
    /// Requests covered by the budget (retried next round, not finalized)
    pub covered: u64,
    /// Ether of the covered requests
    pub covered_ether: Wei,
    /// Ether of the requests nothing covers
    pub missing: Wei,
}

/// Estimate the ether still missing after liquidity and in-flight exits
#[must_use]
pub fn estimate(
    remainder: &[WithdrawalRequest],
    available: Wei,
    financed: Wei,
    expected_inflow: Wei,
) -> Shortfall {
    let budget = available
        .saturating_sub(financed)
        .saturating_add(expected_inflow);
    let (covered, covered_ether) = fitting_prefix(remainder, budget);
    let missing = remainder[covered..].iter().map(|r| r.requested_ether).sum();

    Shortfall {
        budget,
        covered: covered as u64,
        covered_ether,
        missing,
    }
}
