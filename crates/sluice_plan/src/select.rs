//! Finalization selector.
//!
//! Picks the longest prefix of the non-finalized tail whose total fits the
//! available ether. The walk never skips an unaffordable request to admit a
//! later, smaller one: early requesters are never starved.

use sluice_core::{Wei, WithdrawalRequest};

/// Split of the tail into a financeable prefix and the rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    /// Requests to finalize this round, in id order
    pub to_finalize: &'a [WithdrawalRequest],
    /// Everything from the first unaffordable request on, in id order
    pub remainder: &'a [WithdrawalRequest],
    /// Sum of `requested_ether` over `to_finalize`
    pub financed: Wei,
}

/// Select the maximal financeable prefix of `tail` within `available`
#[must_use]
pub fn select(tail: &[WithdrawalRequest], available: Wei) -> Selection<'_> {
    let (split, financed) = fitting_prefix(tail, available);
    let (to_finalize, remainder) = tail.split_at(split);
    Selection {
        to_finalize,
        remainder,
        financed,
    }
}

/// Length and total of the longest prefix whose running sum stays within
/// `budget`.
pub(crate) fn fitting_prefix(requests: &[WithdrawalRequest], budget: Wei) -> (usize, Wei) {
    let mut running = Wei::ZERO;
    for (i, request) in requests.iter().enumerate() {
        match running.checked_add(request.requested_ether) {
            Some(next) if next <= budget => running = next,
            _ => return (i, running),
        }
    }
    (requests.len(), running)
}
