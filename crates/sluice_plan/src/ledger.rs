//! Request ledger: the ordered, non-finalized view of the withdrawal queue.
//!
//! The ledger is built from one read of the request source and the
//! finalized cursor from the round cache. It never mutates; finalization is
//! recorded by the reporter on the cache, and the next round builds a fresh
//! ledger from a fresh read.

use crate::error::PlanError;
use sluice_core::{RequestId, WithdrawalRequest};

/// Validated snapshot of queued withdrawal requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLedger {
    /// Requests strictly after the finalized cursor, ascending by id
    requests: Vec<WithdrawalRequest>,
    /// Length of the prefix eligible this round
    eligible: usize,
    last_finalized: Option<RequestId>,
}

impl RequestLedger {
    /// Build a ledger from queued requests and the finalized cursor
    ///
    /// # Errors
    ///
    /// Returns error if ids are not strictly ascending, or if a request at or
    /// below `last_finalized` is still queued
    pub fn new(
        queued: Vec<WithdrawalRequest>,
        last_finalized: Option<RequestId>,
    ) -> Result<Self, PlanError> {
        for pair in queued.windows(2) {
            if pair[1].id <= pair[0].id {
                return Err(PlanError::RequestsOutOfOrder {
                    previous: pair[0].id,
                    next: pair[1].id,
                });
            }
        }

        if let (Some(last), Some(first)) = (last_finalized, queued.first()) {
            if first.id <= last {
                return Err(PlanError::AlreadyFinalized {
                    id: first.id,
                    last_finalized: last,
                });
            }
        }

        let eligible = queued.len();
        Ok(Self {
            requests: queued,
            eligible,
            last_finalized,
        })
    }

    /// Defer requests submitted after `max_block`.
    ///
    /// The tail is cut at the first too-recent request, so a late request
    /// also defers every request queued behind it.
    #[must_use]
    pub fn with_block_cutoff(mut self, max_block: u64) -> Self {
        self.eligible = self
            .requests
            .iter()
            .position(|r| r.block_number > max_block)
            .unwrap_or(self.requests.len());
        self
    }

    /// Requests eligible this round, ascending by id, strictly after the
    /// finalized cursor
    #[must_use]
    pub fn non_finalized_tail(&self) -> &[WithdrawalRequest] {
        &self.requests[..self.eligible]
    }

    /// Requests held back by the block cutoff
    #[must_use]
    pub fn deferred(&self) -> &[WithdrawalRequest] {
        &self.requests[self.eligible..]
    }

    /// Finalized cursor this ledger was built against
    #[must_use]
    pub const fn last_finalized(&self) -> Option<RequestId> {
        self.last_finalized
    }

    /// Total number of queued requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
