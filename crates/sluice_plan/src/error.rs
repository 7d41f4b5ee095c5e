//! Planner errors.
//!
//! Every variant means the inputs contradict the durable cursors or the
//! ordering guarantees of the sources. None of them is retryable within the
//! same round.

use sluice_core::{ActivationIndex, RequestId};

/// Planner error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Queued requests are not strictly ascending by id
    #[error("request queue out of order: {next} follows {previous}")]
    RequestsOutOfOrder {
        /// Id before the break
        previous: RequestId,
        /// Id that is not greater than `previous`
        next: RequestId,
    },

    /// A request at or below the finalized cursor is still queued
    #[error("request {id} reappeared after finalization up to {last_finalized}")]
    AlreadyFinalized {
        /// Queued id at or below the cursor
        id: RequestId,
        /// Finalized cursor from the cache
        last_finalized: RequestId,
    },

    /// Roster is not strictly ascending by activation index
    #[error("roster out of order: {next} follows {previous}")]
    RosterOutOfOrder {
        /// Index before the break
        previous: ActivationIndex,
        /// Index that is not greater than `previous`
        next: ActivationIndex,
    },

    /// Exit cursor points beyond the last worker on the roster
    #[error("exit cursor {cursor} is past the end of the roster (last: {last:?})")]
    CursorPastRoster {
        /// Exit cursor from the cache
        cursor: ActivationIndex,
        /// Highest index on the roster, if any
        last: Option<ActivationIndex>,
    },

    /// Expected per-worker balance is zero
    #[error("expected worker balance must be non-zero")]
    ZeroWorkerBalance,
}
