//! Commit journal.
//!
//! Written before the first emission of a commit and updated after each
//! confirmed emission. A journal found at the start of a round means the
//! previous commit was interrupted; the engine reads back external state to
//! decide which of its emissions landed.

use serde::{Deserialize, Serialize};
use sluice_core::{Hash, Timestamp, WorkerRecord};
use sluice_plan::{FinalizeBatch, RoundPlan};

/// Progress record of one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitJournal {
    /// Round being committed
    pub round: u64,
    /// Digest of the plan being committed
    pub plan_digest: Hash,
    /// Time stamped onto exit requests
    pub started_at: Timestamp,
    /// Finalization half, if any
    pub finalize: Option<FinalizeBatch>,
    /// Whether the finalize emission confirmed
    pub finalize_confirmed: bool,
    /// Exit half, in emission order
    pub exits: Vec<WorkerRecord>,
    /// Number of leading exits confirmed
    pub exits_confirmed: usize,
}

impl CommitJournal {
    /// Open a journal for committing `plan`
    #[must_use]
    pub fn open(round: u64, plan_digest: Hash, plan: &RoundPlan, started_at: Timestamp) -> Self {
        Self {
            round,
            plan_digest,
            started_at,
            finalize: plan.finalize.clone(),
            finalize_confirmed: false,
            exits: plan.exits.selected.clone(),
            exits_confirmed: 0,
        }
    }

    /// Check if the finalize half still needs confirmation
    #[must_use]
    pub fn finalize_pending(&self) -> bool {
        self.finalize.is_some() && !self.finalize_confirmed
    }

    /// Exits not yet confirmed, in emission order
    #[must_use]
    pub fn unconfirmed_exits(&self) -> &[WorkerRecord] {
        &self.exits[self.exits_confirmed.min(self.exits.len())..]
    }

    /// Check if every emission confirmed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.finalize_pending() && self.unconfirmed_exits().is_empty()
    }
}
