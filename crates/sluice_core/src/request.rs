//! Withdrawal requests.

use crate::amount::{Shares, Wei};
use crate::id::RequestId;
use serde::{Deserialize, Serialize};

/// A queued demand for ether, funded by retiring shares
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Monotonically increasing id
    pub id: RequestId,
    /// Block at which the request was submitted
    pub block_number: u64,
    /// Ether owed when finalized
    pub requested_ether: Wei,
    /// Shares retired on finalization
    pub shares_to_burn: Shares,
}

impl WithdrawalRequest {
    /// Create a new request
    #[must_use]
    pub fn new(id: u64, block_number: u64, requested_ether: Wei, shares_to_burn: Shares) -> Self {
        Self {
            id: RequestId::new(id),
            block_number,
            requested_ether,
            shares_to_burn,
        }
    }
}
