//! Liquidity aggregator.
//!
//! Sums the three balances that can fund withdrawals. A source that cannot
//! be read fails the round; it is never counted as zero.

use crate::error::{EngineError, EngineResult};
use crate::source::{read_within, BalanceSource};
use serde::{Deserialize, Serialize};
use sluice_core::{Wei, BPS_DENOMINATOR};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Weight of each source in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityPolicy {
    /// Withdrawal-credentials weight
    pub withdrawal_credentials_bps: u16,
    /// Execution-layer rewards weight
    pub el_rewards_bps: u16,
    /// Deposit buffer weight
    pub deposit_buffer_bps: u16,
}

impl LiquidityPolicy {
    /// Count every source in full
    pub const FULL: Self = Self {
        withdrawal_credentials_bps: 10_000,
        el_rewards_bps: 10_000,
        deposit_buffer_bps: 10_000,
    };

    /// Count only withdrawal credentials; used while slashing is suspected
    pub const WITHDRAWAL_CREDENTIALS_ONLY: Self = Self {
        withdrawal_credentials_bps: 10_000,
        el_rewards_bps: 0,
        deposit_buffer_bps: 0,
    };

    /// Check that no weight exceeds 100%
    ///
    /// # Errors
    ///
    /// Returns error naming the first weight above 10 000 bps
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("withdrawal_credentials_bps", self.withdrawal_credentials_bps),
            ("el_rewards_bps", self.el_rewards_bps),
            ("deposit_buffer_bps", self.deposit_buffer_bps),
        ];
        for (name, bps) in weights {
            if u128::from(bps) > BPS_DENOMINATOR {
                return Err(format!("{} is {} bps, above {}", name, bps, BPS_DENOMINATOR));
            }
        }
        Ok(())
    }
}

impl Default for LiquidityPolicy {
    fn default() -> Self {
        Self::FULL
    }
}

/// Raw balances and the weighted total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liquidity {
    /// Withdrawal-credentials balance as read
    pub withdrawal_credentials: Wei,
    /// Execution-layer rewards balance as read
    pub el_rewards: Wei,
    /// Deposit buffer balance as read
    pub deposit_buffer: Wei,
    /// Ether available for withdrawals after weighting
    pub available: Wei,
    /// Policy the total was weighted with
    pub policy: LiquidityPolicy,
}

/// Reads and weights the three balance sources
#[derive(Clone)]
pub struct LiquidityAggregator {
    withdrawal_credentials: Arc<dyn BalanceSource>,
    el_rewards: Arc<dyn BalanceSource>,
    deposit_buffer: Arc<dyn BalanceSource>,
    read_timeout: Duration,
}

impl LiquidityAggregator {
    /// Create an aggregator over the three sources
    #[must_use]
    pub fn new(
        withdrawal_credentials: Arc<dyn BalanceSource>,
        el_rewards: Arc<dyn BalanceSource>,
        deposit_buffer: Arc<dyn BalanceSource>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            withdrawal_credentials,
            el_rewards,
            deposit_buffer,
            read_timeout,
        }
    }

    /// Ether currently available for withdrawals
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if any source fails or times out
    pub async fn available_ether(&self, policy: &LiquidityPolicy) -> EngineResult<Liquidity> {
        let (withdrawal_credentials, el_rewards, deposit_buffer) = futures::try_join!(
            self.read(&self.withdrawal_credentials),
            self.read(&self.el_rewards),
            self.read(&self.deposit_buffer),
        )?;

        let available = withdrawal_credentials
            .mul_bps(policy.withdrawal_credentials_bps)
            .checked_add(el_rewards.mul_bps(policy.el_rewards_bps))
            .and_then(|sum| sum.checked_add(deposit_buffer.mul_bps(policy.deposit_buffer_bps)))
            .ok_or_else(|| EngineError::InvariantViolation("liquidity overflows u128".to_string()))?;

        debug!(
            %withdrawal_credentials,
            %el_rewards,
            %deposit_buffer,
            %available,
            "liquidity read"
        );

        Ok(Liquidity {
            withdrawal_credentials,
            el_rewards,
            deposit_buffer,
            available,
            policy: *policy,
        })
    }

    async fn read(&self, source: &Arc<dyn BalanceSource>) -> EngineResult<Wei> {
        read_within(source.name(), self.read_timeout, source.balance()).await
    }
}
