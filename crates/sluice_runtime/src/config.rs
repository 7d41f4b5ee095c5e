//! Engine configuration.

use crate::error::{EngineError, EngineResult};
use crate::liquidity::LiquidityPolicy;
use serde::{Deserialize, Serialize};
use sluice_core::Wei;
use sluice_plan::PlanParams;
use sluice_storage::InflowPolicy;
use std::path::Path;
use std::time::Duration;

/// Round engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal stake released by one exiting worker
    pub expected_worker_balance: Wei,
    /// Expected-inflow accrual and decay
    pub inflow: InflowPolicy,
    /// Source weights in normal operation
    pub liquidity: LiquidityPolicy,
    /// Source weights while slashing is suspected
    pub slashing_policy: LiquidityPolicy,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Per-emission timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Blocks a request must age before it can be finalized
    pub request_block_gap: u64,
    /// Upper bound on exits per round (0 = unlimited)
    pub max_exits_per_round: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expected_worker_balance: Wei::from_ether(32),
            inflow: InflowPolicy::default(),
            liquidity: LiquidityPolicy::FULL,
            slashing_policy: LiquidityPolicy::WITHDRAWAL_CREDENTIALS_ONLY,
            read_timeout_ms: 10_000,
            write_timeout_ms: 30_000,
            request_block_gap: 0,
            max_exits_per_round: 0,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the result fails validation
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or fails validation
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first bad field
    pub fn validate(&self) -> EngineResult<()> {
        if self.expected_worker_balance.is_zero() {
            return Err(EngineError::Config(
                "expected_worker_balance must be non-zero".to_string(),
            ));
        }
        if self.inflow.exit_request_timeout.is_zero() {
            return Err(EngineError::Config(
                "inflow.exit_request_timeout must be non-zero".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(EngineError::Config("timeouts must be non-zero".to_string()));
        }
        self.liquidity
            .validate()
            .map_err(|e| EngineError::Config(format!("liquidity: {}", e)))?;
        self.slashing_policy
            .validate()
            .map_err(|e| EngineError::Config(format!("slashing_policy: {}", e)))?;
        Ok(())
    }

    /// Timeout applied to each collaborator read
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Timeout applied to each sink write
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Liquidity policy for a round
    #[must_use]
    pub const fn liquidity_policy(&self, slashing_suspected: bool) -> &LiquidityPolicy {
        if slashing_suspected {
            &self.slashing_policy
        } else {
            &self.liquidity
        }
    }

    /// Planner parameters
    #[must_use]
    pub const fn plan_params(&self) -> PlanParams {
        PlanParams {
            expected_worker_balance: self.expected_worker_balance,
            max_exits_per_round: self.max_exits_per_round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::Duration as Span;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.expected_worker_balance, Wei::from_ether(32));
        assert_eq!(config.inflow.exit_request_timeout, Span::from_hours(72));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_block_gap, 0);
        assert_eq!(config.liquidity_policy(true).el_rewards_bps, 0);
        assert_eq!(config.liquidity_policy(false).el_rewards_bps, 10_000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"max_exits_per_round": 5, "inflow": {"count_exiting": false}}"#,
        )
        .unwrap();
        assert_eq!(config.max_exits_per_round, 5);
        assert!(!config.inflow.count_exiting);
        assert_eq!(config.inflow.exit_request_timeout, Span::from_hours(72));
        assert_eq!(config.read_timeout_ms, 10_000);
    }

    #[test]
    fn test_amounts_parse_from_strings() {
        let config = EngineConfig::from_json_str(
            r#"{"expected_worker_balance": "16000000000000000000"}"#,
        )
        .unwrap();
        assert_eq!(config.expected_worker_balance, Wei::from_ether(16));
    }

    #[test]
    fn test_validation_rejects_zero_balance() {
        let err = EngineConfig::from_json_str(r#"{"expected_worker_balance": 0}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("expected_worker_balance")));
    }

    #[test]
    fn test_validation_rejects_bps_overflow() {
        let config = EngineConfig {
            liquidity: LiquidityPolicy {
                el_rewards_bps: 20_000,
                ..LiquidityPolicy::FULL
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{not json"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sluice.json");
        std::fs::write(&path, r#"{"request_block_gap": 123}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.request_block_gap, 123);

        let missing = EngineConfig::from_json_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(EngineError::Config(_))));
    }
}
