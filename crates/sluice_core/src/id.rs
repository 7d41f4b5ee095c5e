//! Identifiers for requests and workers.
//!
//! Request ids and activation indices are ordinal: they define the FIFO
//! order of the withdrawal queue and the exit order of the roster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Withdrawal request identifier, assigned in strictly increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Create from raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Position of a worker in activation-time order. Immutable per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationIndex(u64);

impl ActivationIndex {
    /// Create from raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActivationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ActivationIndex {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Staking module identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node operator identifier within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub u64);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator public key, hex encoded with `0x` prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubKey(String);

impl PubKey {
    /// Create from a hex string, normalizing case and prefix
    #[must_use]
    pub fn new(hex: impl AsRef<str>) -> Self {
        let hex = hex.as_ref().trim();
        let body = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);
        Self(format!("0x{}", body.to_ascii_lowercase()))
    }

    /// Get as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_order() {
        assert!(RequestId::new(1) < RequestId::new(2));
        assert_eq!(RequestId::from(7).as_u64(), 7);
        assert_eq!(RequestId::new(3).to_string(), "req_3");
    }

    #[test]
    fn test_activation_index_display() {
        assert_eq!(ActivationIndex::new(9).to_string(), "#9");
    }

    #[test]
    fn test_pubkey_normalized() {
        assert_eq!(PubKey::new("0xABcd").as_str(), "0xabcd");
        assert_eq!(PubKey::new("ABCD"), PubKey::new("0Xabcd"));
    }

    #[test]
    fn test_transparent_serde() {
        assert_eq!(serde_json::to_string(&RequestId::new(5)).unwrap(), "5");
        let idx: ActivationIndex = serde_json::from_str("12").unwrap();
        assert_eq!(idx, ActivationIndex::new(12));
    }
}
