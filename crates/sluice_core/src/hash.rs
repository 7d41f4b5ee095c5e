//! Content digests for round plans and commit journals.
//!
//! Uses BLAKE3 over the canonical postcard encoding.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Compute BLAKE3 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash the canonical encoding of a value
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be encoded
    pub fn of<T: Serialize>(value: &T) -> CoreResult<Self> {
        let bytes = postcard::to_stdvec(value)?;
        Ok(Self::compute(&bytes))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_compute() {
        let h1 = Hash::compute(b"round");
        let h2 = Hash::compute(b"round");
        assert_eq!(h1, h2);
        assert_ne!(h1, Hash::compute(b"other"));
    }

    #[test]
    fn test_hash_of_is_stable() {
        let a = Hash::of(&(1u64, "x")).unwrap();
        let b = Hash::of(&(1u64, "x")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Hash::of(&(2u64, "x")).unwrap());
    }

    #[test]
    fn test_hex_forms() {
        let hash = Hash::compute(b"test");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hash.to_string(), hex);
        assert!(hex.starts_with(&hash.short()));
        assert_eq!(hash.short().len(), 12);
    }
}
