//! Fixed-point amounts.
//!
//! Ether is counted in wei and shares in their raw on-chain unit, both as
//! `u128`. Human-readable encodings (JSON) write amounts as decimal strings so
//! values above 2^53 survive common tooling; binary encodings use native `u128`.

use crate::error::{CoreError, CoreResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Wei in one ether
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Basis points in a whole
pub const BPS_DENOMINATOR: u128 = 10_000;

macro_rules! amount_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u128);

        impl $name {
            /// The zero amount
            pub const ZERO: Self = Self(0);

            /// Create from a raw integer amount
            #[must_use]
            pub const fn new(raw: u128) -> Self {
                Self(raw)
            }

            /// Get the raw integer amount
            #[must_use]
            pub const fn raw(&self) -> u128 {
                self.0
            }

            /// Check if the amount is zero
            #[must_use]
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            /// Add, returning `None` on overflow
            #[must_use]
            pub fn checked_add(self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }

            /// Subtract, returning `None` on underflow
            #[must_use]
            pub fn checked_sub(self, other: Self) -> Option<Self> {
                self.0.checked_sub(other.0).map(Self)
            }

            /// Add, clamping at the maximum
            #[must_use]
            pub fn saturating_add(self, other: Self) -> Self {
                Self(self.0.saturating_add(other.0))
            }

            /// Subtract, clamping at zero
            #[must_use]
            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u128> for $name {
            fn from(raw: u128) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                s.trim()
                    .parse::<u128>()
                    .map(Self)
                    .map_err(|e| CoreError::InvalidAmount {
                        reason: format!("{:?}: {}", s, e),
                    })
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, Self::saturating_add)
            }
        }

        impl<'a> Sum<&'a $name> for $name {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                iter.copied().sum()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(&self.0)
                } else {
                    serializer.serialize_u128(self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    deserializer.deserialize_any(RawAmountVisitor).map(Self)
                } else {
                    u128::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

amount_type!(
    /// An ether amount in wei
    Wei
);

amount_type!(
    /// A share amount in raw share units
    Shares
);

impl Wei {
    /// Create from whole ether
    #[must_use]
    pub const fn from_ether(ether: u64) -> Self {
        Self(ether as u128 * WEI_PER_ETHER)
    }

    /// Scale by a weight in basis points, rounding down.
    ///
    /// Splits the multiplication so it cannot overflow for any `u128`.
    #[must_use]
    pub fn mul_bps(self, bps: u16) -> Self {
        let bps = u128::from(bps);
        let whole = (self.0 / BPS_DENOMINATOR) * bps;
        let part = (self.0 % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR;
        Self(whole.saturating_add(part))
    }

    /// Number of `unit`-sized chunks needed to cover this amount (ceiling).
    ///
    /// Returns `None` when `unit` is zero.
    #[must_use]
    pub fn chunks_of(self, unit: Wei) -> Option<u128> {
        if unit.is_zero() {
            return None;
        }
        Some(self.0.div_ceil(unit.0))
    }
}

/// Accepts amounts as decimal strings or as JSON integers.
struct RawAmountVisitor;

impl<'de> Visitor<'de> for RawAmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("negative amount: {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.trim()
            .parse::<u128>()
            .map_err(|e| E::custom(format!("invalid amount {:?}: {}", v, e)))
    }
}
