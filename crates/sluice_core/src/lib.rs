//! SLUICE Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable with stable, cross-platform encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod amount;
pub mod error;
pub mod hash;
pub mod id;
pub mod request;
pub mod time;
pub mod worker;

// Re-exports
pub use amount::{Shares, Wei, BPS_DENOMINATOR, WEI_PER_ETHER};
pub use error::{CoreError, CoreResult};
pub use hash::Hash;
pub use id::{ActivationIndex, ModuleId, OperatorId, PubKey, RequestId};
pub use request::WithdrawalRequest;
pub use time::{Duration, Timestamp};
pub use worker::{WorkerKey, WorkerRecord, WorkerStatus};
