//! SLUICE Storage
//!
//! The durable round cache: exit and finalization cursors, the in-flight exit
//! set behind the expected-inflow accumulator, and the journal that makes an
//! interrupted commit detectable on the next round.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod journal;
pub mod store;

pub use cache::{CacheError, InflowPolicy, PendingExit, Reconciliation, RoundCache};
pub use journal::CommitJournal;
pub use store::{CacheStore, MemoryStore, RedbStore, StoreError};
