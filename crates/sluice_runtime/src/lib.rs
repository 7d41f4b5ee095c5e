//! SLUICE Runtime
//!
//! Drives one reporting round end to end: reads liquidity, the withdrawal
//! queue and the roster, plans, emits finalize and exit instructions, and
//! commits the round cache. Rounds run one at a time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod liquidity;
pub mod memory;
pub mod reporter;
pub mod source;

pub use config::EngineConfig;
pub use engine::{RoundContext, RoundEngine, RoundOutcome};
pub use error::{EmissionStage, EngineError, EngineResult};
pub use liquidity::{Liquidity, LiquidityAggregator, LiquidityPolicy};
pub use memory::{Faults, MemoryWorld, World};
pub use reporter::{RecoveryReport, Reporter};
pub use source::{
    BalanceSource, Collaborators, ExitSink, FinalizationSink, RequestSource, RosterSource,
    SourceError,
};
