//! SLUICE Round Planner
//!
//! Pure decision logic for one reporting round: which queued withdrawals to
//! finalize, how much ether is still missing once in-flight exits are counted,
//! and which workers to ask to exit next. No I/O and no clock reads; the same
//! inputs always produce the same plan.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ledger;
pub mod plan;
pub mod schedule;
pub mod select;
pub mod shortfall;

pub use error::PlanError;
pub use ledger::RequestLedger;
pub use plan::{plan_round, FinalizeBatch, PlanInputs, PlanParams, RoundPlan};
pub use schedule::{check_roster, select_next, validators_needed, ExitSelection, PartialFulfillment};
pub use select::{select, Selection};
pub use shortfall::{estimate, Shortfall};
