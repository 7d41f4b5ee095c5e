//! Workers (validators) and their exit lifecycle.

use crate::amount::Wei;
use crate::id::{ActivationIndex, ModuleId, OperatorId, PubKey};
use crate::time::{Duration, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a worker as the exit-request sink addresses it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerKey {
    /// Staking module
    pub module_id: ModuleId,
    /// Node operator within the module
    pub operator_id: OperatorId,
    /// Validator public key
    pub pubkey: PubKey,
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.module_id, self.operator_id, self.pubkey)
    }
}

/// Exit lifecycle of a worker.
///
/// Transitions only move forward: `Active -> ExitRequested -> Exiting -> Exited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Validating, not asked to exit
    Active,
    /// Exit requested at `at`; no voluntary exit observed yet
    ExitRequested {
        /// When the exit request was emitted
        at: Timestamp,
    },
    /// Voluntary exit observed, balance not yet withdrawn
    Exiting,
    /// Balance withdrawn
    Exited,
}

impl WorkerStatus {
    /// Check if the worker can still be selected for exit
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the worker's balance has settled
    #[must_use]
    pub const fn is_exited(&self) -> bool {
        matches!(self, Self::Exited)
    }

    /// Stage number used to enforce forward-only transitions
    #[must_use]
    pub const fn stage(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::ExitRequested { .. } => 1,
            Self::Exiting => 2,
            Self::Exited => 3,
        }
    }

    /// Whether the exit request is still inside its timeout window at `now`.
    ///
    /// Only meaningful for `ExitRequested`; the bound is inclusive.
    #[must_use]
    pub fn within_timeout(&self, now: Timestamp, timeout: Duration) -> bool {
        match self {
            Self::ExitRequested { at } => now.since(*at) <= timeout,
            _ => false,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::ExitRequested { at } => write!(f, "exit_requested@{}", at),
            Self::Exiting => write!(f, "exiting"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// A worker on the roster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Identity
    pub key: WorkerKey,
    /// Position in activation order
    pub activation_index: ActivationIndex,
    /// Current balance
    pub balance: Wei,
    /// Exit lifecycle
    pub status: WorkerStatus,
}

impl WorkerRecord {
    /// Create an active worker
    #[must_use]
    pub fn active(index: u64, module_id: u32, operator_id: u64, pubkey: &str, balance: Wei) -> Self {
        Self {
            key: WorkerKey {
                module_id: ModuleId(module_id),
                operator_id: OperatorId(operator_id),
                pubkey: PubKey::new(pubkey),
            },
            activation_index: ActivationIndex::new(index),
            balance,
            status: WorkerStatus::Active,
        }
    }
}
