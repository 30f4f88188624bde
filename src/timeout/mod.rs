//! Query timeout decoration.
//!
//! This module provides the governed-operation table, the options a caller
//! supplies, their validation, and the [`QueryTimeout`] transform that
//! registers before/after hook pairs on a host.

pub mod options;
pub mod plugin;
pub mod validation;

use std::fmt;

// Re-export the decoration surface for convenient access
pub use options::{BuiltinObserver, ErrorHandler, Observer, QueryTimeoutOptions, TimeoutSetting};
pub use plugin::{build, QueryTimeout};
pub use validation::validate;

/// Budget applied when the caller supplies no timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Host-facing names of the governed operations, in registration order.
pub const GOVERNED_OPERATIONS: [&str; 6] = [
    "count",
    "find",
    "findOne",
    "findOneAndRemove",
    "findOneAndUpdate",
    "update",
];

/// A query operation eligible for timeout decoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Count,
    Find,
    FindOne,
    FindOneAndRemove,
    FindOneAndUpdate,
    Update,
}

impl Operation {
    /// Every governed operation, in registration order.
    pub const ALL: [Operation; 6] = [
        Operation::Count,
        Operation::Find,
        Operation::FindOne,
        Operation::FindOneAndRemove,
        Operation::FindOneAndUpdate,
        Operation::Update,
    ];

    /// The name the host registers hooks under.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Count => "count",
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::FindOneAndRemove => "findOneAndRemove",
            Operation::FindOneAndUpdate => "findOneAndUpdate",
            Operation::Update => "update",
        }
    }

    /// Looks up an operation by its exact host-facing name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
