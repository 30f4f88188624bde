//! Timeout classification for errors produced by governed operations.
//!
//! The data store signals an exceeded time limit with a fixed status code.
//! Classification is a pure predicate over that code: no error is wrapped,
//! translated or rebuilt, and the observer always sees the original value.

use std::fmt;

/// Status code the data store attaches to an operation that exceeded its time budget.
pub const EXCEEDED_TIME_LIMIT_CODE: i32 = 50;

/// Symbolic name the data store pairs with [`EXCEEDED_TIME_LIMIT_CODE`].
pub const EXCEEDED_TIME_LIMIT_NAME: &str = "ExceededTimeLimit";

/// An error that may carry a data-store status code.
///
/// Hosts implement this for whatever error type their execution layer
/// produces so the after-hook can recognize timeouts without knowing the
/// concrete type.
pub trait StatusCoded: fmt::Display {
    /// The numeric status code, if the error carries one.
    fn status_code(&self) -> Option<i32>;

    /// The symbolic status name, if the error carries one.
    fn status_name(&self) -> Option<&str> {
        None
    }
}

/// The outcome of classifying an operation error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// The operation was aborted because it exceeded its time budget.
    Timeout,
    /// Any other failure, passed through untouched.
    Other,
}

/// Classifies an error by its status code.
pub fn classify<E: StatusCoded + ?Sized>(error: &E) -> Classification {
    if error.status_code() == Some(EXCEEDED_TIME_LIMIT_CODE) {
        Classification::Timeout
    } else {
        Classification::Other
    }
}

/// Returns true if the error carries the exceeded-time-limit status code.
pub fn is_timeout_error<E: StatusCoded + ?Sized>(error: &E) -> bool {
    classify(error) == Classification::Timeout
}

/// A plain operation error for hosts that have no error type of their own.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    /// Human-readable error message.
    pub message: String,
    /// Data-store status code.
    pub code: Option<i32>,
    /// Data-store status name.
    pub code_name: Option<String>,
}

impl QueryError {
    /// Creates an error without a status code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            code_name: None,
        }
    }

    /// Creates an error carrying the given status code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            code_name: None,
        }
    }

    /// Creates the error the data store reports when an operation runs past its budget.
    pub fn exceeded_time_limit(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(EXCEEDED_TIME_LIMIT_CODE),
            code_name: Some(EXCEEDED_TIME_LIMIT_NAME.to_string()),
        }
    }

    /// Sets the symbolic status name.
    pub fn code_name(mut self, name: impl Into<String>) -> Self {
        self.code_name = Some(name.into());
        self
    }
}

impl StatusCoded for QueryError {
    fn status_code(&self) -> Option<i32> {
        self.code
    }

    fn status_name(&self) -> Option<&str> {
        self.code_name.as_deref()
    }
}
