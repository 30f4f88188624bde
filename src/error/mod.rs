//! Error handling and classification module
//!
//! Two kinds of failure cross this crate's boundary. Configuration errors are
//! raised while building the decoration and carry every field-level violation
//! at once. Operation timeouts are never raised here; they are produced by the
//! host and only recognized through [`classification`].

pub mod classification;

use serde::Serialize;
use thiserror::Error;

// Re-export main types for convenient access
pub use classification::{
    classify, is_timeout_error, Classification, QueryError, StatusCoded,
    EXCEEDED_TIME_LIMIT_CODE, EXCEEDED_TIME_LIMIT_NAME,
};

/// Field name reported for an invalid error handler.
pub const ERROR_HANDLER_FIELD: &str = "errorHandler";

/// Field name reported for an invalid timeout.
pub const TIMEOUT_FIELD: &str = "timeout";

/// Message reported when the error handler cannot be invoked.
pub const NOT_A_FUNCTION: &str = "Parameter provided is not a function";

/// Message reported when the timeout is not a canonical integer.
pub const INVALID_NUMBER: &str = "Invalid number provided";

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The option that failed validation.
    pub field: &'static str,
    /// What was wrong with it.
    pub message: &'static str,
}

impl Violation {
    /// The error handler is not invocable.
    pub fn not_a_function() -> Self {
        Self {
            field: ERROR_HANDLER_FIELD,
            message: NOT_A_FUNCTION,
        }
    }

    /// The timeout did not survive the integer round trip.
    pub fn invalid_number() -> Self {
        Self {
            field: TIMEOUT_FIELD,
            message: INVALID_NUMBER,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Options failed validation. `details` lists every violation in check order.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Invalid parameters provided: {}", render_details(.details))]
pub struct ValidationError {
    details: Vec<Violation>,
}

fn render_details(details: &[Violation]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    /// Creates an error from the collected violations.
    pub fn new(details: Vec<Violation>) -> Self {
        Self { details }
    }

    /// The violations, in the order the rules ran.
    pub fn details(&self) -> &[Violation] {
        &self.details
    }

    /// Returns true if any violation was recorded against `field`.
    pub fn has_violation(&self, field: &str) -> bool {
        self.details.iter().any(|v| v.field == field)
    }
}

/// Errors that can occur when loading options from configuration sources.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The options file was not found.
    #[error("options file not found: {0}")]
    FileNotFound(String),

    /// The options file path is not valid UTF-8.
    #[error("invalid options path: {0}")]
    InvalidPath(String),

    /// The options could not be read or deserialized.
    #[error("failed to parse options: {0}")]
    Parse(#[from] config::ConfigError),

    /// The options were read but failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
