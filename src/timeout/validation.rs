//! Option validation.
//!
//! Both rules always run and every violation is reported together, observer
//! rule first. Validation has no side effects.

use std::time::Duration;

use super::options::{ErrorHandler, Observer, TimeoutSetting};
use crate::error::{StatusCoded, ValidationError, Violation};

/// Checks the timeout and error handler supplied by the caller.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every violation found:
/// `errorHandler` if the handler is not invocable, `timeout` if the value is
/// not a canonical positive integer.
pub fn validate<E: StatusCoded + 'static>(
    timeout: &TimeoutSetting,
    error_handler: &ErrorHandler<E>,
) -> Result<(), ValidationError> {
    validate_options(timeout, error_handler).map(|_| ())
}

/// Validated options, resolved to the values hooks close over.
pub(crate) struct Validated<E> {
    pub(crate) budget: Duration,
    pub(crate) observer: Observer<E>,
}

pub(crate) fn validate_options<E: StatusCoded + 'static>(
    timeout: &TimeoutSetting,
    error_handler: &ErrorHandler<E>,
) -> Result<Validated<E>, ValidationError> {
    let mut details = Vec::new();

    let observer = error_handler.resolve();
    if observer.is_none() {
        details.push(Violation::not_a_function());
    }

    let millis = timeout.millis();
    if millis.is_none() {
        details.push(Violation::invalid_number());
    }

    match (millis, observer) {
        (Some(millis), Some(observer)) => Ok(Validated {
            budget: Duration::from_millis(millis),
            observer,
        }),
        _ => Err(ValidationError::new(details)),
    }
}
