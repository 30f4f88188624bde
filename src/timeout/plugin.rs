//! The query timeout decorator.
//!
//! [`build`] validates options once and produces a [`QueryTimeout`], a
//! reusable transform that registers a before/after hook pair on a host for
//! every governed operation that is not excluded.
//!
//! ```text
//! QueryTimeoutOptions
//!     → validation (all violations at once)
//!     → QueryTimeout { budget, operations, observer }
//!     → apply(host) for each host
//!         before: query.set_max_time(budget)
//!         after:  timeout error? → observer(error); proceed()
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::options::{Observer, QueryTimeoutOptions};
use super::validation::validate_options;
use super::Operation;
use crate::error::{is_timeout_error, OptionsError, StatusCoded, ValidationError};
use crate::host::{
    after_hook, before_hook, AfterHook, BeforeHook, HookRegistry, Proceed, QueryBudget,
};

/// Validates `options` and produces the decorator.
///
/// Validation failures abort before anything can be registered.
///
/// # Examples
///
/// ```
/// use query_timeout::{build, HookTable, Operation, QueryContext, QueryError, QueryTimeoutOptions};
///
/// let decorator = build(
///     QueryTimeoutOptions::<QueryError>::new()
///         .timeout(5000)
///         .exclude(Operation::Find),
/// )?;
///
/// let mut host: HookTable<QueryContext, QueryError, ()> = HookTable::new();
/// decorator.apply(&mut host);
///
/// assert_eq!(host.before_count(Operation::Find), 0);
/// assert_eq!(host.before_count(Operation::Count), 1);
/// # Ok::<(), query_timeout::ValidationError>(())
/// ```
pub fn build<E>(options: QueryTimeoutOptions<E>) -> Result<QueryTimeout<E>, ValidationError>
where
    E: StatusCoded + 'static,
{
    let QueryTimeoutOptions {
        timeout,
        methods,
        error_handler,
    } = options;
    let error_handler = error_handler.unwrap_or_default();

    let validated = validate_options(&timeout, &error_handler)?;

    Ok(QueryTimeout {
        budget: validated.budget,
        operations: governed_operations(&methods),
        observer: validated.observer,
    })
}

/// Governed operations left after applying the exclusion map, in declared order.
fn governed_operations(methods: &HashMap<String, Value>) -> Vec<Operation> {
    for key in methods.keys() {
        if Operation::from_name(key).is_none() {
            tracing::debug!(key = %key, "ignoring exclusion for ungoverned operation");
        }
    }

    Operation::ALL
        .into_iter()
        .filter(|op| !is_excluded(methods, *op))
        .collect()
}

// Only a literal `false` excludes; `true`, `0`, `null` and missing entries do not.
fn is_excluded(methods: &HashMap<String, Value>, operation: Operation) -> bool {
    matches!(methods.get(operation.as_str()), Some(Value::Bool(false)))
}

/// A validated, reusable query timeout decorator.
pub struct QueryTimeout<E> {
    budget: Duration,
    operations: Vec<Operation>,
    observer: Observer<E>,
}

impl<E> QueryTimeout<E>
where
    E: StatusCoded + 'static,
{
    /// Loads options from a TOML file and builds the decorator.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let options = QueryTimeoutOptions::load(path)?;
        Ok(build(options)?)
    }

    /// The per-call time budget every before-hook sets.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// The operations this decorator registers hooks for.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Registers one before-hook and one after-hook per governed operation.
    ///
    /// May be applied to any number of hosts; each is decorated identically.
    pub fn apply<H>(&self, host: &mut H)
    where
        H: HookRegistry<Error = E>,
    {
        for &operation in &self.operations {
            host.register_before(operation, budget_hook(self.budget));
            host.register_after(
                operation,
                timeout_hook(operation, self.budget, Arc::clone(&self.observer)),
            );

            tracing::debug!(
                operation = %operation,
                budget_ms = self.budget.as_millis() as u64,
                "registered query timeout hooks"
            );
        }
    }
}

fn budget_hook<Q: QueryBudget + 'static>(budget: Duration) -> BeforeHook<Q> {
    before_hook(move |query: &mut Q| query.set_max_time(budget))
}

/// Forwards timeout errors to the observer, then always proceeds.
///
/// Observer panics are not caught and propagate into the host's chain.
fn timeout_hook<E, T>(
    operation: Operation,
    budget: Duration,
    observer: Observer<E>,
) -> AfterHook<E, T>
where
    E: StatusCoded + 'static,
    T: 'static,
{
    after_hook(move |error: Option<&E>, _output: Option<&T>, proceed: Proceed<'_>| {
        if let Some(error) = error {
            if is_timeout_error(error) {
                tracing::debug!(
                    operation = %operation,
                    budget_ms = budget.as_millis() as u64,
                    "operation exceeded its time budget"
                );
                observer(error);
            }
        }
        proceed.call();
    })
}

impl<E> Clone for QueryTimeout<E> {
    fn clone(&self) -> Self {
        Self {
            budget: self.budget,
            operations: self.operations.clone(),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<E> fmt::Debug for QueryTimeout<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTimeout")
            .field("budget", &self.budget)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}
