//! Host extension points.
//!
//! The data-access layer owns hook registration and execution. This module
//! only describes the contract the decorator consumes: a registry with a
//! before and an after extension point per operation, and a query context
//! that accepts a time budget. [`HookTable`] is a small in-memory registry
//! that adapters can wrap or use directly.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StatusCoded;
use crate::timeout::Operation;

/// An in-flight query that accepts a per-call time budget.
pub trait QueryBudget {
    /// Sets the maximum time the host allows this query to run.
    fn set_max_time(&mut self, budget: Duration);
}

/// A minimal in-flight query context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// The budget set by the last before-hook, if any.
    pub max_time: Option<Duration>,
}

impl QueryBudget for QueryContext {
    fn set_max_time(&mut self, budget: Duration) {
        self.max_time = Some(budget);
    }
}

/// One-shot continuation handed to an after-hook.
///
/// Calling it lets the host's hook chain continue. It takes no arguments and
/// is consumed on call, so it can run at most once.
pub struct Proceed<'a> {
    next: Box<dyn FnOnce() + 'a>,
}

impl<'a> Proceed<'a> {
    /// Wraps the host's continuation.
    pub fn new(next: impl FnOnce() + 'a) -> Self {
        Self {
            next: Box::new(next),
        }
    }

    /// Continues the hook chain.
    pub fn call(self) {
        (self.next)()
    }
}

impl fmt::Debug for Proceed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed").finish_non_exhaustive()
    }
}

/// Runs before a governed operation executes.
pub type BeforeHook<Q> = Arc<dyn Fn(&mut Q) + Send + Sync>;

/// Runs after a governed operation with `(error, result, proceed)`.
pub type AfterHook<E, T> = Arc<dyn Fn(Option<&E>, Option<&T>, Proceed<'_>) + Send + Sync>;

/// Builds a [`BeforeHook`] from a closure.
pub fn before_hook<Q, F>(hook: F) -> BeforeHook<Q>
where
    F: Fn(&mut Q) + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Builds an [`AfterHook`] from a closure.
pub fn after_hook<E, T, F>(hook: F) -> AfterHook<E, T>
where
    F: Fn(Option<&E>, Option<&T>, Proceed<'_>) + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// The registration side of a host's hook mechanism.
///
/// Any data-access layer satisfies this through an adapter. Hooks registered
/// for the same operation are expected to run in registration order.
pub trait HookRegistry {
    /// The in-flight query handed to before-hooks.
    type Query: QueryBudget + 'static;
    /// The error a failed operation produces.
    type Error: StatusCoded + 'static;
    /// The result a successful operation produces.
    type Output: 'static;

    /// Registers a hook that runs before `operation` executes.
    fn register_before(&mut self, operation: Operation, hook: BeforeHook<Self::Query>);

    /// Registers a hook that runs after `operation` completes or fails.
    fn register_after(&mut self, operation: Operation, hook: AfterHook<Self::Error, Self::Output>);
}

/// In-memory hook registry keyed by operation.
pub struct HookTable<Q, E, T> {
    before: HashMap<Operation, Vec<BeforeHook<Q>>>,
    after: HashMap<Operation, Vec<AfterHook<E, T>>>,
}

impl<Q, E, T> Default for HookTable<Q, E, T> {
    fn default() -> Self {
        Self {
            before: HashMap::new(),
            after: HashMap::new(),
        }
    }
}

impl<Q, E, T> HookTable<Q, E, T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of before-hooks registered for `operation`.
    pub fn before_count(&self, operation: Operation) -> usize {
        self.before.get(&operation).map_or(0, Vec::len)
    }

    /// Number of after-hooks registered for `operation`.
    pub fn after_count(&self, operation: Operation) -> usize {
        self.after.get(&operation).map_or(0, Vec::len)
    }

    /// Runs every before-hook for `operation` against `query`, in order.
    pub fn run_before(&self, operation: Operation, query: &mut Q) {
        for hook in self.before.get(&operation).into_iter().flatten() {
            hook(query);
        }
    }

    /// Runs the after-hook chain for `operation`.
    ///
    /// Each hook must call its [`Proceed`] for the next one to run. Returns
    /// true if the whole chain proceeded.
    pub fn run_after(&self, operation: Operation, error: Option<&E>, output: Option<&T>) -> bool {
        for hook in self.after.get(&operation).into_iter().flatten() {
            let proceeded = Cell::new(false);
            hook(error, output, Proceed::new(|| proceeded.set(true)));
            if !proceeded.get() {
                tracing::debug!(operation = %operation, "after-hook chain stopped");
                return false;
            }
        }
        true
    }
}

impl<Q, E, T> HookRegistry for HookTable<Q, E, T>
where
    Q: QueryBudget + 'static,
    E: StatusCoded + 'static,
    T: 'static,
{
    type Query = Q;
    type Error = E;
    type Output = T;

    fn register_before(&mut self, operation: Operation, hook: BeforeHook<Q>) {
        self.before.entry(operation).or_default().push(hook);
    }

    fn register_after(&mut self, operation: Operation, hook: AfterHook<E, T>) {
        self.after.entry(operation).or_default().push(hook);
    }
}

impl<Q, E, T> fmt::Debug for HookTable<Q, E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let before: usize = self.before.values().map(Vec::len).sum();
        let after: usize = self.after.values().map(Vec::len).sum();
        f.debug_struct("HookTable")
            .field("before", &before)
            .field("after", &after)
            .finish()
    }
}
