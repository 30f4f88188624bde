//! Shared host double for integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::time::Duration;

use query_timeout::{
    AfterHook, BeforeHook, HookRegistry, Operation, Proceed, QueryContext, QueryError,
};
use serde_json::Value;

/// Which extension point a hook was registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

/// A host that records every registration and can replay the hooks.
#[derive(Default)]
pub struct RecordingHost {
    pub registrations: Vec<(Phase, Operation)>,
    before: HashMap<Operation, Vec<BeforeHook<QueryContext>>>,
    after: HashMap<Operation, Vec<AfterHook<QueryError, Value>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations with at least one hook in `phase`, in registration order.
    pub fn operations(&self, phase: Phase) -> Vec<Operation> {
        self.registrations
            .iter()
            .filter(|(p, _)| *p == phase)
            .map(|(_, op)| *op)
            .collect()
    }

    pub fn count(&self, phase: Phase, operation: Operation) -> usize {
        self.registrations
            .iter()
            .filter(|(p, op)| *p == phase && *op == operation)
            .count()
    }

    /// Runs the before-hooks on a fresh query and returns the budget they set.
    pub fn budget_for(&self, operation: Operation) -> Option<Duration> {
        let mut query = QueryContext::default();
        for hook in self.before.get(&operation).into_iter().flatten() {
            hook(&mut query);
        }
        query.max_time
    }

    /// Runs the after-hooks and returns how many times `proceed` was called.
    pub fn complete(
        &self,
        operation: Operation,
        error: Option<&QueryError>,
        doc: Option<&Value>,
    ) -> usize {
        let proceeded = Cell::new(0);
        for hook in self.after.get(&operation).into_iter().flatten() {
            hook(error, doc, Proceed::new(|| proceeded.set(proceeded.get() + 1)));
        }
        proceeded.get()
    }
}

impl HookRegistry for RecordingHost {
    type Query = QueryContext;
    type Error = QueryError;
    type Output = Value;

    fn register_before(&mut self, operation: Operation, hook: BeforeHook<QueryContext>) {
        self.registrations.push((Phase::Before, operation));
        self.before.entry(operation).or_default().push(hook);
    }

    fn register_after(&mut self, operation: Operation, hook: AfterHook<QueryError, Value>) {
        self.registrations.push((Phase::After, operation));
        self.after.entry(operation).or_default().push(hook);
    }
}
