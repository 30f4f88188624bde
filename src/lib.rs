//! Bounded-time query hooks for data-access layers.
//!
//! Every governed query operation gets a before-hook that sets a time budget
//! on the in-flight query and an after-hook that recognizes the data store's
//! exceeded-time-limit error and reports it to a caller-supplied observer.
//! Enforcement and cancellation stay with the host; this crate only supplies
//! the budget and classifies the result.
//!
//! ```
//! use query_timeout::{build, HookTable, Operation, QueryContext, QueryError, QueryTimeoutOptions};
//!
//! let decorator = build(
//!     QueryTimeoutOptions::<QueryError>::new()
//!         .error_handler(|error| eprintln!("query timed out: {}", error)),
//! )?;
//!
//! let mut host: HookTable<QueryContext, QueryError, ()> = HookTable::new();
//! decorator.apply(&mut host);
//!
//! let mut query = QueryContext::default();
//! host.run_before(Operation::FindOne, &mut query);
//! assert_eq!(query.max_time, Some(decorator.budget()));
//! # Ok::<(), query_timeout::ValidationError>(())
//! ```

pub mod error;
pub mod host;
pub mod logging;
pub mod timeout;

pub use error::{
    classify, is_timeout_error, Classification, OptionsError, QueryError, StatusCoded,
    ValidationError, Violation, EXCEEDED_TIME_LIMIT_CODE, EXCEEDED_TIME_LIMIT_NAME,
};
pub use host::{
    after_hook, before_hook, AfterHook, BeforeHook, HookRegistry, HookTable, Proceed,
    QueryBudget, QueryContext,
};
pub use timeout::{
    build, validate, BuiltinObserver, ErrorHandler, Observer, Operation, QueryTimeout,
    QueryTimeoutOptions, TimeoutSetting, DEFAULT_TIMEOUT_MS, GOVERNED_OPERATIONS,
};
