//! Caller-supplied options for query timeout decoration.
//!
//! Options can be built in code or loaded from a TOML file with environment
//! overrides. Everything is optional: an empty set of options yields the
//! default budget, no exclusions and a no-op observer.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;

use super::{Operation, DEFAULT_TIMEOUT_MS};
use crate::error::{OptionsError, StatusCoded};

/// Environment variable prefix for option overrides.
pub const ENV_PREFIX: &str = "QUERY_TIMEOUT";

/// Invoked with the original error when a governed operation times out.
pub type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

fn make_observer<E, F>(f: F) -> Observer<E>
where
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The timeout exactly as the caller supplied it.
///
/// Only values whose decimal rendering survives an integer round trip are
/// accepted, see [`TimeoutSetting::millis`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeoutSetting {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Default for TimeoutSetting {
    fn default() -> Self {
        TimeoutSetting::Integer(DEFAULT_TIMEOUT_MS as i64)
    }
}

impl TimeoutSetting {
    /// The string form of the value.
    pub fn literal(&self) -> String {
        match self {
            TimeoutSetting::Integer(value) => value.to_string(),
            TimeoutSetting::Float(value) => value.to_string(),
            TimeoutSetting::Text(value) => value.clone(),
        }
    }

    /// The budget in milliseconds, if the value is a canonical positive integer.
    ///
    /// The literal is parsed as a base-10 integer and must render back to
    /// exactly the same text, so `"12.5"`, `"1e3"`, `"0005"`, `" 5"` and
    /// `"+5"` are all rejected.
    pub fn millis(&self) -> Option<u64> {
        let literal = self.literal();
        let parsed: i64 = literal.parse().ok()?;
        if parsed.to_string() != literal {
            return None;
        }
        u64::try_from(parsed).ok().filter(|millis| *millis > 0)
    }
}

impl From<i32> for TimeoutSetting {
    fn from(value: i32) -> Self {
        TimeoutSetting::Integer(i64::from(value))
    }
}

impl From<i64> for TimeoutSetting {
    fn from(value: i64) -> Self {
        TimeoutSetting::Integer(value)
    }
}

impl From<u32> for TimeoutSetting {
    fn from(value: u32) -> Self {
        TimeoutSetting::Integer(i64::from(value))
    }
}

impl From<u64> for TimeoutSetting {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(value) => TimeoutSetting::Integer(value),
            Err(_) => TimeoutSetting::Text(value.to_string()),
        }
    }
}

impl From<f64> for TimeoutSetting {
    fn from(value: f64) -> Self {
        TimeoutSetting::Float(value)
    }
}

impl From<&str> for TimeoutSetting {
    fn from(value: &str) -> Self {
        TimeoutSetting::Text(value.to_string())
    }
}

impl From<String> for TimeoutSetting {
    fn from(value: String) -> Self {
        TimeoutSetting::Text(value)
    }
}

/// Observers that can be referenced by name from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinObserver {
    /// Ignores the error.
    Noop,
    /// Emits a `warn` event with the error's status code and message.
    Log,
}

impl BuiltinObserver {
    /// Looks up a built-in observer by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "noop" => Some(BuiltinObserver::Noop),
            "log" => Some(BuiltinObserver::Log),
            _ => None,
        }
    }

    /// Instantiates the observer for a host error type.
    pub fn observer<E: StatusCoded + 'static>(self) -> Observer<E> {
        match self {
            BuiltinObserver::Noop => make_observer(|_: &E| {}),
            BuiltinObserver::Log => make_observer(|error: &E| {
                tracing::warn!(
                    code = ?error.status_code(),
                    code_name = error.status_name().unwrap_or_default(),
                    error = %error,
                    "query exceeded its time budget"
                );
            }),
        }
    }
}

/// The error handler as supplied by the caller.
///
/// Only [`ErrorHandler::Callable`] and known [`ErrorHandler::Named`] values
/// are invocable; anything else fails validation.
pub enum ErrorHandler<E> {
    /// A closure supplied in code.
    Callable(Observer<E>),
    /// A built-in observer referenced by name.
    Named(String),
    /// Any other value read from configuration.
    Other(Value),
}

impl<E: 'static> Default for ErrorHandler<E> {
    fn default() -> Self {
        ErrorHandler::Callable(make_observer(|_: &E| {}))
    }
}

impl<E> ErrorHandler<E> {
    /// Wraps a closure.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        ErrorHandler::Callable(Arc::new(f))
    }

    /// Interprets a raw configuration value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(name) => ErrorHandler::Named(name),
            other => ErrorHandler::Other(other),
        }
    }
}

impl<E: StatusCoded + 'static> ErrorHandler<E> {
    /// Returns the invocable observer, or `None` if the handler is not a function.
    pub fn resolve(&self) -> Option<Observer<E>> {
        match self {
            ErrorHandler::Callable(observer) => Some(Arc::clone(observer)),
            ErrorHandler::Named(name) => BuiltinObserver::from_name(name).map(BuiltinObserver::observer),
            ErrorHandler::Other(_) => None,
        }
    }
}

impl<E> fmt::Debug for ErrorHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorHandler::Callable(_) => f.write_str("Callable(..)"),
            ErrorHandler::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ErrorHandler::Other(value) => f.debug_tuple("Other").field(value).finish(),
        }
    }
}

/// Options for [`build`](super::build).
pub struct QueryTimeoutOptions<E> {
    /// Time budget per governed operation.
    pub timeout: TimeoutSetting,
    /// Per-operation exclusions. Only an entry that is exactly `false` excludes.
    pub methods: HashMap<String, Value>,
    /// Observer for timeout errors. `None` means a no-op observer.
    pub error_handler: Option<ErrorHandler<E>>,
}

impl<E> Default for QueryTimeoutOptions<E> {
    fn default() -> Self {
        Self {
            timeout: TimeoutSetting::default(),
            methods: HashMap::new(),
            error_handler: None,
        }
    }
}

impl<E> fmt::Debug for QueryTimeoutOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTimeoutOptions")
            .field("timeout", &self.timeout)
            .field("methods", &self.methods)
            .field("error_handler", &self.error_handler)
            .finish()
    }
}

/// On-disk shape of the options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OptionsFile {
    timeout: Option<TimeoutSetting>,
    methods: HashMap<String, Value>,
    #[serde(alias = "errorHandler", alias = "errorhandler")]
    error_handler: Option<Value>,
}

impl<E> QueryTimeoutOptions<E> {
    /// Creates options with every field defaulted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time budget.
    pub fn timeout(mut self, timeout: impl Into<TimeoutSetting>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Excludes a governed operation from decoration.
    pub fn exclude(self, operation: Operation) -> Self {
        self.method(operation.as_str(), false)
    }

    /// Sets a raw exclusion entry.
    pub fn method(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.methods.insert(name.into(), value.into());
        self
    }

    /// Sets the observer for timeout errors.
    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.error_handler = Some(ErrorHandler::callable(f));
        self
    }

    /// Sets a plain value as the handler.
    ///
    /// A value supplied in code is never invocable, so [`build`](super::build)
    /// rejects it. Built-in observers are only reachable by name from an
    /// options file.
    pub fn error_handler_value(mut self, value: impl Into<Value>) -> Self {
        self.error_handler = Some(ErrorHandler::Other(value.into()));
        self
    }

    /// Load options from a TOML file.
    ///
    /// Values can be overridden with environment variables using the
    /// `QUERY_TIMEOUT` prefix and `__` as the key separator, e.g.
    /// `QUERY_TIMEOUT__TIMEOUT=5000` or `QUERY_TIMEOUT__METHODS__FIND=false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not valid UTF-8, the file does not
    /// exist, or its contents cannot be deserialized.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use query_timeout::{QueryError, QueryTimeoutOptions};
    ///
    /// let options = QueryTimeoutOptions::<QueryError>::load("config/query-timeout.toml")?;
    /// # Ok::<(), query_timeout::OptionsError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| OptionsError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(OptionsError::FileNotFound(path_str.to_string()));
        }

        let settings = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(environment().try_parsing(true))
            .build()?;

        let mut options = Self::from_config(settings)?;
        if let Some(raw) = env_timeout_literal()? {
            options.timeout = TimeoutSetting::Text(raw);
        }
        Ok(options)
    }

    /// Parse options from TOML text, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, OptionsError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Self::from_config(settings)
    }

    fn from_config(settings: Config) -> Result<Self, OptionsError> {
        let file: OptionsFile = settings.try_deserialize()?;

        Ok(Self {
            timeout: file.timeout.unwrap_or_default(),
            methods: normalize_method_keys(file.methods),
            error_handler: file.error_handler.map(ErrorHandler::from_value),
        })
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

/// The timeout override exactly as written in the environment.
///
/// Parsed environment values lose their literal (`0005` becomes `5`), which
/// would defeat the round-trip rule in [`TimeoutSetting::millis`].
fn env_timeout_literal() -> Result<Option<String>, OptionsError> {
    let raw = Config::builder().add_source(environment()).build()?;
    match raw.get_string("timeout") {
        Ok(literal) => Ok(Some(literal)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Restores canonical operation names on keys read from configuration.
///
/// Environment sources cannot carry case, so `findone` from the environment
/// maps to `findOne`. An exact key always wins over a case-folded one. When
/// several folded keys land on the same operation, a literal `false` wins,
/// otherwise the first key in sorted order.
fn normalize_method_keys(methods: HashMap<String, Value>) -> HashMap<String, Value> {
    let mut exact = HashMap::with_capacity(methods.len());
    let mut folded = Vec::new();

    for (key, value) in methods {
        if Operation::from_name(&key).is_some() {
            exact.insert(key, value);
            continue;
        }
        match Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(&key))
        {
            Some(op) => folded.push((key, op, value)),
            None => {
                exact.insert(key, value);
            }
        }
    }

    folded.sort_by(|a, b| a.0.cmp(&b.0));
    let mut resolved: HashMap<Operation, Value> = HashMap::new();
    for (_, op, value) in folded {
        match resolved.get_mut(&op) {
            Some(current) if value == Value::Bool(false) => *current = value,
            Some(_) => {}
            None => {
                resolved.insert(op, value);
            }
        }
    }

    for (op, value) in resolved {
        exact.entry(op.as_str().to_string()).or_insert(value);
    }
    exact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use serde_json::json;

    #[test]
    fn test_default_timeout_setting() {
        assert_eq!(TimeoutSetting::default().millis(), Some(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_millis_accepts_canonical_integers() {
        assert_eq!(TimeoutSetting::from(5000).millis(), Some(5000));
        assert_eq!(TimeoutSetting::from("5000").millis(), Some(5000));
        assert_eq!(TimeoutSetting::from(5000.0).millis(), Some(5000));
        assert_eq!(TimeoutSetting::from(1u64).millis(), Some(1));
    }

    #[test]
    fn test_millis_rejects_non_canonical_text() {
        for raw in ["NaN", "12.5", "1e3", "0005", " 5", "5 ", "+5", "5ms", "", "1,000", "-0"] {
            assert_eq!(TimeoutSetting::from(raw).millis(), None, "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_millis_rejects_fractional_and_special_floats() {
        for raw in [12.5, f64::NAN, f64::INFINITY, -0.0, 1e21] {
            assert_eq!(TimeoutSetting::from(raw).millis(), None, "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_millis_rejects_non_positive() {
        assert_eq!(TimeoutSetting::from(0).millis(), None);
        assert_eq!(TimeoutSetting::from(-5).millis(), None);
        assert_eq!(TimeoutSetting::from("-5").millis(), None);
    }

    #[test]
    fn test_millis_rejects_overflow() {
        assert_eq!(TimeoutSetting::from(u64::MAX).millis(), None);
        assert_eq!(TimeoutSetting::from("99999999999999999999").millis(), None);
    }

    #[test]
    fn test_literal_keeps_caller_text() {
        assert_eq!(TimeoutSetting::from(" 5").literal(), " 5");
        assert_eq!(TimeoutSetting::from(12.5).literal(), "12.5");
        assert_eq!(TimeoutSetting::from(-7).literal(), "-7");
    }

    #[test]
    fn test_builtin_observer_names() {
        assert_eq!(BuiltinObserver::from_name("noop"), Some(BuiltinObserver::Noop));
        assert_eq!(BuiltinObserver::from_name("log"), Some(BuiltinObserver::Log));
        assert_eq!(BuiltinObserver::from_name("Log"), None);
        assert_eq!(BuiltinObserver::from_name("print"), None);
    }

    #[test]
    fn test_error_handler_resolution() {
        let callable = ErrorHandler::<QueryError>::callable(|_| {});
        let named = ErrorHandler::<QueryError>::Named("log".into());
        let unknown = ErrorHandler::<QueryError>::Named("Not a function".into());
        let other = ErrorHandler::<QueryError>::Other(json!(42));

        assert!(callable.resolve().is_some());
        assert!(named.resolve().is_some());
        assert!(unknown.resolve().is_none());
        assert!(other.resolve().is_none());
        assert!(ErrorHandler::<QueryError>::default().resolve().is_some());
    }

    #[test]
    fn test_error_handler_from_value() {
        assert!(matches!(
            ErrorHandler::<QueryError>::from_value(json!("noop")),
            ErrorHandler::Named(ref name) if name == "noop"
        ));
        assert!(matches!(
            ErrorHandler::<QueryError>::from_value(json!(true)),
            ErrorHandler::Other(_)
        ));
    }

    #[test]
    fn test_options_builder() {
        let options = QueryTimeoutOptions::<QueryError>::new()
            .timeout(5000)
            .exclude(Operation::Find)
            .method("count", 0)
            .error_handler_value("log");

        assert_eq!(options.timeout, TimeoutSetting::Integer(5000));
        assert_eq!(options.methods.get("find"), Some(&json!(false)));
        assert_eq!(options.methods.get("count"), Some(&json!(0)));
        assert!(matches!(options.error_handler, Some(ErrorHandler::Other(ref v)) if v == "log"));
        assert!(options.error_handler.unwrap().resolve().is_none());
    }

    #[test]
    fn test_options_default() {
        let options = QueryTimeoutOptions::<QueryError>::default();
        assert_eq!(options.timeout.millis(), Some(15000));
        assert!(options.methods.is_empty());
        assert!(options.error_handler.is_none());
    }

    #[test]
    fn test_from_toml_str() {
        let options = QueryTimeoutOptions::<QueryError>::from_toml_str(
            r#"
            timeout = 5000
            error_handler = "log"

            [methods]
            find = false
            update = true
            "#,
        )
        .unwrap();

        assert_eq!(options.timeout.millis(), Some(5000));
        assert_eq!(options.methods.get("find"), Some(&json!(false)));
        assert_eq!(options.methods.get("update"), Some(&json!(true)));
        assert!(matches!(options.error_handler, Some(ErrorHandler::Named(ref n)) if n == "log"));
    }

    #[test]
    fn test_from_toml_str_string_timeout() {
        let options =
            QueryTimeoutOptions::<QueryError>::from_toml_str(r#"timeout = "12.5""#).unwrap();
        assert_eq!(options.timeout, TimeoutSetting::Text("12.5".into()));
        assert_eq!(options.timeout.millis(), None);
    }

    #[test]
    fn test_from_toml_str_empty_uses_defaults() {
        let options = QueryTimeoutOptions::<QueryError>::from_toml_str("").unwrap();
        assert_eq!(options.timeout.millis(), Some(DEFAULT_TIMEOUT_MS));
        assert!(options.methods.is_empty());
        assert!(options.error_handler.is_none());
    }

    #[test]
    fn test_from_toml_str_rejects_malformed() {
        let result = QueryTimeoutOptions::<QueryError>::from_toml_str("timeout = [");
        assert!(matches!(result, Err(OptionsError::Parse(_))));
    }

    #[test]
    fn test_normalize_method_keys() {
        let mut methods = HashMap::new();
        methods.insert("findone".to_string(), json!(false));
        methods.insert("FINDONEANDUPDATE".to_string(), json!(false));
        methods.insert("aggregate".to_string(), json!(false));

        let normalized = normalize_method_keys(methods);

        assert_eq!(normalized.get("findOne"), Some(&json!(false)));
        assert_eq!(normalized.get("findOneAndUpdate"), Some(&json!(false)));
        assert_eq!(normalized.get("aggregate"), Some(&json!(false)));
        assert!(!normalized.contains_key("findone"));
    }

    #[test]
    fn test_normalize_prefers_exact_key() {
        let mut methods = HashMap::new();
        methods.insert("findOne".to_string(), json!(true));
        methods.insert("findone".to_string(), json!(false));

        let normalized = normalize_method_keys(methods);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.get("findOne"), Some(&json!(true)));
    }

    #[test]
    fn test_normalize_folded_collision_prefers_false() {
        for (lower, upper) in [(json!(true), json!(false)), (json!(false), json!(true))] {
            let mut methods = HashMap::new();
            methods.insert("findone".to_string(), lower);
            methods.insert("FINDONE".to_string(), upper);

            let normalized = normalize_method_keys(methods);

            assert_eq!(normalized.len(), 1);
            assert_eq!(normalized.get("findOne"), Some(&json!(false)));
        }
    }

    #[test]
    fn test_normalize_folded_collision_is_ordered() {
        let mut methods = HashMap::new();
        methods.insert("findone".to_string(), json!(1));
        methods.insert("FINDONE".to_string(), json!(2));
        methods.insert("FindOnE".to_string(), json!(3));

        let normalized = normalize_method_keys(methods);

        assert_eq!(normalized.get("findOne"), Some(&json!(2)));
    }
}
