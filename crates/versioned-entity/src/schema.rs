use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A structural validator for one shape of untyped data.
///
/// `validate` either accepts the input, returning a possibly normalized copy
/// of it, or rejects it with a [`SchemaError`] describing every problem found.
/// Validators must be pure: the same input always gives the same answer.
///
/// Schemas nest. Anything implementing `Schema` can be used as a field or
/// element validator inside a larger one (see [`crate::shape`]), including a
/// [`crate::EntityRef`] that delegates to a whole versioned entity.
pub trait Schema: Send + Sync {
    /// Validate `data`, returning the normalized value on success.
    fn validate(&self, data: &Value) -> Result<Value, SchemaError>;

    /// Whether `data` passes validation.
    fn accepts(&self, data: &Value) -> bool {
        self.validate(data).is_ok()
    }
}

impl<S: Schema + ?Sized> Schema for Box<S> {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        (**self).validate(data)
    }
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        (**self).validate(data)
    }
}

impl<S: Schema + ?Sized> Schema for &S {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        (**self).validate(data)
    }
}

/// One step of the path to a rejected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object field.
    Key(String),
    /// An array element.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A single validation problem and where it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Path from the validated root to the offending value. Empty for the root.
    pub path: Vec<PathSegment>,
    /// Human readable description.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "{}", self.message);
        }
        f.write_str("at `")?;
        for segment in &self.path {
            write!(f, "{segment}")?;
        }
        write!(f, "`: {}", self.message)
    }
}

/// Structured failure detail returned by a [`Schema`].
///
/// Always holds at least one [`Issue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_issues(.issues))]
pub struct SchemaError {
    issues: Vec<Issue>,
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaError {
    /// A single issue at the root.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                path: Vec::new(),
                message: message.into(),
            }],
        }
    }

    /// Build from a list of issues. Returns `None` when `issues` is empty.
    pub fn from_issues(issues: Vec<Issue>) -> Option<Self> {
        if issues.is_empty() {
            None
        } else {
            Some(Self { issues })
        }
    }

    /// Prefix every issue path with `segment`.
    ///
    /// Container validators call this on errors from their children.
    pub fn at(mut self, segment: PathSegment) -> Self {
        for issue in &mut self.issues {
            issue.path.insert(0, segment.clone());
        }
        self
    }

    /// All issues, in the order they were found.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Consume the error, returning its issues.
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// A validator backed by a serde type.
///
/// Input is accepted if it deserializes into `T`. The normalized output is
/// `T` serialized back, so defaults are filled in and unknown fields dropped
/// according to `T`'s serde attributes.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use versioned_entity::{Schema, Typed};
///
/// #[derive(Serialize, Deserialize)]
/// struct Variable {
///     name: String,
///     #[serde(default)]
///     masked: bool,
/// }
///
/// let schema = Typed::<Variable>::new();
/// let value = schema.validate(&json!({ "name": "a" })).unwrap();
/// assert_eq!(value, json!({ "name": "a", "masked": false }));
/// assert!(!schema.accepts(&json!({ "name": 7 })));
/// ```
pub struct Typed<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    /// Create a validator for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T> Schema for Typed<T>
where
    T: Serialize + DeserializeOwned,
{
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        let typed = T::deserialize(data).map_err(|e| SchemaError::new(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| SchemaError::new(e.to_string()))
    }
}

/// A validator built from a closure. See [`from_fn`].
pub struct FnSchema<F> {
    f: F,
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, SchemaError> + Send + Sync,
{
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        (self.f)(data)
    }
}

/// Wrap a closure as a [`Schema`].
///
/// ```
/// use serde_json::{json, Value};
/// use versioned_entity::{schema, Schema, SchemaError};
///
/// let even = schema::from_fn(|v: &Value| match v.as_u64() {
///     Some(n) if n % 2 == 0 => Ok(v.clone()),
///     _ => Err(SchemaError::new("expected an even number")),
/// });
/// assert!(even.accepts(&json!(4)));
/// assert!(!even.accepts(&json!(3)));
/// ```
pub fn from_fn<F>(f: F) -> FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, SchemaError> + Send + Sync,
{
    FnSchema { f }
}

/// A validator whose construction is deferred until first use.
///
/// This is how a schema refers to something that does not exist yet when the
/// schema itself is built, most commonly a [`crate::VersionedEntity`] that
/// uses itself as the type of a child field. The initializer runs at most
/// once, on the first call to [`Schema::validate`].
pub struct Lazy<S> {
    init: Box<dyn Fn() -> S + Send + Sync>,
    cell: OnceLock<S>,
}

impl<S: Schema> Lazy<S> {
    /// Defer building the schema until it is first needed.
    pub fn new(init: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            init: Box::new(init),
            cell: OnceLock::new(),
        }
    }

    /// The inner schema, building it if this is the first access.
    pub fn get(&self) -> &S {
        self.cell.get_or_init(|| (self.init)())
    }
}

impl<S: Schema> Schema for Lazy<S> {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        self.get().validate(data)
    }
}

/// Shorthand for [`Lazy::new`].
pub fn lazy<S: Schema>(init: impl Fn() -> S + Send + Sync + 'static) -> Lazy<S> {
    Lazy::new(init)
}
