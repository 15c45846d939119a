//! Composable structural validators over `serde_json::Value`.
//!
//! These cover the common building blocks of a versioned payload: scalars,
//! literals used as version discriminators, arrays and objects. Any
//! [`Schema`] can be nested inside them, which is how an entity reference
//! ends up as the element type of a `children` array.
//!
//! ```
//! use serde_json::json;
//! use versioned_entity::{shape, Schema};
//!
//! let variable = shape::object()
//!     .field("name", shape::string())
//!     .field("value", shape::string());
//!
//! let environment = shape::object()
//!     .field("v", shape::literal(json!(1)))
//!     .field("name", shape::string())
//!     .field("variables", shape::array(variable));
//!
//! assert!(environment.accepts(&json!({
//!     "v": 1,
//!     "name": "prod",
//!     "variables": [{ "name": "a", "value": "b" }]
//! })));
//! ```

use serde_json::{Map, Value};

use crate::schema::{Issue, PathSegment, Schema, SchemaError};

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expected(what: &str, got: &Value) -> SchemaError {
    SchemaError::new(format!("expected {what}, got {}", type_name(got)))
}

/// Accepts any JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringShape;

impl Schema for StringShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        match data {
            Value::String(_) => Ok(data.clone()),
            other => Err(expected("string", other)),
        }
    }
}

/// Accepts any JSON number.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberShape;

impl Schema for NumberShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        match data {
            Value::Number(_) => Ok(data.clone()),
            other => Err(expected("number", other)),
        }
    }
}

/// Accepts JSON numbers with no fractional part.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerShape;

impl Schema for IntegerShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        match data {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(data.clone()),
            Value::Number(_) => Err(SchemaError::new("expected integer, got fractional number")),
            other => Err(expected("integer", other)),
        }
    }
}

/// Accepts `true` or `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanShape;

impl Schema for BooleanShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        match data {
            Value::Bool(_) => Ok(data.clone()),
            other => Err(expected("boolean", other)),
        }
    }
}

/// Accepts anything, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyShape;

impl Schema for AnyShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        Ok(data.clone())
    }
}

/// Accepts exactly one value.
#[derive(Debug, Clone)]
pub struct LiteralShape {
    expected: Value,
}

impl Schema for LiteralShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        if *data == self.expected {
            Ok(data.clone())
        } else {
            Err(SchemaError::new(format!(
                "expected literal {}, got {data}",
                self.expected
            )))
        }
    }
}

/// Accepts an array whose every element passes the element schema.
///
/// Issues from all failing elements are reported, each prefixed with its index.
#[derive(Debug, Clone)]
pub struct ArrayShape<S> {
    element: S,
}

impl<S: Schema> Schema for ArrayShape<S> {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        let items = match data {
            Value::Array(items) => items,
            other => return Err(expected("array", other)),
        };

        let mut out = Vec::with_capacity(items.len());
        let mut issues = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match self.element.validate(item) {
                Ok(v) => out.push(v),
                Err(e) => issues.extend(e.at(PathSegment::Index(i)).into_issues()),
            }
        }

        match SchemaError::from_issues(issues) {
            Some(err) => Err(err),
            None => Ok(Value::Array(out)),
        }
    }
}

/// Accepts `null` or anything the inner schema accepts.
#[derive(Debug, Clone)]
pub struct NullableShape<S> {
    inner: S,
}

impl<S: Schema> Schema for NullableShape<S> {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        if data.is_null() {
            Ok(Value::Null)
        } else {
            self.inner.validate(data)
        }
    }
}

struct Field {
    name: String,
    schema: Box<dyn Schema>,
    required: bool,
}

/// Accepts an object with a declared set of fields.
///
/// Undeclared fields are stripped from the output unless
/// [`ObjectShape::passthrough`] is set. A missing optional field stays
/// missing; a present optional field must pass its schema.
pub struct ObjectShape {
    fields: Vec<Field>,
    passthrough: bool,
}

impl ObjectShape {
    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: Box::new(schema),
            required: true,
        });
        self
    }

    /// Add a field that may be absent.
    pub fn optional(mut self, name: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: Box::new(schema),
            required: false,
        });
        self
    }

    /// Keep undeclared fields in the output instead of dropping them.
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }
}

impl Schema for ObjectShape {
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        let input = match data {
            Value::Object(map) => map,
            other => return Err(expected("object", other)),
        };

        let mut out = if self.passthrough {
            input.clone()
        } else {
            Map::new()
        };
        let mut issues = Vec::new();

        for field in &self.fields {
            match input.get(&field.name) {
                Some(value) => match field.schema.validate(value) {
                    Ok(v) => {
                        out.insert(field.name.clone(), v);
                    }
                    Err(e) => issues
                        .extend(e.at(PathSegment::Key(field.name.clone())).into_issues()),
                },
                None if field.required => issues.push(Issue {
                    path: vec![PathSegment::Key(field.name.clone())],
                    message: "required field missing".into(),
                }),
                None => {}
            }
        }

        match SchemaError::from_issues(issues) {
            Some(err) => Err(err),
            None => Ok(Value::Object(out)),
        }
    }
}

/// Any string.
pub fn string() -> StringShape {
    StringShape
}

/// Any number.
pub fn number() -> NumberShape {
    NumberShape
}

/// Any integral number.
pub fn integer() -> IntegerShape {
    IntegerShape
}

/// `true` or `false`.
pub fn boolean() -> BooleanShape {
    BooleanShape
}

/// Anything.
pub fn any() -> AnyShape {
    AnyShape
}

/// Exactly `value`. Typically used for a version discriminator field.
pub fn literal(value: Value) -> LiteralShape {
    LiteralShape { expected: value }
}

/// An array of `element`.
pub fn array<S: Schema>(element: S) -> ArrayShape<S> {
    ArrayShape { element }
}

/// `inner` or `null`.
pub fn nullable<S: Schema>(inner: S) -> NullableShape<S> {
    NullableShape { inner }
}

/// An object with no declared fields yet. Add them with
/// [`ObjectShape::field`] and [`ObjectShape::optional`].
pub fn object() -> ObjectShape {
    ObjectShape {
        fields: Vec::new(),
        passthrough: false,
    }
}
