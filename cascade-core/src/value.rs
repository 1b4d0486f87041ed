//! Values
//!
//! Everything that flows through the graph is a [`Value`]. Node types agree on
//! the shape of their inputs at runtime, optionally backed by a declared
//! [`ValueKind`] on the port.
//!
//! # Failure Sentinel
//!
//! When a node cannot produce an output (its `calculate` failed, or it
//! returned fewer results than it declares) the engine writes a
//! [`NullValue`] in its place. The sentinel is an ordinary value: it is
//! cached, pushed to consumers and handed to downstream `calculate` routines
//! like anything else. Nothing is raised.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder for a value that could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullValue {
    reason: String,
}

impl NullValue {
    /// Create a sentinel carrying a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the value is missing.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for NullValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "null({})", self.reason)
    }
}

/// The kind of a non-null [`Value`], used as a port type constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// A dynamically typed value held in a port cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null(NullValue),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// Shorthand for a failure sentinel.
    pub fn null(reason: impl Into<String>) -> Self {
        Value::Null(NullValue::new(reason))
    }

    /// The kind of this value, or `None` for a sentinel.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null(_) => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::List(_) => Some(ValueKind::List),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// The sentinel, if this value is one.
    pub fn as_null(&self) -> Option<&NullValue> {
        match self {
            Value::Null(null) => Some(null),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to `kind` where a sensible conversion exists.
    ///
    /// Sentinels pass through unchanged. Int/Float only convert when no
    /// precision is lost.
    pub fn coerce(self, kind: ValueKind) -> Option<Value> {
        if self.kind().is_none() || self.kind() == Some(kind) {
            return Some(self);
        }
        match (self, kind) {
            (Value::Int(i), ValueKind::Float) => {
                let f = i as f64;
                (f as i64 == i).then_some(Value::Float(f))
            }
            (Value::Float(f), ValueKind::Int) => {
                (f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64)
                    .then_some(Value::Int(f as i64))
            }
            (Value::Bool(b), ValueKind::Int) => Some(Value::Int(b as i64)),
            (Value::Int(i), ValueKind::Bool) => match i {
                0 => Some(Value::Bool(false)),
                1 => Some(Value::Bool(true)),
                _ => None,
            },
            (Value::List(_), ValueKind::Text) => None,
            (scalar, ValueKind::Text) => Some(Value::Text(scalar.to_string())),
            (Value::List(_), _) => None,
            (scalar, ValueKind::List) => Some(Value::List(vec![scalar])),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(null) => null.fmt(f),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<NullValue> for Value {
    fn from(null: NullValue) -> Self {
        Value::Null(null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
