/// Typed values shared by the variable store, start conditions, and markup tags.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("unknown variable type '{0}'")]
    UnknownKind(String),
    #[error("cannot parse '{raw}' as {kind}")]
    Parse { raw: String, kind: VariableKind },
}

/// The primitive types a script can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Short,
    Int,
    Long,
    Float,
    Bool,
    String,
}

impl VariableKind {
    /// Script-facing name: "short", "int", "long", "float", "bool", "string".
    pub fn name(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }

    /// Case-insensitive lookup of a declared type name.
    pub fn from_name(name: &str) -> Result<Self, ValueError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "string" => Ok(Self::String),
            _ => Err(ValueError::UnknownKind(name.to_string())),
        }
    }

    /// Strings and booleans only support `==` and `!=`.
    pub fn is_equality_only(&self) -> bool {
        matches!(self, Self::Bool | Self::String)
    }

    pub fn zero(&self) -> Value {
        match self {
            Self::Short => Value::Short(0),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Bool => Value::Bool(false),
            Self::String => Value::String(String::new()),
        }
    }

    /// Parse script text into a value of this kind.
    pub fn parse(&self, raw: &str) -> Result<Value, ValueError> {
        let trimmed = raw.trim();
        let err = || ValueError::Parse {
            raw: raw.to_string(),
            kind: *self,
        };
        match self {
            Self::Short => trimmed.parse().map(Value::Short).map_err(|_| err()),
            Self::Int => trimmed.parse().map(Value::Int).map_err(|_| err()),
            Self::Long => trimmed.parse().map(Value::Long).map_err(|_| err()),
            Self::Float => trimmed.parse().map(Value::Float).map_err(|_| err()),
            Self::Bool => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(err())
                }
            }
            Self::String => Ok(Value::String(raw.to_string())),
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Short(_) => VariableKind::Short,
            Self::Int(_) => VariableKind::Int,
            Self::Long(_) => VariableKind::Long,
            Self::Float(_) => VariableKind::Float,
            Self::Bool(_) => VariableKind::Bool,
            Self::String(_) => VariableKind::String,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            other => other.as_integer().map(|v| v as f64),
        }
    }

    /// Order two values.
    ///
    /// Numbers of any width compare with each other (integers exactly, any
    /// float widens both sides to `f64`). Booleans and strings only compare
    /// against their own kind. Returns `None` for incompatible kinds and NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (a, b) => {
                if let (Some(x), Some(y)) = (a.as_integer(), b.as_integer()) {
                    return Some(x.cmp(&y));
                }
                let x = a.as_number()?;
                let y = b.as_number()?;
                x.partial_cmp(&y)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
