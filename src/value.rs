use std::sync::Arc;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Value of a flag, an experiment variant or a remote override.
///
/// # Serialization
///
/// Serialized untagged, as a plain JSON boolean, number, string or arbitrary JSON value, so that
/// persisted assignment maps look like `{"layout": "grid", "beta": true}`.
///
/// ```
/// # use featureflags::FlagValue;
/// let value: FlagValue = serde_json::from_str("\"grid\"").unwrap();
/// assert_eq!(value, FlagValue::from("grid"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum FlagValue {
    /// A boolean value.
    Boolean(bool),
    /// A numeric value.
    Numeric(f64),
    /// A string value.
    String(String),
    /// Any other JSON value (objects, arrays, null).
    #[from(ignore)]
    Json(Arc<serde_json::Value>),
}

impl FlagValue {
    /// Wrap a JSON value, collapsing scalars into their dedicated variants.
    pub fn from_json(value: serde_json::Value) -> FlagValue {
        match value {
            serde_json::Value::Bool(b) => FlagValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(n) => FlagValue::Numeric(n),
                None => FlagValue::Json(Arc::new(serde_json::Value::Number(n))),
            },
            serde_json::Value::String(s) => FlagValue::String(s),
            other => FlagValue::Json(Arc::new(other)),
        }
    }

    /// Truthiness of the value: `false`, `0`, `NaN`, `""` and JSON `null` are falsy, everything
    /// else (including empty JSON objects and arrays) is truthy.
    ///
    /// ```
    /// # use featureflags::FlagValue;
    /// assert!(FlagValue::from("grid").is_truthy());
    /// assert!(!FlagValue::from(0.0).is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Boolean(b) => *b,
            FlagValue::Numeric(n) => *n != 0.0 && !n.is_nan(),
            FlagValue::String(s) => !s.is_empty(),
            FlagValue::Json(v) => match v.as_ref() {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
            },
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.as_boolean().is_some()
    }
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FlagValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_numeric().is_some()
    }
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FlagValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        self.as_str().is_some()
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_json(&self) -> bool {
        self.as_json().is_some()
    }
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        Self::Numeric(f64::from(value))
    }
}

impl From<serde_json::Value> for FlagValue {
    fn from(value: serde_json::Value) -> Self {
        FlagValue::from_json(value)
    }
}
