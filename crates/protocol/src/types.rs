//! Script-visible values and exceptions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// A script value copied out of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Objects, arrays and functions, carried as their long-form dump
    Object(String),
    /// Marker returned when evaluation raised; the exception itself is
    /// held by the context until taken
    Exception,
}

impl ScriptValue {
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self, Self::Exception)
    }

    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => format_number(*n, f),
            Self::String(s) | Self::Object(s) => f.write_str(s),
            Self::Exception => f.write_str("[exception]"),
        }
    }
}

fn format_number(n: f64, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{n}")
    }
}

/// Error class of a thrown script exception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    TypeError,
    SyntaxError,
    ReferenceError,
    RangeError,
    InternalError,
    Error,
    /// Any other constructor name, or a thrown non-object
    Other,
}

impl ExceptionKind {
    /// Classify by the `name` property of the thrown object
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "TypeError" => Self::TypeError,
            "SyntaxError" => Self::SyntaxError,
            "ReferenceError" => Self::ReferenceError,
            "RangeError" => Self::RangeError,
            "InternalError" => Self::InternalError,
            "Error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// Message fragment shared by every capability-gate failure
pub const UNSUPPORTED_MARKER: &str = "() not supported";

/// Message the engine attaches to allocation failures
pub const OUT_OF_MEMORY_MESSAGE: &str = "out of memory";

/// A thrown script exception, retrieved from a context after an evaluation
/// returned [`ScriptValue::Exception`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptException {
    pub kind: ExceptionKind,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Name of the source unit whose evaluation raised
    pub source_name: String,
    /// Long-form diagnostic dump
    pub rendered: String,
}

impl ScriptException {
    /// Raised by a capability-gate stand-in
    #[must_use]
    pub fn is_capability_unsupported(&self) -> bool {
        self.kind == ExceptionKind::TypeError && self.message.contains(UNSUPPORTED_MARKER)
    }

    /// Raised because the arena could not satisfy an allocation
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        self.kind == ExceptionKind::InternalError && self.message == OUT_OF_MEMORY_MESSAGE
    }
}

impl std::fmt::Display for ScriptException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception(kind: ExceptionKind, name: &str, message: &str) -> ScriptException {
        ScriptException {
            kind,
            name: name.into(),
            message: message.into(),
            stack: None,
            source_name: "test.js".into(),
            rendered: format!("{name}: {message}"),
        }
    }

    #[test]
    fn kind_from_name() {
        assert_eq!(ExceptionKind::from_name("TypeError"), ExceptionKind::TypeError);
        assert_eq!(ExceptionKind::from_name("InternalError"), ExceptionKind::InternalError);
        assert_eq!(ExceptionKind::from_name("MyError"), ExceptionKind::Other);
    }

    #[test]
    fn capability_classification() {
        let gated = exception(
            ExceptionKind::TypeError,
            "TypeError",
            "load() not supported: no filesystem on this target",
        );
        assert!(gated.is_capability_unsupported());
        assert!(!gated.is_out_of_memory());

        let plain = exception(ExceptionKind::TypeError, "TypeError", "x is not a function");
        assert!(!plain.is_capability_unsupported());

        let oom = exception(ExceptionKind::InternalError, "InternalError", "out of memory");
        assert!(oom.is_out_of_memory());
        assert_eq!(oom.to_string(), "InternalError: out of memory");
    }

    #[test]
    fn value_display() {
        assert_eq!(ScriptValue::Number(30.0).to_string(), "30");
        assert_eq!(ScriptValue::Number(1.5).to_string(), "1.5");
        assert_eq!(ScriptValue::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(ScriptValue::Undefined.to_string(), "undefined");
        assert!(ScriptValue::Exception.is_exception());
    }

    #[test]
    fn value_serialization() {
        let json = serde_json::to_string(&ScriptValue::String("ab".into())).unwrap();
        assert!(json.contains("\"string\""));
        let parsed: ScriptValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_str(), Some("ab"));
    }
}
