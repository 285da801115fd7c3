//! The REPL's dynamic value space and its metadata descriptors.
//!
//! Per DESIGN NOTES §9: REPL-visible values are a discriminated sum with
//! JSON as the wire form. A *separate* tagged sum describes a value for
//! the model — structural shape only, never the value itself.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Sentinel placed in place of an oversize executed-block result.
pub const TRUNCATED_TAG: &str = "__truncated";
/// Sentinel placed in place of a thrown REPL execution error.
pub const RLM_ERROR_TAG: &str = "__rlm_error";

/// A value that crossed the REPL boundary, as a JSON-safe discriminated sum.
///
/// `Serialize`/`Deserialize` are hand-written rather than derived: a derived
/// `#[serde(untagged)]` impl would deserialize `Object`'s `Vec<(String,
/// ReplValue)>` from a JSON *array of pairs* only, never from a genuine JSON
/// object — so every real JS object value (`({a: 1})`, a DOM query result
/// fed back through a variable, …) would fail every variant and silently
/// collapse to `Null`. Going through [`serde_json::Value`] by hand lets
/// `Object` map directly onto a JSON object's `Map`, and lets the two tagged
/// sentinels (`Truncated`, `RuntimeError`) still take priority over a plain
/// object when their marker key is present.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ReplValue {
    /// JSON null / JS `undefined`/`null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (JS has one numeric type; represented as f64).
    Number(f64),
    /// String.
    String(String),
    /// Array of values.
    Array(Vec<ReplValue>),
    /// Object, key-ordered as produced.
    Object(Vec<(String, ReplValue)>),
    /// An oversize result rewritten to the truncated sentinel.
    Truncated {
        /// Always `true`; present so downstream consumers can pattern-match on it.
        truncated: bool,
        /// Length of the original JSON-serialized form, in characters.
        original_length: usize,
        /// The first `exec_result_cap` characters, parsed back as a string payload.
        data: String,
    },
    /// A captured (not thrown) REPL execution error.
    RuntimeError {
        /// Always `true`.
        rlm_error: bool,
        /// Error message.
        message: String,
        /// First 500 characters of the stack trace, if any.
        stack: Option<String>,
    },
}

impl ReplValue {
    fn to_json_value(&self) -> Value {
        match self {
            ReplValue::Null => Value::Null,
            ReplValue::Bool(b) => Value::Bool(*b),
            ReplValue::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            ReplValue::String(s) => Value::String(s.clone()),
            ReplValue::Array(items) => Value::Array(items.iter().map(ReplValue::to_json_value).collect()),
            ReplValue::Object(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json_value());
                }
                Value::Object(map)
            }
            ReplValue::Truncated { truncated, original_length, data } => {
                serde_json::json!({ TRUNCATED_TAG: truncated, "originalLength": original_length, "data": data })
            }
            ReplValue::RuntimeError { rlm_error, message, stack } => {
                serde_json::json!({ RLM_ERROR_TAG: rlm_error, "message": message, "stack": stack })
            }
        }
    }

    fn from_json_value(value: Value) -> Self {
        match value {
            Value::Null => ReplValue::Null,
            Value::Bool(b) => ReplValue::Bool(b),
            Value::Number(n) => ReplValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => ReplValue::String(s),
            Value::Array(items) => ReplValue::Array(items.into_iter().map(ReplValue::from_json_value).collect()),
            Value::Object(map) => Self::object_from_map(map),
        }
    }

    fn object_from_map(map: Map<String, Value>) -> Self {
        if matches!(map.get(TRUNCATED_TAG), Some(Value::Bool(true))) {
            let original_length = map.get("originalLength").and_then(Value::as_u64).unwrap_or(0) as usize;
            let data = map.get("data").and_then(Value::as_str).unwrap_or_default().to_string();
            return ReplValue::Truncated { truncated: true, original_length, data };
        }
        if matches!(map.get(RLM_ERROR_TAG), Some(Value::Bool(true))) {
            let message = map.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
            let stack = map.get("stack").and_then(Value::as_str).map(str::to_string);
            return ReplValue::RuntimeError { rlm_error: true, message, stack };
        }
        ReplValue::Object(map.into_iter().map(|(k, v)| (k, ReplValue::from_json_value(v))).collect())
    }
}

impl Serialize for ReplValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReplValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ReplValue::from_json_value)
    }
}

impl ReplValue {
    /// Build the truncated sentinel for an oversize JSON string.
    pub fn truncated(original_length: usize, head: impl Into<String>) -> Self {
        ReplValue::Truncated {
            truncated: true,
            original_length,
            data: head.into(),
        }
    }

    /// Build the RLM error sentinel for a captured throw.
    pub fn rlm_error(message: impl Into<String>, stack: Option<String>) -> Self {
        ReplValue::RuntimeError {
            rlm_error: true,
            message: message.into(),
            stack,
        }
    }

    /// True if this value is the truncated sentinel.
    pub fn is_truncated(&self) -> bool {
        matches!(self, ReplValue::Truncated { .. })
    }

    /// True if this value is the RLM error sentinel.
    pub fn is_error(&self) -> bool {
        matches!(self, ReplValue::RuntimeError { .. })
    }
}

/// Metadata describing a [`ReplValue`] for the model — structural shape,
/// never the underlying data. Built by a single pure function,
/// `rlm_context::descriptor::describe`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ValueDescriptor {
    /// A primitive (null, bool, number).
    Primitive {
        /// `"null" | "boolean" | "number"`.
        type_name: String,
        /// A short rendering of the value itself (primitives are cheap to show in full).
        preview: String,
    },
    /// A string value.
    StringDesc {
        /// Length in UTF-16 code units, matching JS `.length` semantics.
        length: usize,
        /// First `var_preview_max_chars` characters.
        preview: String,
    },
    /// An array value.
    ArrayDesc {
        /// Number of elements.
        length: usize,
        /// Descriptor of a representative element, if non-empty.
        element_schema: Option<Box<ValueDescriptor>>,
    },
    /// An object value.
    ObjectDesc {
        /// Key names, in encounter order.
        keys: Vec<String>,
    },
    /// The truncated-result sentinel.
    TruncatedDesc {
        /// Length of the original untruncated form.
        original_length: usize,
    },
    /// The RLM error sentinel.
    ErrorDesc {
        /// The captured error message.
        message: String,
    },
}
