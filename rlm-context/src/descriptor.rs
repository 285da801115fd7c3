//! The single pure function that turns a [`ReplValue`] into a
//! [`ValueDescriptor`] (§4.2, "Environment metadata production").
//!
//! Deliberately lives here rather than in `rlm-repl`: the REPL runtime only
//! needs to know how to run code and hand back `ReplValue`s, while turning
//! those into model-facing metadata is a Context Builder concern.

use rlm_types::config::VAR_PREVIEW_MAX_CHARS;
use rlm_types::value::{ReplValue, ValueDescriptor};

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Build the structural descriptor for one REPL value. Never includes the
/// underlying data itself beyond a capped preview — this is what the model
/// sees in place of raw variable contents.
pub fn describe(value: &ReplValue) -> ValueDescriptor {
    match value {
        ReplValue::Null => ValueDescriptor::Primitive { type_name: "null".to_string(), preview: "null".to_string() },
        ReplValue::Bool(b) => ValueDescriptor::Primitive { type_name: "boolean".to_string(), preview: b.to_string() },
        ReplValue::Number(n) => ValueDescriptor::Primitive { type_name: "number".to_string(), preview: n.to_string() },
        ReplValue::String(s) => ValueDescriptor::StringDesc {
            length: s.encode_utf16().count(),
            preview: truncate_chars(s, VAR_PREVIEW_MAX_CHARS),
        },
        ReplValue::Array(items) => ValueDescriptor::ArrayDesc {
            length: items.len(),
            element_schema: items.first().map(|e| Box::new(describe(e))),
        },
        ReplValue::Object(entries) => {
            ValueDescriptor::ObjectDesc { keys: entries.iter().map(|(k, _)| k.clone()).collect() }
        }
        ReplValue::Truncated { original_length, .. } => ValueDescriptor::TruncatedDesc { original_length: *original_length },
        ReplValue::RuntimeError { message, .. } => ValueDescriptor::ErrorDesc { message: message.clone() },
    }
}
