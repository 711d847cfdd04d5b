//! The audit fact sheet produced for one script.

use crate::value::Literal;
use serde::Serialize;
use std::collections::BTreeMap;

/// A user-input key read through the inputs accessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputKey {
    pub key: String,
    pub line: usize,
    /// Accessor used (`string`, `integer`, `boolean`, `secret`, ...).
    #[serde(rename = "type")]
    pub accessor_kind: String,
}

/// A call made through the SDK surface (`self.<method>(...)`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivilegedCall {
    pub method: String,
    pub line: usize,
    pub args: Vec<Literal>,
    pub kwargs: BTreeMap<String, Literal>,
}

/// A direct shell or process primitive that bypasses the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsafePattern {
    pub line: usize,
    pub pattern: String,
}

/// Structured summary of what a script would do.
///
/// When `error` is set every other field is at its zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactSheet {
    pub imports: Vec<String>,
    pub class_name: String,
    pub has_install_method: bool,
    #[serde(rename = "has_run_call")]
    pub has_run_registration: bool,
    pub input_keys: Vec<InputKey>,
    #[serde(rename = "method_calls")]
    pub privileged_calls: Vec<PrivilegedCall>,
    pub unsafe_patterns: Vec<UnsafePattern>,
    pub defined_methods: Vec<String>,
    pub error: Option<String>,
}

impl FactSheet {
    pub fn parse_failure(message: String) -> Self {
        Self {
            error: Some(message),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the script reads `key` through the inputs accessor.
    pub fn declares_input(&self, key: &str) -> bool {
        self.input_keys.iter().any(|k| k.key == key)
    }

    /// All recorded calls of one SDK method, in source order.
    pub fn calls_to<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a PrivilegedCall> {
        self.privileged_calls.iter().filter(move |c| c.method == method)
    }

    pub fn to_json(&self) -> String {
        // Literal and every field serialize infallibly
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
    }
}
