//! Typed access to user-supplied inputs.

use crate::error::SdkError;
use serde_json::{Map, Value};
use std::path::Path;

/// User inputs for one run, loaded from a JSON object.
///
/// A key that is absent or `null` yields the caller's default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppInputs {
    data: Map<String, Value>,
}

impl AppInputs {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SdkError> {
        match serde_json::from_str(json)? {
            Value::Object(data) => Ok(Self { data }),
            other => Err(SdkError::Input {
                key: String::new(),
                reason: format!("inputs must be a JSON object, got {}", kind(&other)),
            }),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SdkError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            None => default.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Accepts numbers, booleans, and numeric strings.
    pub fn integer(&self, key: &str, default: i64) -> Result<i64, SdkError> {
        let invalid = |reason: String| SdkError::Input {
            key: key.to_string(),
            reason,
        };
        match self.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .ok_or_else(|| invalid(format!("{n} is not an integer"))),
            Some(Value::Bool(b)) => Ok(i64::from(*b)),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{s}' is not an integer"))),
            Some(other) => Err(invalid(format!("expected an integer, got {}", kind(other)))),
        }
    }

    /// Strings count as true when they are `true`, `1`, or `yes` (any case).
    pub fn boolean(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) => default,
        }
    }

    /// Same as [`string`](Self::string); the value must not be logged.
    pub fn secret(&self, key: &str, default: &str) -> String {
        self.string(key, default)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(json: &str) -> AppInputs {
        AppInputs::from_json_str(json).unwrap()
    }

    #[test]
    fn strings_with_defaults() {
        let i = inputs(r#"{"domain": "example.com", "port": 8080, "empty": null}"#);
        assert_eq!(i.string("domain", ""), "example.com");
        assert_eq!(i.string("port", ""), "8080");
        assert_eq!(i.string("empty", "fallback"), "fallback");
        assert_eq!(i.string("missing", "fallback"), "fallback");
        assert_eq!(i.secret("domain", ""), "example.com");
    }

    #[test]
    fn integers() {
        let i = inputs(r#"{"a": 5, "b": " 42 ", "c": true, "d": "nope", "e": [1], "f": 2.9}"#);
        assert_eq!(i.integer("a", 0).unwrap(), 5);
        assert_eq!(i.integer("b", 0).unwrap(), 42);
        assert_eq!(i.integer("c", 0).unwrap(), 1);
        assert_eq!(i.integer("f", 0).unwrap(), 2);
        assert_eq!(i.integer("missing", 7).unwrap(), 7);
        assert!(matches!(i.integer("d", 0), Err(SdkError::Input { key, .. }) if key == "d"));
        assert!(i.integer("e", 0).is_err());
    }

    #[test]
    fn booleans() {
        let i = inputs(
            r#"{"t": true, "yes": "YES", "one": "1", "no": "no", "zero": 0, "n": 3, "list": []}"#,
        );
        assert!(i.boolean("t", false));
        assert!(i.boolean("yes", false));
        assert!(i.boolean("one", false));
        assert!(!i.boolean("no", true));
        assert!(!i.boolean("zero", true));
        assert!(i.boolean("n", false));
        assert!(!i.boolean("list", true));
        assert!(i.boolean("missing", true));
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            AppInputs::from_json_str("[1, 2]"),
            Err(SdkError::Input { .. })
        ));
        assert!(matches!(AppInputs::from_json_str("{"), Err(SdkError::Json(_))));
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.json");
        std::fs::write(&path, r#"{"x": "y"}"#).unwrap();
        let i = AppInputs::from_file(&path).unwrap();
        assert!(i.contains("x"));
        assert_eq!(i.raw().len(), 1);
    }
}
