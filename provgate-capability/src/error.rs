//! Error types for the capability gate.

use crate::class::ResourceClass;
use thiserror::Error;

/// A denied privileged action.
///
/// Carries the class, the rejected value, and the allowlist that was in effect
/// so the caller can print an actionable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} '{value}' is not allowed; allowlist: {allowlist:?}")]
pub struct CapabilityViolation {
    pub class: ResourceClass,
    pub value: String,
    pub allowlist: Vec<String>,
}

impl CapabilityViolation {
    pub fn new(class: ResourceClass, value: impl Into<String>, allowlist: &[String]) -> Self {
        Self {
            class,
            value: value.into(),
            allowlist: allowlist.to_vec(),
        }
    }
}

/// Failure to load a capability manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),
}
