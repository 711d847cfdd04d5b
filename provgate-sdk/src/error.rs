//! Error types for the provisioning runtime.

use provgate_capability::CapabilityViolation;
use provgate_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// Kept as its own variant so a denial is never mistaken for an
    /// ordinary failure.
    #[error("permission denied: {0}")]
    PermissionDenied(#[from] CapabilityViolation),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("command failed (exit {}): {command}\n{output}", exit_label(.code))]
    Command {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("invalid input '{key}': {reason}")]
    Input { key: String, reason: String },

    #[error("{0} is not available on this platform")]
    UnsupportedPlatform(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Lifecycle(String),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl SdkError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
