//! Error types for the registry client.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one pull attempt. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("authentication failed for {repository}: {reason}")]
    Auth { repository: String, reason: String },

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("no {os}/{architecture} manifest found in {image}")]
    ManifestNotFound {
        image: String,
        os: String,
        architecture: String,
    },

    #[error("binary {candidates:?} not found in any layer of {image}")]
    BinaryNotFound {
        image: String,
        candidates: Vec<String>,
    },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("destination has no file name: {0:?}")]
    InvalidDestination(PathBuf),

    #[error("http error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid registry config: {0}")]
    Config(String),
}
