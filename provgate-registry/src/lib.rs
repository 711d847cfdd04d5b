//! Minimal registry client.
//!
//! Fetches a single named binary out of a (possibly multi-architecture)
//! container image by speaking the registry pull protocol directly: bearer
//! token, manifest list, image manifest, then layer blobs scanned in order
//! until the binary turns up. No image is ever stored as a whole.
//!
//! Network access goes through [`RegistryTransport`]; [`HttpTransport`] is the
//! blocking `reqwest` implementation.

mod client;
mod config;
mod error;
pub mod layer;
pub mod manifest;
mod reference;
mod transport;

pub use client::{default_candidates, PulledBinary, RegistryClient};
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use manifest::{Layer, Manifest, ManifestDescriptor, Platform};
pub use reference::{ImageReference, DEFAULT_TAG};
pub use transport::{HttpTransport, RegistryTransport};
