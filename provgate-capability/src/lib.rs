//! Capability gate for provisioning scripts.
//!
//! A provisioning script runs with elevated privileges, so every privileged
//! action it requests (package installs, file writes, service control, user
//! creation, network fetches, command execution) is checked against the
//! per-script [`CapabilityManifest`] before anything touches the host.
//!
//! Deny by default: a class missing from the manifest allows nothing.

mod class;
mod error;
mod gate;
mod manifest;
pub mod matching;

pub use class::{MatchRule, ResourceClass};
pub use error::{CapabilityViolation, ManifestError};
pub use gate::{CapabilityGate, SCRATCH_PATHS};
pub use manifest::{CapabilityManifest, ManifestBuilder};
