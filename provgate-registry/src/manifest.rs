//! Manifest documents and platform selection.

use crate::error::RegistryError;
use serde::Deserialize;
use serde_json::Value;

pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// `Accept` header for manifest requests: both multi-platform and
/// single-platform forms, OCI and legacy Docker.
pub fn manifest_accept() -> String {
    [OCI_INDEX, OCI_MANIFEST, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST].join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

/// One entry of a manifest list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    pub digest: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl ManifestDescriptor {
    fn matches(&self, os: &str, architecture: &str) -> bool {
        self.platform
            .as_ref()
            .is_some_and(|p| p.os == os && p.architecture == architecture)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub digest: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
}

/// A manifest response: either a list to select from, or the image
/// manifest itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    List(Vec<ManifestDescriptor>),
    Image(Vec<Layer>),
}

#[derive(Deserialize)]
struct ListDocument {
    manifests: Vec<ManifestDescriptor>,
}

#[derive(Deserialize)]
struct ImageDocument {
    layers: Vec<Layer>,
}

impl Manifest {
    /// Classifies by `mediaType` when present, otherwise by shape.
    pub fn from_json(document: Value) -> Result<Self, RegistryError> {
        let media_type = document
            .get("mediaType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let is_list = match media_type {
            OCI_INDEX | DOCKER_MANIFEST_LIST => true,
            OCI_MANIFEST | DOCKER_MANIFEST => false,
            _ => document.get("manifests").is_some(),
        };

        if is_list {
            let list: ListDocument = serde_json::from_value(document)
                .map_err(|e| RegistryError::InvalidManifest(format!("manifest list: {e}")))?;
            Ok(Self::List(list.manifests))
        } else if document.get("layers").is_some() {
            let image: ImageDocument = serde_json::from_value(document)
                .map_err(|e| RegistryError::InvalidManifest(format!("image manifest: {e}")))?;
            Ok(Self::Image(image.layers))
        } else {
            Err(RegistryError::InvalidManifest(format!(
                "neither a manifest list nor an image manifest (mediaType '{media_type}')"
            )))
        }
    }
}

/// First descriptor in list order whose platform is `os`/`architecture`.
pub fn select_platform<'a>(
    manifests: &'a [ManifestDescriptor],
    os: &str,
    architecture: &str,
) -> Option<&'a ManifestDescriptor> {
    manifests.iter().find(|m| m.matches(os, architecture))
}

/// Maps a machine name (`uname -m` style) to a registry architecture.
pub fn resolve_architecture(machine: &str) -> Result<&'static str, RegistryError> {
    match machine {
        "x86_64" | "amd64" | "AMD64" => Ok("amd64"),
        "aarch64" | "arm64" => Ok("arm64"),
        other => Err(RegistryError::UnsupportedArchitecture(other.to_string())),
    }
}

/// Machine name of the running host.
pub fn host_machine() -> &'static str {
    std::env::consts::ARCH
}
