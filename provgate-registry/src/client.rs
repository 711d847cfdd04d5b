//! The pull protocol: token, manifest (list), image manifest, layers.

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::layer::{self, ExtractedFile};
use crate::manifest::{self, Layer, Manifest};
use crate::reference::ImageReference;
use crate::transport::{HttpTransport, RegistryTransport};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A binary installed by [`RegistryClient::pull`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledBinary {
    pub path: PathBuf,
    /// Archive entry the binary came from.
    pub entry_name: String,
    /// Zero-based position of the layer in the image manifest.
    pub layer_index: usize,
    pub layer_digest: String,
    pub size: u64,
}

/// Candidate names derived from the destination: its file name without
/// leading hyphens, and the same name with `-entrypoint` appended.
pub fn default_candidates(dest: &Path) -> Result<Vec<String>, RegistryError> {
    let base = dest
        .file_name()
        .map(|n| n.to_string_lossy().trim_start_matches('-').to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RegistryError::InvalidDestination(dest.to_path_buf()))?;
    Ok(vec![base.clone(), format!("{base}-entrypoint")])
}

pub struct RegistryClient<T: RegistryTransport> {
    transport: T,
    config: RegistryConfig,
    machine: String,
}

impl RegistryClient<HttpTransport> {
    /// Client speaking HTTP to the configured registry.
    pub fn from_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: RegistryTransport> RegistryClient<T> {
    pub fn new(transport: T, config: RegistryConfig) -> Self {
        Self {
            transport,
            config,
            machine: manifest::host_machine().to_string(),
        }
    }

    /// Overrides the host machine name used for platform selection.
    pub fn with_machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = machine.into();
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Pulls one binary out of `image` into `dest` (mode 0755).
    ///
    /// Layers are scanned in manifest order and the first match wins; later
    /// layers are never fetched. On failure `dest` is left untouched.
    pub fn pull(
        &self,
        image: &ImageReference,
        dest: &Path,
        candidates: Option<&[String]>,
    ) -> Result<PulledBinary, RegistryError> {
        let architecture = manifest::resolve_architecture(&self.machine)?;
        let image = &image.qualified_for(&self.config);
        let candidates = match candidates {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => default_candidates(dest)?,
        };

        info!(
            image = %image,
            architecture,
            candidates = ?candidates,
            "Pulling binary"
        );

        let token = self.fetch_token(&image.repository)?;
        let layers = self.resolve_layers(image, architecture, &token)?;
        info!(image = %image, layers = layers.len(), "Scanning layers for binary");

        for (index, layer) in layers.iter().enumerate() {
            let Some(found) = self.scan_layer(image, index, layers.len(), layer, &token, &candidates)?
            else {
                continue;
            };
            let size = found.contents.len() as u64;
            install(dest, &found.contents)?;
            info!(
                entry = %found.name,
                layer = index + 1,
                bytes = size,
                dest = %dest.display(),
                "Installed binary"
            );
            return Ok(PulledBinary {
                path: dest.to_path_buf(),
                entry_name: found.name,
                layer_index: index,
                layer_digest: layer.digest.clone(),
                size,
            });
        }

        Err(RegistryError::BinaryNotFound {
            image: image.to_string(),
            candidates,
        })
    }

    fn fetch_token(&self, repository: &str) -> Result<String, RegistryError> {
        let auth_error = |reason: String| RegistryError::Auth {
            repository: repository.to_string(),
            reason,
        };

        let url = self.config.token_url(repository);
        let response = self
            .transport
            .get_json(&url, None, None)
            .map_err(|e| auth_error(e.to_string()))?;

        // Docker Hub returns both; other registries only `access_token`.
        ["token", "access_token"]
            .iter()
            .find_map(|key| response.get(*key).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| auth_error("token endpoint returned no token".into()))
    }

    fn resolve_layers(
        &self,
        image: &ImageReference,
        architecture: &str,
        token: &str,
    ) -> Result<Vec<Layer>, RegistryError> {
        let accept = manifest::manifest_accept();
        let url = self.config.manifest_url(&image.repository, &image.tag);
        let top = Manifest::from_json(self.transport.get_json(&url, Some(token), Some(&accept))?)?;

        let entries = match top {
            Manifest::Image(layers) => {
                debug!(image = %image, "Single-platform manifest, skipping selection");
                return Ok(layers);
            }
            Manifest::List(entries) => entries,
        };

        let os = self.config.os.as_str();
        let selected = manifest::select_platform(&entries, os, architecture).ok_or_else(|| {
            RegistryError::ManifestNotFound {
                image: image.to_string(),
                os: os.to_string(),
                architecture: architecture.to_string(),
            }
        })?;
        debug!(digest = %selected.digest, "Selected {}/{} manifest", os, architecture);

        let url = self.config.manifest_url(&image.repository, &selected.digest);
        match Manifest::from_json(self.transport.get_json(&url, Some(token), Some(&accept))?)? {
            Manifest::Image(layers) => Ok(layers),
            Manifest::List(_) => Err(RegistryError::InvalidManifest(format!(
                "{} resolved to another manifest list",
                selected.digest
            ))),
        }
    }

    /// Downloads and scans one layer. The blob is dropped before returning.
    fn scan_layer(
        &self,
        image: &ImageReference,
        index: usize,
        total: usize,
        layer: &Layer,
        token: &str,
        candidates: &[String],
    ) -> Result<Option<ExtractedFile>, RegistryError> {
        debug!(
            layer = index + 1,
            total,
            digest = %layer.digest,
            "Downloading layer"
        );
        let url = self.config.blob_url(&image.repository, &layer.digest);
        let blob = self.transport.get_bytes(&url, Some(token))?;
        layer::verify_digest(&layer.digest, &blob)?;

        match layer::find_file(&blob, candidates) {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(
                    layer = index + 1,
                    digest = %layer.digest,
                    "Layer is not a readable archive, skipping: {}", e
                );
                Ok(None)
            }
        }
    }
}

/// Writes through a temporary file in the destination directory so a failed
/// write never leaves a partial binary at `dest`.
fn install(dest: &Path, contents: &[u8]) -> Result<(), RegistryError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o755))?;
    }
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
