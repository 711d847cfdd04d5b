//! Registry endpoints and timeouts, read from the `[registry]` table of a
//! TOML file. Defaults target Docker Hub.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const DOCKER_HUB_REGISTRY: &str = "https://registry-1.docker.io";
pub const DOCKER_HUB_AUTH: &str = "https://auth.docker.io/token";
pub const DOCKER_HUB_SERVICE: &str = "registry.docker.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry API (`/v2/...` is appended).
    pub registry_url: String,
    /// Token endpoint.
    pub auth_url: String,
    /// `service` parameter sent to the token endpoint.
    pub service: String,
    /// Platform OS matched in manifest lists.
    pub os: String,
    /// Timeout for token and manifest requests.
    pub request_timeout_secs: u64,
    /// Timeout for layer blob downloads.
    pub blob_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_url: DOCKER_HUB_REGISTRY.to_string(),
            auth_url: DOCKER_HUB_AUTH.to_string(),
            service: DOCKER_HUB_SERVICE.to_string(),
            os: "linux".to_string(),
            request_timeout_secs: 30,
            blob_timeout_secs: 120,
            user_agent: concat!("provgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    registry: RegistryConfig,
}

impl RegistryConfig {
    /// Loads from an explicit path.
    /// Falls back to defaults when the file is missing or invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No registry config at {:?}, using Docker Hub defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded registry config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse registry config {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read registry config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, RegistryError> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| RegistryError::Config(e.to_string()))?;
        file.registry.validate()?;
        Ok(file.registry)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        for (field, url) in [("registry_url", &self.registry_url), ("auth_url", &self.auth_url)] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(RegistryError::Config(format!(
                    "{field} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.request_timeout_secs == 0 || self.blob_timeout_secs == 0 {
            return Err(RegistryError::Config("timeouts must be non-zero".into()));
        }
        if self.os.is_empty() {
            return Err(RegistryError::Config("os must not be empty".into()));
        }
        Ok(())
    }

    /// Whether `registry_url` points at Docker Hub.
    pub fn is_docker_hub(&self) -> bool {
        matches!(
            self.base(),
            DOCKER_HUB_REGISTRY | "https://index.docker.io" | "https://docker.io"
        )
    }

    /// Pull-scoped token request for `repository`.
    pub fn token_url(&self, repository: &str) -> String {
        format!(
            "{}?service={}&scope=repository:{}:pull",
            self.auth_url, self.service, repository
        )
    }

    /// `reference` is a tag or a digest.
    pub fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.base(), repository, reference)
    }

    pub fn blob_url(&self, repository: &str, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.base(), repository, digest)
    }

    fn base(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn docker_hub_detection() {
        assert!(RegistryConfig::default().is_docker_hub());
        let trailing = RegistryConfig {
            registry_url: format!("{DOCKER_HUB_REGISTRY}/"),
            ..RegistryConfig::default()
        };
        assert!(trailing.is_docker_hub());
        let ghcr = RegistryConfig {
            registry_url: "https://ghcr.io".into(),
            ..RegistryConfig::default()
        };
        assert!(!ghcr.is_docker_hub());
    }

    #[test]
    fn defaults_are_docker_hub() {
        let config = RegistryConfig::default();
        assert_eq!(config.registry_url, DOCKER_HUB_REGISTRY);
        assert_eq!(config.os, "linux");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.blob_timeout_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn urls() {
        let config = RegistryConfig {
            registry_url: "https://registry.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.manifest_url("team/app", "v1"),
            "https://registry.example.com/v2/team/app/manifests/v1"
        );
        assert_eq!(
            config.blob_url("team/app", "sha256:ab"),
            "https://registry.example.com/v2/team/app/blobs/sha256:ab"
        );
        assert_eq!(
            RegistryConfig::default().token_url("library/nginx"),
            "https://auth.docker.io/token?service=registry.docker.io&scope=repository:library/nginx:pull"
        );
    }

    // ================================================================
    // TOML loading
    // ================================================================

    #[test]
    fn partial_table_keeps_defaults() {
        let config = RegistryConfig::from_toml_str(
            r#"
[registry]
registry_url = "https://ghcr.io"
blob_timeout_secs = 600
"#,
        )
        .unwrap();
        assert_eq!(config.registry_url, "https://ghcr.io");
        assert_eq!(config.blob_timeout_secs, 600);
        assert_eq!(config.auth_url, DOCKER_HUB_AUTH);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(RegistryConfig::from_toml_str("").unwrap(), RegistryConfig::default());
    }

    #[test]
    fn invalid_values_rejected() {
        let err = RegistryConfig::from_toml_str("[registry]\nauth_url = \"ftp://x\"\n").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        let err = RegistryConfig::from_toml_str("[registry]\nrequest_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        let err = RegistryConfig::from_toml_str("[registry]\nos = 5\n").unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig::load_from(dir.path().join("registry.toml"));
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nservice = \"ghcr.io\"").unwrap();
        let config = RegistryConfig::load_from(file.path());
        assert_eq!(config.service, "ghcr.io");
    }

    #[test]
    fn load_from_bad_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [[[").unwrap();
        assert_eq!(RegistryConfig::load_from(file.path()), RegistryConfig::default());
    }
}
