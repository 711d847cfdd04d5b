//! Image references (`repository:tag`).

use crate::config::RegistryConfig;
use std::fmt;

pub const DEFAULT_TAG: &str = "latest";

/// Docker Hub namespace for single-component ("official") images.
const OFFICIAL_NAMESPACE: &str = "library";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: &str, tag: &str) -> Self {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        Self {
            repository: repository.trim_matches('/').to_string(),
            tag: tag.to_string(),
        }
    }

    /// The repository as `config`'s registry names it. On Docker Hub `nginx`
    /// becomes `library/nginx`; other registries get the name unchanged.
    pub fn qualified_for(&self, config: &RegistryConfig) -> Self {
        if config.is_docker_hub() && !self.repository.contains('/') {
            Self {
                repository: format!("{OFFICIAL_NAMESPACE}/{}", self.repository),
                tag: self.tag.clone(),
            }
        } else {
            self.clone()
        }
    }

    /// Parses `repo[:tag]`. A colon before the last `/` belongs to a
    /// registry host, not a tag.
    pub fn parse(image: &str) -> Self {
        let name_start = image.rfind('/').map_or(0, |i| i + 1);
        match image[name_start..].rfind(':') {
            Some(i) => {
                let split = name_start + i;
                Self::new(&image[..split], &image[split + 1..])
            }
            None => Self::new(image, DEFAULT_TAG),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
