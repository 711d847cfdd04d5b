//! Capability manifest, the per-script allowlist supplied by the engine.
//!
//! A manifest is built once per script invocation and never mutated after
//! construction. A missing class is an empty list, and an empty list denies
//! every value in that class.

use crate::class::ResourceClass;
use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared allowlists, one per resource class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    #[serde(default)]
    packages: Vec<String>,
    #[serde(default, alias = "pip")]
    python_packages: Vec<String>,
    #[serde(default, alias = "urls")]
    url_patterns: Vec<String>,
    #[serde(default, alias = "paths")]
    path_prefixes: Vec<String>,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default, alias = "installer_scripts")]
    installer_script_urls: Vec<String>,
    #[serde(default, alias = "apt_repos")]
    apt_repo_lines: Vec<String>,
}

impl CapabilityManifest {
    /// A manifest that allows nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Loads a manifest file. `.toml` files are parsed as TOML, everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    /// Returns the declared allowlist for a class.
    pub fn allowlist(&self, class: ResourceClass) -> &[String] {
        match class {
            ResourceClass::Package => &self.packages,
            ResourceClass::PythonPackage => &self.python_packages,
            ResourceClass::Url => &self.url_patterns,
            ResourceClass::Path => &self.path_prefixes,
            ResourceClass::Service => &self.services,
            ResourceClass::User => &self.users,
            ResourceClass::Command => &self.commands,
            ResourceClass::InstallerScript => &self.installer_script_urls,
            ResourceClass::AptRepo => &self.apt_repo_lines,
        }
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn python_packages(&self) -> &[String] {
        &self.python_packages
    }

    pub fn url_patterns(&self) -> &[String] {
        &self.url_patterns
    }

    pub fn path_prefixes(&self) -> &[String] {
        &self.path_prefixes
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn installer_script_urls(&self) -> &[String] {
        &self.installer_script_urls
    }

    pub fn apt_repo_lines(&self) -> &[String] {
        &self.apt_repo_lines
    }
}

/// Fluent builder for [`CapabilityManifest`].
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    manifest: CapabilityManifest,
}

impl ManifestBuilder {
    pub fn allow<I, S>(mut self, class: ResourceClass, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = match class {
            ResourceClass::Package => &mut self.manifest.packages,
            ResourceClass::PythonPackage => &mut self.manifest.python_packages,
            ResourceClass::Url => &mut self.manifest.url_patterns,
            ResourceClass::Path => &mut self.manifest.path_prefixes,
            ResourceClass::Service => &mut self.manifest.services,
            ResourceClass::User => &mut self.manifest.users,
            ResourceClass::Command => &mut self.manifest.commands,
            ResourceClass::InstallerScript => &mut self.manifest.installer_script_urls,
            ResourceClass::AptRepo => &mut self.manifest.apt_repo_lines,
        };
        for entry in entries {
            let entry = entry.into();
            if !list.contains(&entry) {
                list.push(entry);
            }
        }
        self
    }

    pub fn packages<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::Package, entries)
    }

    pub fn python_packages<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::PythonPackage, entries)
    }

    pub fn url_patterns<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::Url, entries)
    }

    pub fn path_prefixes<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::Path, entries)
    }

    pub fn services<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::Service, entries)
    }

    pub fn users<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::User, entries)
    }

    pub fn commands<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::Command, entries)
    }

    pub fn installer_script_urls<I: IntoIterator<Item = S>, S: Into<String>>(
        self,
        entries: I,
    ) -> Self {
        self.allow(ResourceClass::InstallerScript, entries)
    }

    pub fn apt_repo_lines<I: IntoIterator<Item = S>, S: Into<String>>(self, entries: I) -> Self {
        self.allow(ResourceClass::AptRepo, entries)
    }

    pub fn build(self) -> CapabilityManifest {
        self.manifest
    }
}
