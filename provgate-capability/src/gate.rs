//! The capability gate: one check per resource class.
//!
//! Every check is pure: it reads the manifest and the candidate value and
//! returns either `Ok(())` or a [`CapabilityViolation`]. Nothing here ever
//! performs the action being checked.

use crate::class::ResourceClass;
use crate::error::CapabilityViolation;
use crate::manifest::CapabilityManifest;
use crate::matching::{
    first_http_url, first_shell_word, glob_match, is_within, normalize_whitespace,
    pip_distribution_name,
};

/// Scratch locations every script may write to.
pub const SCRATCH_PATHS: &[&str] = &["/tmp", "/opt/venv"];

/// Mediates privileged actions against a manifest.
#[derive(Debug, Clone)]
pub struct CapabilityGate {
    manifest: CapabilityManifest,
}

impl CapabilityGate {
    pub fn new(manifest: CapabilityManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    /// Dispatches to the check for `class`.
    pub fn check(&self, class: ResourceClass, value: &str) -> Result<(), CapabilityViolation> {
        match class {
            ResourceClass::Package => self.check_package(value),
            ResourceClass::PythonPackage => self.check_python_package(value),
            ResourceClass::Url => self.check_url(value),
            ResourceClass::Path => self.check_path(value),
            ResourceClass::Service => self.check_service(value),
            ResourceClass::User => self.check_user(value),
            ResourceClass::Command => self.check_command(value),
            ResourceClass::InstallerScript => self.check_installer_script(value),
            ResourceClass::AptRepo => self.check_apt_repo_line(value),
        }
    }

    pub fn check_package(&self, name: &str) -> Result<(), CapabilityViolation> {
        self.check_glob(ResourceClass::Package, name)
    }

    pub fn check_command(&self, name: &str) -> Result<(), CapabilityViolation> {
        self.check_glob(ResourceClass::Command, name)
    }

    /// Checks the binary of a shell command line (its first word).
    pub fn check_command_line(&self, line: &str) -> Result<(), CapabilityViolation> {
        match first_shell_word(line) {
            Some(binary) => self.check_command(&binary),
            None => Err(self.violation(ResourceClass::Command, "")),
        }
    }

    pub fn check_url(&self, url: &str) -> Result<(), CapabilityViolation> {
        self.check_glob(ResourceClass::Url, url)
    }

    /// `"foo<2"` passes when `"foo"` is allowed; allowlist entries are stripped the same way.
    pub fn check_python_package(&self, spec: &str) -> Result<(), CapabilityViolation> {
        let name = pip_distribution_name(spec);
        let allowed = !name.is_empty()
            && self
                .manifest
                .python_packages()
                .iter()
                .any(|entry| glob_match(name, pip_distribution_name(entry)));
        self.verdict(allowed, ResourceClass::PythonPackage, spec)
    }

    pub fn check_path(&self, path: &str) -> Result<(), CapabilityViolation> {
        let allowed = SCRATCH_PATHS
            .iter()
            .copied()
            .chain(self.manifest.path_prefixes().iter().map(String::as_str))
            .any(|prefix| is_within(path, prefix));
        if allowed {
            return Ok(());
        }
        let effective: Vec<String> = SCRATCH_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(self.manifest.path_prefixes().iter().cloned())
            .collect();
        Err(CapabilityViolation::new(ResourceClass::Path, path, &effective))
    }

    pub fn check_service(&self, name: &str) -> Result<(), CapabilityViolation> {
        self.check_exact(ResourceClass::Service, name)
    }

    pub fn check_user(&self, name: &str) -> Result<(), CapabilityViolation> {
        self.check_exact(ResourceClass::User, name)
    }

    /// URL patterns first (glob), then the legacy exact-URL installer list.
    ///
    /// The ordering is a compatibility contract with existing manifests.
    pub fn check_installer_script(&self, url: &str) -> Result<(), CapabilityViolation> {
        let by_pattern = self
            .manifest
            .url_patterns()
            .iter()
            .any(|pattern| glob_match(url, pattern));
        let by_legacy = || {
            self.manifest
                .installer_script_urls()
                .iter()
                .any(|entry| entry == url)
        };
        if by_pattern || by_legacy() {
            return Ok(());
        }
        let combined: Vec<String> = self
            .manifest
            .installer_script_urls()
            .iter()
            .chain(self.manifest.url_patterns())
            .cloned()
            .collect();
        Err(CapabilityViolation::new(ResourceClass::InstallerScript, url, &combined))
    }

    /// Repository URL first (equality, descendant, or glob), then the whole
    /// line compared exactly after whitespace normalization.
    ///
    /// Matching on the URL keeps `[signed-by=...]` option brackets out of glob evaluation.
    /// A value holding several lines passes only if every line does; the
    /// violation names the first rejected line.
    pub fn check_apt_repo_line(&self, line: &str) -> Result<(), CapabilityViolation> {
        let mut lines = line
            .split(['\n', '\r'])
            .filter(|l| !l.trim().is_empty())
            .peekable();
        if lines.peek().is_none() {
            return self.check_single_apt_line(line);
        }
        lines.try_for_each(|l| self.check_single_apt_line(l))
    }

    fn check_single_apt_line(&self, line: &str) -> Result<(), CapabilityViolation> {
        let entries = self.manifest.apt_repo_lines();

        if let Some(url) = first_http_url(line) {
            let url_allowed = entries.iter().any(|entry| {
                let entry = entry.trim().trim_end_matches('/');
                !entry.is_empty()
                    && (url == entry
                        || url
                            .strip_prefix(entry)
                            .is_some_and(|rest| rest.starts_with('/'))
                        || glob_match(url, entry))
            });
            if url_allowed {
                return Ok(());
            }
        }

        let normalized = normalize_whitespace(line);
        let line_allowed = !normalized.is_empty()
            && entries
                .iter()
                .any(|entry| normalize_whitespace(entry) == normalized);
        self.verdict(line_allowed, ResourceClass::AptRepo, line)
    }

    fn check_glob(&self, class: ResourceClass, value: &str) -> Result<(), CapabilityViolation> {
        let allowed = self
            .manifest
            .allowlist(class)
            .iter()
            .any(|pattern| glob_match(value, pattern));
        self.verdict(allowed, class, value)
    }

    fn check_exact(&self, class: ResourceClass, value: &str) -> Result<(), CapabilityViolation> {
        let allowed = self.manifest.allowlist(class).iter().any(|entry| entry == value);
        self.verdict(allowed, class, value)
    }

    fn verdict(
        &self,
        allowed: bool,
        class: ResourceClass,
        value: &str,
    ) -> Result<(), CapabilityViolation> {
        if allowed {
            Ok(())
        } else {
            Err(self.violation(class, value))
        }
    }

    fn violation(&self, class: ResourceClass, value: &str) -> CapabilityViolation {
        CapabilityViolation::new(class, value, self.manifest.allowlist(class))
    }
}
