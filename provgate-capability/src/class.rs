//! Resource classes a provisioning script may touch.
//!
//! Each class carries its own matching rule:
//! - Glob: packages, python packages, URLs, commands
//! - Path prefix: filesystem paths
//! - Exact: services, users
//! - Composite: installer scripts (glob, then legacy exact), APT repo lines

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of privileged resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    Package,
    PythonPackage,
    Url,
    Path,
    Service,
    User,
    Command,
    InstallerScript,
    AptRepo,
}

/// How values in a class are compared against allowlist entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Glob,
    PathPrefix,
    Exact,
    Composite,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 9] = [
        Self::Package,
        Self::PythonPackage,
        Self::Url,
        Self::Path,
        Self::Service,
        Self::User,
        Self::Command,
        Self::InstallerScript,
        Self::AptRepo,
    ];

    /// Returns the matching rule for this class.
    pub fn rule(&self) -> MatchRule {
        match self {
            Self::Package | Self::PythonPackage | Self::Url | Self::Command => MatchRule::Glob,
            Self::Path => MatchRule::PathPrefix,
            Self::Service | Self::User => MatchRule::Exact,
            Self::InstallerScript | Self::AptRepo => MatchRule::Composite,
        }
    }

    /// Human label used in violation messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Package => "apt package",
            Self::PythonPackage => "pip package",
            Self::Url => "URL",
            Self::Path => "path",
            Self::Service => "service",
            Self::User => "user",
            Self::Command => "command",
            Self::InstallerScript => "installer script",
            Self::AptRepo => "APT repo",
        }
    }

    /// Manifest key holding this class's allowlist.
    pub fn manifest_key(&self) -> &'static str {
        match self {
            Self::Package => "packages",
            Self::PythonPackage => "pythonPackages",
            Self::Url => "urlPatterns",
            Self::Path => "pathPrefixes",
            Self::Service => "services",
            Self::User => "users",
            Self::Command => "commands",
            Self::InstallerScript => "installerScriptUrls",
            Self::AptRepo => "aptRepoLines",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ResourceClass {
    type Err = String;

    /// Accepts the kebab-case name (`python-package`) or the manifest key (`pythonPackages`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| {
                let kebab = serde_json::to_value(class)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_owned));
                kebab.as_deref() == Some(s) || class.manifest_key() == s
            })
            .ok_or_else(|| format!("unknown resource class: {s}"))
    }
}
