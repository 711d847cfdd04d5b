//! OS-specific command sequences.
//!
//! One [`Platform`] is chosen per run from the detected [`OsFamily`]; call
//! sites never branch on the distribution themselves.

use crate::osdetect::OsFamily;
use crate::service::{openrc_script, systemd_unit, ServiceFile, ServiceSpec};

/// One command to run, with the failures it is allowed to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    /// A non-zero exit whose output contains one of these is not an error.
    pub tolerated: Vec<&'static str>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            tolerated: Vec::new(),
        }
    }

    pub fn tolerating(mut self, markers: &[&'static str]) -> Self {
        self.tolerated.extend_from_slice(markers);
        self
    }

    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Account to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub system: bool,
    pub home: Option<String>,
    pub shell: String,
}

impl UserSpec {
    /// System account without a home and with a non-login shell.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: true,
            home: None,
            shell: "/bin/false".to_string(),
        }
    }

    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

/// An APT repository added together with its signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptRepository {
    pub url: String,
    pub key_url: String,
    /// File stem for the keyring and the sources file; derived from `url` when unset.
    pub name: Option<String>,
    /// Distribution suite; the host's codename when unset.
    pub suite: Option<String>,
    pub components: String,
}

impl AptRepository {
    pub fn new(url: impl Into<String>, key_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_url: key_url.into(),
            name: None,
            suite: None,
            components: "main".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    pub fn components(mut self, components: impl Into<String>) -> Self {
        self.components = components.into();
        self
    }

    /// The explicit name, else the last path segment of the URL, else its
    /// host with dots as hyphens. Anything outside `[A-Za-z0-9_-]` becomes `-`.
    pub fn file_stem(&self) -> String {
        let raw = match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let rest = self.url.split_once("://").map_or(self.url.as_str(), |(_, r)| r);
                let rest = rest.split(['?', '#']).next().unwrap_or(rest);
                let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
                match path.split('/').rfind(|s| !s.is_empty()) {
                    Some(segment) => segment.to_string(),
                    None => {
                        let host = authority.rsplit('@').next().unwrap_or(authority);
                        let host = host.split(':').next().unwrap_or(host);
                        host.to_ascii_lowercase().replace('.', "-")
                    }
                }
            }
        };
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
            .collect()
    }
}

pub trait Platform {
    fn family(&self) -> OsFamily;

    fn pkg_install(&self, packages: &[String]) -> Vec<CommandSpec>;

    fn enable_service(&self, name: &str) -> Vec<CommandSpec>;

    fn restart_service(&self, name: &str) -> Vec<CommandSpec>;

    fn create_user(&self, user: &UserSpec) -> CommandSpec;

    /// Init-system definition for `service`; enabling it is `enable_service`.
    fn service_file(&self, service: &ServiceSpec) -> ServiceFile;

    /// Whether APT keys and sources can be managed.
    fn supports_apt(&self) -> bool {
        false
    }

    /// Remediation hint for a failed package install, from its output.
    fn install_failure_hint(&self, _output: &str) -> Option<&'static str> {
        None
    }
}

/// apt, systemd, useradd.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebianPlatform;

impl Platform for DebianPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Debian
    }

    fn pkg_install(&self, packages: &[String]) -> Vec<CommandSpec> {
        let mut install = CommandSpec::new(["apt-get", "install", "-y", "-qq"]);
        install.argv.extend(packages.iter().cloned());
        vec![CommandSpec::new(["apt-get", "update", "-qq"]), install]
    }

    fn enable_service(&self, name: &str) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(["systemctl", "daemon-reload"]),
            CommandSpec::new(["systemctl", "enable", name]),
            CommandSpec::new(["systemctl", "start", name]),
        ]
    }

    fn restart_service(&self, name: &str) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(["systemctl", "daemon-reload"]),
            CommandSpec::new(["systemctl", "restart", name]),
        ]
    }

    fn create_user(&self, user: &UserSpec) -> CommandSpec {
        let mut argv = vec!["useradd".to_string()];
        if user.system {
            argv.push("--system".into());
        }
        match &user.home {
            Some(home) => argv.extend(["-m".into(), "-d".into(), home.clone()]),
            None => argv.push("--no-create-home".into()),
        }
        argv.extend(["--shell".into(), user.shell.clone(), user.name.clone()]);
        CommandSpec::new(argv).tolerating(&["already exists"])
    }

    fn service_file(&self, service: &ServiceSpec) -> ServiceFile {
        ServiceFile {
            path: format!("/etc/systemd/system/{}.service", service.name),
            contents: systemd_unit(service),
            mode: 0o644,
        }
    }

    fn supports_apt(&self) -> bool {
        true
    }

    fn install_failure_hint(&self, output: &str) -> Option<&'static str> {
        if output.contains("NO_PUBKEY") || output.contains("not signed") {
            Some(
                "A GPG key is missing or invalid. Check that the keyring path matches \
                 the signed-by= path in the repo line; use .asc for ASCII-armored keys \
                 and .gpg for binary keys.",
            )
        } else if output.contains("Could not resolve") {
            Some("DNS resolution failed. Check the repository URL.")
        } else {
            None
        }
    }
}

/// apk, OpenRC, busybox adduser.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlpinePlatform;

impl Platform for AlpinePlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Alpine
    }

    fn pkg_install(&self, packages: &[String]) -> Vec<CommandSpec> {
        let mut add = CommandSpec::new(["apk", "add", "--no-cache"]);
        add.argv.extend(packages.iter().cloned());
        vec![add]
    }

    fn enable_service(&self, name: &str) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(["rc-update", "add", name, "default"]),
            CommandSpec::new(["rc-service", name, "start"]),
        ]
    }

    fn restart_service(&self, name: &str) -> Vec<CommandSpec> {
        vec![CommandSpec::new(["rc-service", name, "restart"])]
    }

    fn create_user(&self, user: &UserSpec) -> CommandSpec {
        let shell = if user.shell == "/bin/false" {
            "/sbin/nologin".to_string()
        } else {
            user.shell.clone()
        };
        let mut argv = vec!["adduser".to_string(), "-D".into()];
        if user.system {
            argv.push("-S".into());
        }
        match &user.home {
            Some(home) => argv.extend(["-h".into(), home.clone()]),
            None => argv.extend(["-h".into(), "/dev/null".into(), "-H".into()]),
        }
        argv.extend(["-s".into(), shell, user.name.clone()]);
        CommandSpec::new(argv).tolerating(&["already exists", "in use"])
    }

    fn service_file(&self, service: &ServiceSpec) -> ServiceFile {
        ServiceFile {
            path: format!("/etc/init.d/{}", service.name),
            contents: openrc_script(service),
            mode: 0o755,
        }
    }
}

/// Unknown distributions get the Debian tooling.
pub fn platform_for(family: OsFamily) -> Box<dyn Platform> {
    match family {
        OsFamily::Alpine => Box::new(AlpinePlatform),
        OsFamily::Debian | OsFamily::Unknown => Box::new(DebianPlatform),
    }
}
