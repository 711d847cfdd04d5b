//! Gated privileged actions.
//!
//! Every action checks the capability gate first and does nothing on a
//! violation. Approved actions are turned into platform command sequences and
//! handed to the [`CommandRunner`], or performed on the filesystem directly.

use crate::error::SdkError;
use crate::inputs::AppInputs;
use crate::osdetect::{self, OsFamily};
use crate::platform::{platform_for, AptRepository, CommandSpec, Platform, UserSpec};
use crate::runner::{CommandOutput, CommandRunner, RunOptions, SystemRunner};
use crate::service::ServiceSpec;
use provgate_capability::{CapabilityGate, CapabilityManifest, ResourceClass};
use provgate_registry::{
    ImageReference, PulledBinary, RegistryClient, RegistryConfig, RegistryTransport,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Virtual environment used by `pip_install` when none is given.
pub const DEFAULT_VENV: &str = "/opt/venv";

const APT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";
const APT_KEYRINGS_DIR: &str = "/usr/share/keyrings";
/// Suite used when neither the caller nor os-release names one.
const FALLBACK_SUITE: &str = "stable";
const MIN_POLL_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

pub struct Provisioner {
    gate: CapabilityGate,
    platform: Box<dyn Platform>,
    runner: Box<dyn CommandRunner>,
    inputs: AppInputs,
    registry: RegistryConfig,
    sysroot: PathBuf,
}

impl Provisioner {
    pub fn new(
        manifest: CapabilityManifest,
        platform: Box<dyn Platform>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            gate: CapabilityGate::new(manifest),
            platform,
            runner,
            inputs: AppInputs::default(),
            registry: RegistryConfig::default(),
            sysroot: PathBuf::from("/"),
        }
    }

    /// Host provisioner: platform from `/etc/os-release`, real processes.
    pub fn for_host(manifest: CapabilityManifest) -> Self {
        let family = osdetect::detect_os_from(osdetect::OS_RELEASE);
        info!(os = %family, "Detected platform");
        Self::new(manifest, platform_for(family), Box::new(SystemRunner))
    }

    pub fn with_inputs(mut self, inputs: AppInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Root under which fixed system locations (`/etc/apt`, `/etc/systemd`,
    /// `/etc/os-release`, ...) are resolved. Defaults to `/`.
    pub fn with_sysroot(mut self, sysroot: impl Into<PathBuf>) -> Self {
        self.sysroot = sysroot.into();
        self
    }

    pub fn inputs(&self) -> &AppInputs {
        &self.inputs
    }

    pub fn gate(&self) -> &CapabilityGate {
        &self.gate
    }

    pub fn os_family(&self) -> OsFamily {
        self.platform.family()
    }

    // ================================================================
    // Internals
    // ================================================================

    fn check(&self, class: ResourceClass, value: &str) -> Result<(), SdkError> {
        self.gate.check(class, value).map_err(|violation| {
            warn!(class = %violation.class, value = %violation.value, "Capability denied");
            SdkError::PermissionDenied(violation)
        })
    }

    fn require_apt(&self, action: &str) -> Result<(), SdkError> {
        if self.platform.supports_apt() {
            Ok(())
        } else {
            Err(SdkError::UnsupportedPlatform(format!(
                "{action} (apt methods need Debian/Ubuntu, host is {})",
                self.platform.family()
            )))
        }
    }

    fn exec(
        &self,
        spec: &CommandSpec,
        options: &RunOptions,
        check: bool,
    ) -> Result<CommandOutput, SdkError> {
        let out = self.runner.run(&spec.argv, options)?;
        if out.success() {
            return Ok(out);
        }
        if spec.tolerated.iter().any(|marker| out.output.contains(marker)) {
            info!(command = %spec.display(), "Ignoring tolerated failure");
            return Ok(out);
        }
        if check {
            return Err(SdkError::Command {
                command: spec.display(),
                code: out.code,
                output: out.output,
            });
        }
        warn!(command = %spec.display(), code = ?out.code, "Command failed (non-fatal)");
        Ok(out)
    }

    fn exec_all(&self, specs: &[CommandSpec]) -> Result<(), SdkError> {
        for spec in specs {
            self.exec(spec, &RunOptions::default(), true)?;
        }
        Ok(())
    }

    fn system_path(&self, path: &str) -> String {
        self.sysroot
            .join(path.trim_start_matches('/'))
            .to_string_lossy()
            .into_owned()
    }

    fn host_codename(&self) -> String {
        fs::read_to_string(self.system_path(osdetect::OS_RELEASE))
            .ok()
            .and_then(|text| osdetect::version_codename(&text))
            .unwrap_or_else(|| FALLBACK_SUITE.to_string())
    }

    fn argv<const N: usize>(&self, parts: [&str; N]) -> Result<(), SdkError> {
        self.exec(&CommandSpec::new(parts), &RunOptions::default(), true)
            .map(|_| ())
    }

    // ================================================================
    // Packages
    // ================================================================

    pub fn pkg_install(&self, packages: &[&str]) -> Result<(), SdkError> {
        for package in packages {
            self.check(ResourceClass::Package, package)?;
        }
        let packages: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
        info!(os = %self.platform.family(), packages = ?packages, "Installing packages");

        for spec in self.platform.pkg_install(&packages) {
            match self.exec(&spec, &RunOptions::default(), true) {
                Ok(_) => {}
                Err(SdkError::Command { command, code, output }) => {
                    let output = match self.platform.install_failure_hint(&output) {
                        Some(hint) => format!("{output}\n\nHint: {hint}"),
                        None => output,
                    };
                    return Err(SdkError::Command { command, code, output });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Installs into `venv` (default [`DEFAULT_VENV`]), creating it first if
    /// it has no `bin/pip`.
    pub fn pip_install(&self, packages: &[&str], venv: Option<&str>) -> Result<(), SdkError> {
        for package in packages {
            self.check(ResourceClass::PythonPackage, package)?;
        }
        let venv = venv.unwrap_or(DEFAULT_VENV);
        self.check(ResourceClass::Path, venv)?;

        let pip = format!("{venv}/bin/pip");
        if !Path::new(&pip).is_file() {
            info!(venv, "Creating venv");
            self.argv(["python3", "-m", "venv", venv])?;
        }
        info!(packages = ?packages, "Installing pip packages");
        let mut spec = CommandSpec::new([pip.as_str(), "install", "--progress-bar", "off"]);
        spec.argv.extend(packages.iter().map(|p| p.to_string()));
        self.exec(&spec, &RunOptions::default(), true).map(|_| ())
    }

    pub fn create_venv(&self, path: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::Path, path)?;
        info!(path, "Creating venv");
        self.argv(["python3", "-m", "venv", path])?;
        let pip = format!("{path}/bin/pip");
        self.argv([pip.as_str(), "install", "--progress-bar", "off", "-U", "pip"])
    }

    /// Keyrings ending in `.gpg` are dearmored; anything else is stored as
    /// downloaded.
    pub fn add_apt_key(&self, url: &str, keyring_path: &str) -> Result<(), SdkError> {
        self.require_apt("add_apt_key")?;
        self.check(ResourceClass::Url, url)?;
        self.check(ResourceClass::Path, keyring_path)?;
        info!(url, keyring = keyring_path, "Adding APT key");
        create_parent(keyring_path)?;

        if keyring_path.ends_with(".gpg") {
            let armored = format!("{keyring_path}.download");
            self.argv(["curl", "-fsSL", "-o", armored.as_str(), url])?;
            let dearmor =
                self.argv(["gpg", "--dearmor", "--yes", "-o", keyring_path, armored.as_str()]);
            let _ = fs::remove_file(&armored);
            dearmor
        } else {
            self.argv(["curl", "-fsSL", "-o", keyring_path, url])
        }
    }

    /// Writes `repo_line` to `/etc/apt/sources.list.d/<filename>`.
    pub fn add_apt_repo(&self, repo_line: &str, filename: &str) -> Result<(), SdkError> {
        self.require_apt("add_apt_repo")?;
        self.check(ResourceClass::AptRepo, repo_line)?;
        let dest = self.system_path(&format!("{APT_SOURCES_DIR}/{filename}"));
        self.check(ResourceClass::Path, &dest)?;
        info!(file = %dest, "Adding APT repo");
        create_parent(&dest)?;
        fs::write(&dest, format!("{repo_line}\n"))?;
        Ok(())
    }

    /// Installs the signing key under `/usr/share/keyrings` and writes a
    /// `signed-by` source for it. The suite defaults to the host codename.
    pub fn add_apt_repository(&self, repo: &AptRepository) -> Result<(), SdkError> {
        self.require_apt("add_apt_repository")?;
        self.check(ResourceClass::Url, &repo.url)?;
        self.check(ResourceClass::Url, &repo.key_url)?;

        let name = repo.file_stem();
        let suite = match repo.suite.as_deref().filter(|s| !s.is_empty()) {
            Some(suite) => suite.to_string(),
            None => self.host_codename(),
        };
        let keyring = format!("{APT_KEYRINGS_DIR}/{name}.gpg");
        info!(repo = %repo.url, suite = %suite, "Adding APT repository");

        self.add_apt_key(&repo.key_url, &self.system_path(&keyring))?;
        let line = format!(
            "deb [signed-by={keyring}] {} {suite} {}",
            repo.url, repo.components
        );
        self.add_apt_repo(&line, &format!("{name}.list"))
    }

    // ================================================================
    // Files
    // ================================================================

    pub fn write_file(
        &self,
        path: &str,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), SdkError> {
        self.check(ResourceClass::Path, path)?;
        create_parent(path)?;
        fs::write(path, contents)?;
        if let Some(mode) = mode {
            set_mode(path, mode)?;
        }
        info!(path, bytes = contents.len(), "Wrote file");
        Ok(())
    }

    /// Writes `KEY=VALUE` lines, skipping empty values.
    pub fn write_env_file<I, K, V>(&self, path: &str, vars: I, mode: u32) -> Result<(), SdkError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.check(ResourceClass::Path, path)?;
        let mut contents = String::new();
        let mut count = 0;
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            if value.is_empty() {
                continue;
            }
            if key.is_empty() || key.contains(['=', '\n', '\r']) || value.contains(['\n', '\r']) {
                return Err(SdkError::Input {
                    key: key.to_string(),
                    reason: "not a single KEY=VALUE line".to_string(),
                });
            }
            contents.push_str(&format!("{key}={value}\n"));
            count += 1;
        }
        create_parent(path)?;
        fs::write(path, &contents)?;
        set_mode(path, mode)?;
        info!(path, vars = count, "Wrote env file");
        Ok(())
    }

    pub fn create_dir(&self, path: &str, owner: Option<&str>, mode: u32) -> Result<(), SdkError> {
        self.check(ResourceClass::Path, path)?;
        fs::create_dir_all(path)?;
        set_mode(path, mode)?;
        if let Some(owner) = owner {
            self.argv(["chown", owner, path])?;
        }
        info!(path, "Created directory");
        Ok(())
    }

    pub fn chown(&self, path: &str, owner: &str, recursive: bool) -> Result<(), SdkError> {
        self.check(ResourceClass::Path, path)?;
        if recursive {
            self.argv(["chown", "-R", owner, path])
        } else {
            self.argv(["chown", owner, path])
        }
    }

    /// Polls `url` until it answers 200. Returns `false` once `timeout` has
    /// been spent on attempts `interval` apart.
    pub fn wait_for_http(
        &self,
        url: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, SdkError> {
        self.check(ResourceClass::Url, url)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(interval.max(MIN_POLL_REQUEST_TIMEOUT))
            .build()
            .map_err(|e| SdkError::Http(e.to_string()))?;

        let attempts = u64::try_from(timeout.as_millis() / interval.as_millis().max(1))
            .unwrap_or(u64::MAX)
            .max(1);
        info!(url, timeout_secs = timeout.as_secs(), "Waiting for HTTP 200");
        for attempt in 1..=attempts {
            match client.get(url).send() {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    info!(url, attempt, "HTTP 200 received");
                    return Ok(true);
                }
                Ok(resp) => debug!(url, status = %resp.status(), "Not ready"),
                Err(e) => debug!(url, "Not reachable: {}", e),
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        warn!(url, "Timed out waiting for HTTP 200");
        Ok(false)
    }

    pub fn download(&self, url: &str, dest: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::Url, url)?;
        self.check(ResourceClass::Path, dest)?;
        info!(url, dest, "Downloading");
        create_parent(dest)?;
        self.argv(["curl", "-fsSL", "-o", dest, url])
    }

    // ================================================================
    // Services and users
    // ================================================================

    pub fn enable_service(&self, name: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::Service, name)?;
        info!(service = name, "Enabling service");
        self.exec_all(&self.platform.enable_service(name))
    }

    pub fn restart_service(&self, name: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::Service, name)?;
        info!(service = name, "Restarting service");
        self.exec_all(&self.platform.restart_service(name))
    }

    /// Writes the init-system definition, then enables and starts it.
    pub fn create_service(&self, service: &ServiceSpec) -> Result<(), SdkError> {
        self.check(ResourceClass::Service, &service.name)?;
        service.validate()?;
        let file = self.platform.service_file(service);
        let path = self.system_path(&file.path);
        self.check(ResourceClass::Path, &path)?;

        create_parent(&path)?;
        fs::write(&path, &file.contents)?;
        set_mode(&path, file.mode)?;
        info!(service = %service.name, path = %path, "Created service");
        self.exec_all(&self.platform.enable_service(&service.name))
    }

    /// An account that already exists is not an error.
    pub fn create_user(&self, user: &UserSpec) -> Result<(), SdkError> {
        self.check(ResourceClass::User, &user.name)?;
        info!(user = %user.name, "Creating user");
        self.exec(&self.platform.create_user(user), &RunOptions::default(), true)
            .map(|_| ())
    }

    // ================================================================
    // Commands
    // ================================================================

    /// Runs `argv` directly; its program must be an allowed command.
    pub fn run_command(
        &self,
        argv: &[String],
        options: &RunOptions,
        check: bool,
    ) -> Result<CommandOutput, SdkError> {
        let program = argv
            .first()
            .ok_or_else(|| SdkError::Lifecycle("empty command".into()))?;
        self.check(ResourceClass::Command, program)?;
        self.exec(&CommandSpec::new(argv.iter().cloned()), options, check)
    }

    /// Splits `line` with shell quoting rules, then behaves like
    /// [`run_command`](Self::run_command).
    pub fn run_command_line(
        &self,
        line: &str,
        options: &RunOptions,
        check: bool,
    ) -> Result<CommandOutput, SdkError> {
        let argv = shlex::split(line)
            .ok_or_else(|| SdkError::Lifecycle(format!("unbalanced quotes in command: {line}")))?;
        self.run_command(&argv, options, check)
    }

    /// Runs `line` through bash. Only its first word is checked.
    pub fn run_shell(
        &self,
        line: &str,
        options: &RunOptions,
        check: bool,
    ) -> Result<CommandOutput, SdkError> {
        if line.trim().is_empty() {
            return Err(SdkError::Lifecycle("empty shell command".into()));
        }
        self.gate.check_command_line(line).map_err(|violation| {
            warn!(class = %violation.class, value = %violation.value, "Capability denied");
            SdkError::PermissionDenied(violation)
        })?;
        self.exec(&CommandSpec::new(["bash", "-c", line]), options, check)
    }

    /// Downloads a remote installer to a temporary file and runs it with bash.
    pub fn run_installer_script(&self, url: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::InstallerScript, url)?;
        info!(url, "Running installer script");

        let script = tempfile::Builder::new()
            .prefix("installer-")
            .suffix(".sh")
            .tempfile()?;
        let path = script.path().to_string_lossy().into_owned();
        self.argv(["curl", "-fsSL", "-o", path.as_str(), url])?;
        set_mode(&path, 0o755)?;
        self.argv(["bash", path.as_str()])
    }

    // ================================================================
    // Registry
    // ================================================================

    /// Pulls a binary out of a container image over HTTP.
    pub fn pull_oci_binary(
        &self,
        image: &str,
        dest: &str,
        tag: &str,
    ) -> Result<PulledBinary, SdkError> {
        self.check_registry_access(dest)?;
        let client = RegistryClient::from_config(self.registry.clone())?;
        self.pull_with(&client, image, dest, tag, None)
    }

    /// Like [`pull_oci_binary`](Self::pull_oci_binary), matching layer
    /// entries against `candidates` instead of the destination's file name.
    pub fn pull_oci_binary_named(
        &self,
        image: &str,
        dest: &str,
        tag: &str,
        candidates: &[String],
    ) -> Result<PulledBinary, SdkError> {
        self.check_registry_access(dest)?;
        let client = RegistryClient::from_config(self.registry.clone())?;
        self.pull_with(&client, image, dest, tag, Some(candidates))
    }

    /// Same as [`pull_oci_binary`](Self::pull_oci_binary) with a caller-supplied client.
    pub fn pull_oci_binary_with<T: RegistryTransport>(
        &self,
        client: &RegistryClient<T>,
        image: &str,
        dest: &str,
        tag: &str,
    ) -> Result<PulledBinary, SdkError> {
        self.check_registry_access(dest)?;
        self.pull_with(client, image, dest, tag, None)
    }

    fn check_registry_access(&self, dest: &str) -> Result<(), SdkError> {
        self.check(ResourceClass::Url, &origin_pattern(&self.registry.auth_url))?;
        self.check(ResourceClass::Url, &origin_pattern(&self.registry.registry_url))?;
        self.check(ResourceClass::Path, dest)
    }

    fn pull_with<T: RegistryTransport>(
        &self,
        client: &RegistryClient<T>,
        image: &str,
        dest: &str,
        tag: &str,
        candidates: Option<&[String]>,
    ) -> Result<PulledBinary, SdkError> {
        let reference = ImageReference::new(image, tag);
        let pulled = client.pull(&reference, Path::new(dest), candidates)?;
        self.report_missing_libraries(dest);
        Ok(pulled)
    }

    /// Warns about unresolved shared libraries; silent when `ldd` is unavailable.
    fn report_missing_libraries(&self, dest: &str) {
        let argv = ["ldd".to_string(), dest.to_string()];
        let Ok(out) = self.runner.run(&argv, &RunOptions::default()) else {
            return;
        };
        if !out.success() {
            return;
        }
        let missing: Vec<&str> = out
            .output
            .lines()
            .filter(|line| line.contains("not found"))
            .map(str::trim)
            .collect();
        if !missing.is_empty() {
            warn!(binary = dest, missing = ?missing, "Binary has missing shared libraries");
        }
    }
}

/// `scheme://host/*` for a URL.
fn origin_pattern(url: &str) -> String {
    let (scheme, rest) = url.split_once("://").unwrap_or(("https", url));
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{host}/*")
}

fn create_parent(path: &str) -> Result<(), SdkError> {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(path: &str, mode: u32) -> Result<(), SdkError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &str, _mode: u32) -> Result<(), SdkError> {
    Ok(())
}
