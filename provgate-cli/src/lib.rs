//! Command-line front end.
//!
//! Subcommands:
//! - `analyze <script>`: print the fact sheet of an app script as JSON
//! - `check --manifest <file> <class> <value>`: ask the capability gate
//! - `pull-binary --manifest <file> <image> <dest>`: install one binary out
//!   of a container image, gated by the manifest
//!
//! [`execute`] returns the process exit code; `main` only sets up logging.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use provgate_audit::analyze;
use provgate_capability::{CapabilityGate, CapabilityManifest, ResourceClass};
use provgate_registry::{DEFAULT_TAG, RegistryConfig};
use provgate_sdk::{Provisioner, SdkError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exit code for a denied capability, shared with the app runner.
pub const EXIT_DENIED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "provgate")]
#[command(about = "Capability-gated provisioning: audit scripts, check manifests, pull binaries")]
pub struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the static fact sheet of an app script as JSON
    Analyze {
        /// Python source of the app
        script: PathBuf,
    },

    /// Check one value against a capability manifest
    Check {
        /// Capability manifest (JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Resource class, e.g. `package`, `url`, `python-package`
        class: ResourceClass,

        /// Value to check
        value: String,
    },

    /// Pull a single binary out of a container image
    PullBinary {
        /// Capability manifest (JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Registry settings (TOML with a `[registry]` table)
        #[arg(long)]
        registry_config: Option<PathBuf>,

        /// Image repository, e.g. `traefik` or `org/tool`
        image: String,

        /// Where to install the binary
        dest: String,

        #[arg(short, long, default_value = DEFAULT_TAG)]
        tag: String,

        /// Archive entry names to look for (repeatable)
        #[arg(short, long = "name")]
        names: Vec<String>,
    },
}

/// Runs one subcommand, writing results to `out` and diagnostics to `err`.
pub fn execute(cli: Cli, out: &mut impl Write, err: &mut impl Write) -> Result<i32> {
    match cli.command {
        Command::Analyze { script } => analyze_script(&script, out),
        Command::Check {
            manifest,
            class,
            value,
        } => check(&manifest, class, &value, out, err),
        Command::PullBinary {
            manifest,
            registry_config,
            image,
            dest,
            tag,
            names,
        } => pull_binary(
            &manifest,
            registry_config.as_deref(),
            &image,
            &dest,
            &tag,
            &names,
            out,
            err,
        ),
    }
}

/// An unreadable script is reported in-band as `{"error": ...}` with exit 0,
/// so callers always get one JSON document.
fn analyze_script(script: &Path, out: &mut impl Write) -> Result<i32> {
    let document = match std::fs::read_to_string(script) {
        Ok(source) => {
            debug!("Analyzing {:?}", script);
            analyze(&source).to_json()
        }
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    };
    writeln!(out, "{document}")?;
    Ok(0)
}

fn load_manifest(path: &Path) -> Result<CapabilityManifest> {
    CapabilityManifest::from_file(path)
        .with_context(|| format!("failed to load capability manifest {}", path.display()))
}

fn check(
    manifest: &Path,
    class: ResourceClass,
    value: &str,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i32> {
    let gate = CapabilityGate::new(load_manifest(manifest)?);
    match gate.check(class, value) {
        Ok(()) => {
            writeln!(out, "allowed: {class} '{value}'")?;
            Ok(0)
        }
        Err(violation) => {
            writeln!(err, "denied: {violation}")?;
            Ok(EXIT_DENIED)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn pull_binary(
    manifest: &Path,
    registry_config: Option<&Path>,
    image: &str,
    dest: &str,
    tag: &str,
    names: &[String],
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<i32> {
    let registry = registry_config
        .map(RegistryConfig::load_from)
        .unwrap_or_default();
    let provisioner = Provisioner::for_host(load_manifest(manifest)?).with_registry(registry);

    let result = if names.is_empty() {
        provisioner.pull_oci_binary(image, dest, tag)
    } else {
        provisioner.pull_oci_binary_named(image, dest, tag, names)
    };

    match result {
        Ok(pulled) => {
            info!(
                "Installed {} from layer {} ({})",
                pulled.entry_name, pulled.layer_index, pulled.layer_digest
            );
            writeln!(
                out,
                "{} -> {} ({} bytes)",
                pulled.entry_name,
                pulled.path.display(),
                pulled.size
            )?;
            Ok(0)
        }
        Err(SdkError::PermissionDenied(violation)) => {
            writeln!(err, "denied: {violation}")?;
            Ok(EXIT_DENIED)
        }
        Err(e) => Err(e).with_context(|| format!("failed to pull {image}:{tag}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn run(args: &[&str]) -> (i32, String, String) {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = execute(cli, &mut out, &mut err).unwrap();
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    fn write_manifest(dir: &Path) -> PathBuf {
        let path = dir.join("manifest.json");
        fs::write(
            &path,
            r#"{"packages": ["nginx"], "paths": ["/srv/app"], "urls": ["https://example.com/*"]}"#,
        )
        .unwrap();
        path
    }

    // ================================================================
    // Argument parsing
    // ================================================================

    #[test]
    fn parses_pull_binary_flags() {
        let cli = Cli::try_parse_from([
            "provgate", "-v", "pull-binary", "-m", "m.json", "traefik", "/usr/local/bin/traefik",
            "--tag", "v3", "--name", "traefik", "--name", "bin/traefik",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::PullBinary {
                image,
                tag,
                names,
                registry_config,
                ..
            } => {
                assert_eq!(image, "traefik");
                assert_eq!(tag, "v3");
                assert_eq!(names, ["traefik", "bin/traefik"]);
                assert!(registry_config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn default_tag_is_latest() {
        let cli = Cli::try_parse_from(["provgate", "pull-binary", "-m", "m", "img", "/tmp/x"]).unwrap();
        assert!(matches!(cli.command, Command::PullBinary { tag, .. } if tag == "latest"));
    }

    #[test]
    fn rejects_unknown_class() {
        assert!(Cli::try_parse_from(["provgate", "check", "-m", "m", "kernel-module", "x"]).is_err());
    }

    // ================================================================
    // analyze
    // ================================================================

    #[test]
    fn analyze_prints_fact_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        fs::write(
            &script,
            "from appstore import BaseApp, run\n\nclass App(BaseApp):\n    def install(self):\n        self.apt_install('nginx')\n\nrun(App)\n",
        )
        .unwrap();

        let (code, out, _) = run(&["provgate", "analyze", script.to_str().unwrap()]);
        assert_eq!(code, 0);
        let facts: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(facts["class_name"], "App");
        assert_eq!(facts["has_run_call"], true);
    }

    #[test]
    fn analyze_reports_unreadable_file_in_band() {
        let (code, out, _) = run(&["provgate", "analyze", "/nonexistent/provgate/app.py"]);
        assert_eq!(code, 0);
        let doc: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(doc["error"].is_string());
    }

    // ================================================================
    // check
    // ================================================================

    #[test]
    fn check_allowed_and_denied() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());
        let manifest = manifest.to_str().unwrap();

        let (code, out, _) = run(&["provgate", "check", "-m", manifest, "package", "nginx"]);
        assert_eq!(code, 0);
        assert!(out.starts_with("allowed"));

        let (code, _, err) = run(&["provgate", "check", "-m", manifest, "path", "/etc/shadow"]);
        assert_eq!(code, EXIT_DENIED);
        assert!(err.contains("/etc/shadow"));
        assert!(err.contains("/srv/app"));
    }

    #[test]
    fn check_missing_manifest_is_error() {
        let cli = Cli::try_parse_from(["provgate", "check", "-m", "/nonexistent/m.json", "url", "x"])
            .unwrap();
        assert!(execute(cli, &mut Vec::new(), &mut Vec::new()).is_err());
    }

    // ================================================================
    // pull-binary
    // ================================================================

    #[test]
    fn pull_binary_denied_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_manifest(dir.path());

        let (code, _, err) = run(&[
            "provgate",
            "pull-binary",
            "-m",
            manifest.to_str().unwrap(),
            "traefik",
            "/srv/app/traefik",
        ]);
        assert_eq!(code, EXIT_DENIED);
        assert!(err.contains("auth.docker.io"));
    }
}
