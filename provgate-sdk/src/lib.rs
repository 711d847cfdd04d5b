//! Provisioning runtime for gated app scripts.
//!
//! The [`Provisioner`] is the dispatcher side of the capability gate: every
//! privileged action it offers is checked against the script's manifest
//! before any OS tool runs. OS differences (apt/systemd vs apk/OpenRC) live
//! behind the [`Platform`] trait, chosen once per run from `/etc/os-release`.
//!
//! Apps implement [`App`] and are run through [`run_app`], which maps the
//! result onto the exit codes the engine expects.

mod app;
mod error;
mod inputs;
pub mod osdetect;
pub mod platform;
mod provisioner;
pub mod runner;
mod service;

pub use app::{run_app, Action, App, Outcome, RunOutcome};
pub use error::SdkError;
pub use inputs::AppInputs;
pub use osdetect::{detect_os, version_codename, OsFamily};
pub use platform::{
    platform_for, AlpinePlatform, AptRepository, CommandSpec, DebianPlatform, Platform, UserSpec,
};
pub use provisioner::{Provisioner, DEFAULT_VENV};
pub use runner::{CommandOutput, CommandRunner, RecordingRunner, RunOptions, SystemRunner};
pub use service::{openrc_script, systemd_unit, ServiceFile, ServiceSpec};
