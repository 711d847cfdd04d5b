//! App lifecycle and the action runner.
//!
//! The app is handed to [`run_app`] through an explicit factory; there is no
//! process-wide registration.

use crate::error::SdkError;
use crate::inputs::AppInputs;
use crate::provisioner::Provisioner;
use provgate_capability::CapabilityViolation;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

/// A provisioning app. Only `install` is required.
pub trait App {
    fn install(&mut self, provisioner: &Provisioner) -> Result<(), SdkError>;

    fn configure(&mut self, _provisioner: &Provisioner) -> Result<(), SdkError> {
        Ok(())
    }

    fn healthcheck(&mut self, _provisioner: &Provisioner) -> Result<bool, SdkError> {
        Ok(true)
    }

    fn uninstall(&mut self, _provisioner: &Provisioner) -> Result<(), SdkError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Configure,
    Healthcheck,
    Uninstall,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Self::Install,
        Self::Configure,
        Self::Healthcheck,
        Self::Uninstall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Configure => "configure",
            Self::Healthcheck => "healthcheck",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                SdkError::Lifecycle(format!(
                    "invalid action '{s}'; must be one of install, configure, healthcheck, uninstall"
                ))
            })
    }
}

#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    /// Healthcheck ran and reported false.
    Unhealthy,
    PermissionDenied(CapabilityViolation),
    Failed(SdkError),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub action: Action,
    pub outcome: Outcome,
}

impl RunOutcome {
    /// 0 success, 1 failure (including an unhealthy check), 2 permission denied.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Succeeded => 0,
            Outcome::Unhealthy | Outcome::Failed(_) => 1,
            Outcome::PermissionDenied(_) => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded)
    }
}

/// Builds the app from the provisioner's inputs and runs one action.
pub fn run_app<A, F>(action: Action, factory: F, provisioner: &Provisioner) -> RunOutcome
where
    A: App,
    F: FnOnce(&AppInputs) -> A,
{
    let mut app = factory(provisioner.inputs());
    info!("Starting {action}...");

    let result = match action {
        Action::Install => app.install(provisioner).map(|()| true),
        Action::Configure => app.configure(provisioner).map(|()| true),
        Action::Healthcheck => app.healthcheck(provisioner),
        Action::Uninstall => app.uninstall(provisioner).map(|()| true),
    };

    let outcome = match result {
        Ok(true) => {
            info!("{action} completed successfully");
            Outcome::Succeeded
        }
        Ok(false) => {
            warn!("Healthcheck returned false");
            Outcome::Unhealthy
        }
        Err(SdkError::PermissionDenied(violation)) => {
            error!("Permission denied: {violation}");
            Outcome::PermissionDenied(violation)
        }
        Err(e) => {
            error!("{action} failed: {e}");
            Outcome::Failed(e)
        }
    };
    RunOutcome { action, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!(matches!("deploy".parse::<Action>(), Err(SdkError::Lifecycle(_))));
    }

    #[test]
    fn exit_codes() {
        let outcome = |outcome| RunOutcome {
            action: Action::Install,
            outcome,
        };
        assert_eq!(outcome(Outcome::Succeeded).exit_code(), 0);
        assert_eq!(outcome(Outcome::Unhealthy).exit_code(), 1);
        assert_eq!(
            outcome(Outcome::Failed(SdkError::Lifecycle("x".into()))).exit_code(),
            1
        );
        let violation =
            CapabilityViolation::new(provgate_capability::ResourceClass::User, "root", &[]);
        assert_eq!(outcome(Outcome::PermissionDenied(violation)).exit_code(), 2);
    }
}
