//! Service definitions and their systemd / OpenRC renderings.

use crate::error::SdkError;

const DEFAULT_AFTER: &str = "network-online.target";

/// A long-running service to create, enable, and start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub exec_start: String,
    pub description: Option<String>,
    /// systemd `After=`/`Wants=`; an OpenRC `need` unless it is the network target.
    pub after: Option<String>,
    /// Runs as root when unset.
    pub user: Option<String>,
    pub working_directory: Option<String>,
    pub environment: Vec<(String, String)>,
    pub environment_file: Option<String>,
    pub restart: String,
    /// systemd only.
    pub restart_sec: u32,
    /// systemd only.
    pub service_type: String,
    /// Ignored on OpenRC.
    pub capabilities: Vec<String>,
    /// Raw lines for `[Unit]` (systemd only).
    pub extra_unit: Option<String>,
    /// Raw lines for `[Service]`, or the OpenRC `start_pre` body.
    pub extra_service: Option<String>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, exec_start: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exec_start: exec_start.into(),
            description: None,
            after: Some(DEFAULT_AFTER.to_string()),
            user: None,
            working_directory: None,
            environment: Vec::new(),
            environment_file: None,
            restart: "always".to_string(),
            restart_sec: 5,
            service_type: "simple".to_string(),
            capabilities: Vec::new(),
            extra_unit: None,
            extra_service: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn after(mut self, after: Option<&str>) -> Self {
        self.after = after.map(str::to_string);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    pub fn environment_file(mut self, path: impl Into<String>) -> Self {
        self.environment_file = Some(path.into());
        self
    }

    pub fn restart(mut self, policy: impl Into<String>, delay_secs: u32) -> Self {
        self.restart = policy.into();
        self.restart_sec = delay_secs;
        self
    }

    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn extra_unit(mut self, lines: impl Into<String>) -> Self {
        self.extra_unit = Some(lines.into());
        self
    }

    pub fn extra_service(mut self, lines: impl Into<String>) -> Self {
        self.extra_service = Some(lines.into());
        self
    }

    /// Rejects line breaks in single-line fields; they would inject
    /// directives into the rendered file.
    pub fn validate(&self) -> Result<(), SdkError> {
        let single_line = [
            ("name", Some(self.name.as_str())),
            ("exec_start", Some(self.exec_start.as_str())),
            ("description", self.description.as_deref()),
            ("after", self.after.as_deref()),
            ("user", self.user.as_deref()),
            ("working_directory", self.working_directory.as_deref()),
            ("environment_file", self.environment_file.as_deref()),
            ("restart", Some(self.restart.as_str())),
            ("service_type", Some(self.service_type.as_str())),
        ];
        let environment = self
            .environment
            .iter()
            .flat_map(|(k, v)| [("environment", Some(k.as_str())), ("environment", Some(v.as_str()))]);
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| ("capabilities", Some(c.as_str())));

        for (field, value) in single_line.into_iter().chain(environment).chain(capabilities) {
            if value.is_some_and(|v| v.contains(['\n', '\r'])) {
                return Err(SdkError::Input {
                    key: field.to_string(),
                    reason: format!("line break in service '{}' definition", self.name),
                });
            }
        }
        if self.name.trim().is_empty() || self.exec_start.trim().is_empty() {
            return Err(SdkError::Input {
                key: "name".to_string(),
                reason: "service name and command are required".to_string(),
            });
        }
        Ok(())
    }
}

/// A rendered service definition and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFile {
    pub path: String,
    pub contents: String,
    pub mode: u32,
}

/// systemd unit file.
pub fn systemd_unit(service: &ServiceSpec) -> String {
    let description = service.description.as_deref().unwrap_or(&service.name);
    let mut lines = vec!["[Unit]".to_string(), format!("Description={description}")];
    if let Some(after) = service.after.as_deref().filter(|a| !a.is_empty()) {
        lines.push(format!("After={after}"));
        lines.push(format!("Wants={after}"));
    }
    lines.extend(service.extra_unit.clone());

    lines.push(String::new());
    lines.push("[Service]".to_string());
    lines.push(format!("Type={}", service.service_type));
    lines.push(format!("ExecStart={}", service.exec_start));
    if let Some(user) = &service.user {
        lines.push(format!("User={user}"));
    }
    if let Some(dir) = &service.working_directory {
        lines.push(format!("WorkingDirectory={dir}"));
    }
    for (key, value) in &service.environment {
        lines.push(format!("Environment=\"{key}={value}\""));
    }
    if let Some(file) = &service.environment_file {
        lines.push(format!("EnvironmentFile={file}"));
    }
    lines.push(format!("Restart={}", service.restart));
    lines.push(format!("RestartSec={}", service.restart_sec));
    if !service.capabilities.is_empty() {
        let ambient = service.capabilities.join(" ");
        lines.push(format!("AmbientCapabilities={ambient}"));
        lines.push(format!("CapabilityBoundingSet={ambient}"));
    }
    lines.extend(service.extra_service.clone());

    lines.push(String::new());
    lines.push("[Install]".to_string());
    lines.push("WantedBy=multi-user.target".to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// OpenRC init script, supervised when the restart policy is `always`.
pub fn openrc_script(service: &ServiceSpec) -> String {
    let name = &service.name;
    let description = service.description.as_deref().unwrap_or(name);
    let mut lines = vec![
        "#!/sbin/openrc-run".to_string(),
        String::new(),
        format!("description=\"{description}\""),
    ];

    let exec = service.exec_start.trim();
    match exec.split_once(char::is_whitespace) {
        Some((command, args)) => {
            lines.push(format!("command={command}"));
            lines.push(format!("command_args=\"{}\"", args.trim_start()));
        }
        None => lines.push(format!("command={exec}")),
    }
    lines.push("command_background=true".to_string());
    lines.push(format!("pidfile=/run/{name}.pid"));
    if let Some(user) = &service.user {
        lines.push(format!("command_user={user}"));
    }
    lines.push(format!("output_logger=\"logger -t {name} -p daemon.info\""));
    lines.push(format!("error_logger=\"logger -t {name} -p daemon.err\""));

    let mut needs = vec!["net".to_string()];
    if let Some(after) = service
        .after
        .as_deref()
        .filter(|a| !a.is_empty() && *a != DEFAULT_AFTER)
    {
        needs.push(after.replace(".target", "").replace(".service", ""));
    }
    lines.push(String::new());
    lines.push("depend() {".to_string());
    lines.push(format!("    need {}", needs.join(" ")));
    lines.push("}".to_string());

    lines.push(String::new());
    lines.push("start_pre() {".to_string());
    if let Some(file) = &service.environment_file {
        lines.push(format!("    [ -f \"{file}\" ] && . \"{file}\""));
    }
    for (key, value) in &service.environment {
        lines.push(format!("    export {key}=\"{value}\""));
    }
    if let Some(dir) = &service.working_directory {
        lines.push(format!("    cd \"{dir}\""));
    }
    if let Some(extra) = &service.extra_service {
        lines.push(format!("    {extra}"));
    }
    lines.push("    return 0".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    if service.restart == "always" {
        lines.push("supervisor=supervise-daemon".to_string());
        lines.push(String::new());
    }
    lines.join("\n")
}
