//! Process execution seam.

use crate::error::SdkError;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::thread;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Merged over the inherited environment.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an argv. Non-zero exits are returned, not raised; only a failure to
/// start the process is an error.
pub trait CommandRunner {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, SdkError>;
}

/// Download progress noise from pip, curl and friends.
fn is_progress_line(line: &str) -> bool {
    let s = line.trim();
    if s.starts_with('|') && (s.contains('%') || s.contains('\u{2588}') || s.contains('\u{25a0}')) {
        return true;
    }
    if s.contains('\u{2501}') || s.contains('\u{2578}') {
        return true;
    }
    if (s.contains("MB/s") || s.contains("kB/s")) && s.contains('/') {
        return true;
    }
    s.strip_suffix('%')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

/// Runs commands on the host with `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, SdkError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SdkError::Lifecycle("empty command".into()))?;
        debug!(command = %argv.join(" "), "Running");

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&options.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;
        // Fed from its own thread so a child that writes before it reads
        // cannot fill stdout while we block on stdin.
        let feeder = match (&options.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.clone();
                Some(thread::spawn(move || stdin.write_all(input.as_bytes())))
            }
            _ => None,
        };
        let out = child.wait_with_output()?;
        if let Some(feeder) = feeder {
            let written = feeder
                .join()
                .map_err(|_| SdkError::Lifecycle("stdin writer panicked".into()))?;
            match written {
                // The child may exit without reading all of its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        for line in output.lines() {
            if !line.trim().is_empty() && !is_progress_line(line) {
                info!("{}", line.trim());
            }
        }

        Ok(CommandOutput {
            code: out.status.code(),
            output: output.trim_end().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
struct Scripted {
    program: String,
    code: i32,
    output: String,
}

/// Records every argv and answers from a script; nothing is executed.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to a [`Provisioner`](crate::Provisioner).
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Rc<RefCell<Vec<Vec<String>>>>,
    scripted: Rc<RefCell<Vec<Scripted>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call whose program is `program` exits with `code`.
    pub fn respond(&self, program: &str, code: i32, output: &str) {
        self.scripted.borrow_mut().push(Scripted {
            program: program.to_string(),
            code,
            output: output.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Calls joined with spaces.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|argv| argv.join(" ")).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[String], _options: &RunOptions) -> Result<CommandOutput, SdkError> {
        self.calls.borrow_mut().push(argv.to_vec());
        let program = argv.first().map(String::as_str).unwrap_or_default();
        let response = self
            .scripted
            .borrow()
            .iter()
            .rev()
            .find(|s| s.program == program)
            .map(|s| CommandOutput {
                code: Some(s.code),
                output: s.output.clone(),
            });
        Ok(response.unwrap_or(CommandOutput {
            code: Some(0),
            output: String::new(),
        }))
    }
}
