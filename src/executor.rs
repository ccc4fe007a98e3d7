//! Bounded execution of the engine CLI
//!
//! Every engine interaction goes through [`Executor::execute`]. The caller
//! builds the full argument list; nothing is passed through a shell and no
//! escaping happens here, so dynamic segments must be validated upstream.
//!
//! Failure split:
//! - the process could not be spawned: [`Error::Execution`] is raised
//! - the deadline passed: the child is killed and [`Error::Timeout`] is raised
//! - the process exited non-zero: returned as `success == false`, the caller
//!   decides whether that is an error for its operation

use crate::config::CommandTimeouts;
use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine verbs this provider issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    List,
    Info,
    Create,
    Start,
    Stop,
    Delete,
    Version,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::List => "list",
            Verb::Info => "info",
            Verb::Create => "create",
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Delete => "delete",
            Verb::Version => "version",
        }
    }

    /// Deadline for this verb under the given timeout settings
    pub fn timeout(&self, timeouts: &CommandTimeouts) -> Duration {
        let secs = match self {
            Verb::List => timeouts.list_secs,
            Verb::Info => timeouts.info_secs,
            Verb::Create => timeouts.create_secs,
            Verb::Start => timeouts.start_secs,
            Verb::Stop => timeouts.stop_secs,
            Verb::Delete => timeouts.delete_secs,
            Verb::Version => timeouts.version_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout(&CommandTimeouts::default())
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One engine command line: `<binary> <verb> [args]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verb: Verb,
    /// Machine the command concerns; carried into errors, not onto the command line
    pub machine: Option<String>,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            machine: None,
            args: Vec::new(),
        }
    }

    pub fn machine(mut self, name: impl Into<String>) -> Self {
        self.machine = Some(name.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Arguments as handed to the process, verb first
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.verb.as_str().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Name used in logs and errors when no machine is involved
    pub fn target(&self) -> &str {
        self.machine.as_deref().unwrap_or("engine")
    }
}

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code: Some(exit_code),
        }
    }

    /// Turn a non-zero exit into the error the caller raises for it
    pub fn into_error(self, invocation: &Invocation) -> Error {
        let stderr = if self.stderr.trim().is_empty() {
            format!("exit code {:?}: {}", self.exit_code, self.stdout.trim())
        } else {
            self.stderr.trim().to_string()
        };
        Error::Execution {
            verb: invocation.verb.to_string(),
            machine: invocation.target().to_string(),
            stderr,
        }
    }
}

/// Seam between the provider and the engine process
#[cfg_attr(test, mockall::automock)]
pub trait Executor {
    fn execute(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput> {
        (**self).execute(invocation, timeout)
    }
}

/// Runs the engine as a child process, blocking the calling thread
pub struct ProcessExecutor {
    binary: String,
    leading_args: Vec<String>,
    poll_interval: Duration,
}

impl ProcessExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Arguments placed before the verb, for wrappers like `sh -c <script> <name>`
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Executor for ProcessExecutor {
    fn execute(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput> {
        let argv = invocation.argv();
        tracing::debug!(
            binary = %self.binary,
            args = ?argv,
            timeout_secs = timeout.as_secs(),
            "invoking engine"
        );

        // Output goes to unlinked temp files so a chatty child never blocks
        // on a full pipe while we poll for the deadline.
        let mut stdout_file = tempfile::tempfile()?;
        let mut stderr_file = tempfile::tempfile()?;

        let mut child = Command::new(&self.binary)
            .args(&self.leading_args)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .map_err(|e| Error::Execution {
                verb: invocation.verb.to_string(),
                machine: invocation.target().to_string(),
                stderr: format!("failed to spawn `{}`: {}", self.binary, e),
            })?;

        let started = Instant::now();
        // A timeout too large to represent means no deadline at all
        let deadline = started.checked_add(timeout);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(now),
                None => self.poll_interval,
            };
            if remaining.is_zero() {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    verb = %invocation.verb,
                    machine = invocation.target(),
                    "engine command exceeded {}s, killed",
                    timeout.as_secs()
                );
                return Err(Error::Timeout {
                    verb: invocation.verb.to_string(),
                    machine: invocation.target().to_string(),
                    timeout,
                });
            }
            std::thread::sleep(self.poll_interval.min(remaining));
        };

        let output = CommandOutput {
            stdout: read_captured(&mut stdout_file)?,
            stderr: read_captured(&mut stderr_file)?,
            success: status.success(),
            exit_code: status.code(),
        };

        if output.success {
            tracing::debug!(
                verb = %invocation.verb,
                machine = invocation.target(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "engine command succeeded"
            );
        } else {
            tracing::debug!(
                verb = %invocation.verb,
                machine = invocation.target(),
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "engine command exited non-zero"
            );
        }

        Ok(output)
    }
}

fn read_captured(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
