//! Engine availability probe
//!
//! Passed into the orchestrator as a capability object rather than looked up
//! globally, so tests and front-ends that already know the answer can supply
//! their own.

use crate::config::CommandTimeouts;
use crate::executor::{Executor, Invocation, ProcessExecutor, Verb};
use crate::Error;
use std::sync::OnceLock;

pub trait EngineProbe {
    /// Whether the engine CLI can be run at all
    fn is_installed(&self) -> bool;

    /// Human-readable name of what was probed, used in errors
    fn describe(&self) -> String {
        "virtualization engine".to_string()
    }
}

/// Probes by running `<binary> version` once and remembering the answer
pub struct CliProbe {
    binary: String,
    executor: Box<dyn Executor>,
    timeouts: CommandTimeouts,
    installed: OnceLock<bool>,
}

impl CliProbe {
    pub fn new(binary: impl Into<String>, timeouts: CommandTimeouts) -> Self {
        let binary = binary.into();
        Self {
            executor: Box::new(ProcessExecutor::new(binary.clone())),
            binary,
            timeouts,
            installed: OnceLock::new(),
        }
    }

    pub fn with_executor(
        binary: impl Into<String>,
        executor: Box<dyn Executor>,
        timeouts: CommandTimeouts,
    ) -> Self {
        Self {
            binary: binary.into(),
            executor,
            timeouts,
            installed: OnceLock::new(),
        }
    }

    fn probe(&self) -> bool {
        let invocation = Invocation::new(Verb::Version);
        match self
            .executor
            .execute(&invocation, Verb::Version.timeout(&self.timeouts))
        {
            // A binary that runs is installed, whatever it exits with
            Ok(_) => true,
            Err(Error::Timeout { .. }) => true,
            Err(e) => {
                tracing::debug!("engine probe for `{}` failed: {}", self.binary, e);
                false
            }
        }
    }
}

impl EngineProbe for CliProbe {
    fn is_installed(&self) -> bool {
        *self.installed.get_or_init(|| self.probe())
    }

    fn describe(&self) -> String {
        format!("`{}` was not found or could not be executed", self.binary)
    }
}

/// Probe with a fixed answer
pub struct StaticProbe(pub bool);

impl EngineProbe for StaticProbe {
    fn is_installed(&self) -> bool {
        self.0
    }
}
