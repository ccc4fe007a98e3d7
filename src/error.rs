//! Error types for the provider

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The engine process exited non-zero where the operation required success,
    /// or could not be spawned at all.
    #[error("`{verb}` failed for {machine}: {stderr}")]
    Execution {
        verb: String,
        machine: String,
        stderr: String,
    },

    #[error("`{verb}` timed out for {machine} after {}s", .timeout.as_secs())]
    Timeout {
        verb: String,
        machine: String,
        timeout: Duration,
    },

    #[error("Machine {machine} not ready after {}s", .waited.as_secs())]
    NotReady { machine: String, waited: Duration },

    #[error("Could not generate a unique name for '{logical_name}' after {attempts} attempts")]
    Collision { logical_name: String, attempts: u32 },

    #[error("`{verb}` refused for {machine}: {detail}")]
    Precondition {
        verb: String,
        machine: String,
        detail: String,
    },

    /// The engine step succeeded but the identity or metadata files could
    /// not be written or removed.
    #[error("Local state for {machine} not updated after `{verb}`: {detail}")]
    LocalState {
        verb: String,
        machine: String,
        detail: String,
    },

    #[error("Virtualization engine not installed: {0}")]
    EngineNotInstalled(String),

    #[error("Unreadable `{verb}` output for {machine}: {detail}")]
    Parse {
        verb: String,
        machine: String,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Failures a caller may reasonably retry later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::NotReady { .. })
    }

    /// Engine verb the failure belongs to, if any
    pub fn verb(&self) -> Option<&str> {
        match self {
            Error::Execution { verb, .. }
            | Error::Timeout { verb, .. }
            | Error::Parse { verb, .. }
            | Error::Precondition { verb, .. }
            | Error::LocalState { verb, .. } => Some(verb.as_str()),
            _ => None,
        }
    }

    /// Machine the failure belongs to, if any
    pub fn machine(&self) -> Option<&str> {
        match self {
            Error::Execution { machine, .. }
            | Error::Timeout { machine, .. }
            | Error::Parse { machine, .. }
            | Error::Precondition { machine, .. }
            | Error::LocalState { machine, .. }
            | Error::NotReady { machine, .. } => Some(machine.as_str()),
            Error::Collision { logical_name, .. } => Some(logical_name.as_str()),
            _ => None,
        }
    }
}
