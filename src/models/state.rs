//! Machine status model

use serde::{Deserialize, Serialize};

/// Observed state of a machine. Closed set: a status query that fails is an
/// error, never a fourth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Running,
    Stopped,
    NotCreated,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineState::Running => write!(f, "running"),
            MachineState::Stopped => write!(f, "stopped"),
            MachineState::NotCreated => write!(f, "not_created"),
        }
    }
}

impl MachineState {
    /// Map the engine's free-form status string onto the closed set.
    /// Anything that exists but is not running counts as stopped.
    pub fn from_engine_status(status: &str) -> Self {
        if status.trim().eq_ignore_ascii_case("running") {
            MachineState::Running
        } else {
            MachineState::Stopped
        }
    }

    pub fn short_description(&self) -> &'static str {
        match self {
            MachineState::Running => "running",
            MachineState::Stopped => "stopped",
            MachineState::NotCreated => "not created",
        }
    }

    pub fn long_description(&self) -> &'static str {
        match self {
            MachineState::Running => {
                "The machine is running. Use `halt` to stop it or `destroy` to remove it."
            }
            MachineState::Stopped => {
                "The machine exists but is stopped. Run `up` to start it again."
            }
            MachineState::NotCreated => {
                "The machine has not been created yet. Run `up` to create it."
            }
        }
    }
}

/// What the front-end's status callback receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: MachineState,
    pub short: String,
    pub long: String,
    /// Engine identifier, absent until created
    pub identifier: Option<String>,
}

impl StatusReport {
    pub fn new(state: MachineState, identifier: Option<String>) -> Self {
        Self {
            state,
            short: state.short_description().to_string(),
            long: state.long_description().to_string(),
            identifier,
        }
    }
}
