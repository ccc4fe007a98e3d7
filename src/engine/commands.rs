//! Typed wrappers around the engine CLI verbs

use crate::config::CommandTimeouts;
use crate::executor::{CommandOutput, Executor, Invocation, Verb};
use crate::models::MachineState;
use crate::naming::CollisionSet;
use crate::readiness::MachineInfoSource;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineListing {
    pub name: String,
    #[serde(default, alias = "state")]
    pub status: Option<String>,
}

impl MachineListing {
    pub fn state(&self) -> MachineState {
        match self.status.as_deref() {
            Some(status) => MachineState::from_engine_status(status),
            None => MachineState::Stopped,
        }
    }
}

/// Output of `info <name>`, reduced to the fields this provider reads.
/// Unknown fields are ignored and missing ones default to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "state")]
    pub status: Option<String>,
}

impl MachineInfo {
    pub fn is_running(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("running"))
            .unwrap_or(false)
    }
}

// Some engine versions nest the machine under `record`
#[derive(Deserialize)]
struct InfoDocument {
    #[serde(flatten)]
    top: MachineInfo,
    #[serde(default)]
    record: Option<MachineInfo>,
}

/// Engine operations, one method per CLI verb
pub struct EngineCli {
    executor: Box<dyn Executor>,
    timeouts: CommandTimeouts,
}

impl EngineCli {
    pub fn new(executor: Box<dyn Executor>, timeouts: CommandTimeouts) -> Self {
        Self { executor, timeouts }
    }

    fn run(&self, invocation: Invocation) -> Result<(Invocation, CommandOutput)> {
        let timeout = invocation.verb.timeout(&self.timeouts);
        let output = self.executor.execute(&invocation, timeout)?;
        Ok((invocation, output))
    }

    /// Run a verb that must exit zero
    fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput> {
        let (invocation, output) = self.run(invocation)?;
        if output.success {
            Ok(output)
        } else {
            Err(output.into_error(&invocation))
        }
    }

    /// All machines the engine knows about
    pub fn list(&self) -> Result<Vec<MachineListing>> {
        let output = self.run_checked(Invocation::new(Verb::List).arg("--format").arg("json"))?;
        parse_listing(&output.stdout)
    }

    /// Listing entry for one machine, if the engine knows it
    pub fn find(&self, name: &str) -> Result<Option<MachineListing>> {
        Ok(self.list()?.into_iter().find(|m| m.name == name))
    }

    /// Detail for one machine; `None` when the engine does not (yet) know it
    pub fn info(&self, name: &str) -> Result<Option<MachineInfo>> {
        validate_identifier(Verb::Info, name)?;
        let (invocation, output) = self.run(
            Invocation::new(Verb::Info)
                .machine(name)
                .arg(name)
                .arg("--format")
                .arg("json"),
        )?;

        if !output.success {
            if reports_missing(&output) {
                return Ok(None);
            }
            return Err(output.into_error(&invocation));
        }

        parse_info(&output.stdout).map_err(|detail| Error::Parse {
            verb: Verb::Info.to_string(),
            machine: name.to_string(),
            detail,
        })
    }

    pub fn create(&self, distribution: &str, name: &str) -> Result<()> {
        validate_distribution(distribution, name)?;
        validate_identifier(Verb::Create, name)?;
        self.run_checked(
            Invocation::new(Verb::Create)
                .machine(name)
                .arg(distribution)
                .arg(name),
        )?;
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<()> {
        validate_identifier(Verb::Start, name)?;
        self.run_checked(Invocation::new(Verb::Start).machine(name).arg(name))?;
        Ok(())
    }

    /// Stop a machine; the engine treats stopping a stopped machine as success
    pub fn stop(&self, name: &str) -> Result<()> {
        validate_identifier(Verb::Stop, name)?;
        self.run_checked(Invocation::new(Verb::Stop).machine(name).arg(name))?;
        Ok(())
    }

    /// Delete a machine. A non-zero exit is returned, not raised: callers
    /// deciding how much to care (destroy is best-effort) inspect it.
    pub fn delete(&self, name: &str) -> Result<CommandOutput> {
        validate_identifier(Verb::Delete, name)?;
        let (_, output) = self.run(
            Invocation::new(Verb::Delete)
                .machine(name)
                .arg("--force")
                .arg(name),
        )?;
        Ok(output)
    }

    pub fn version(&self) -> Result<CommandOutput> {
        let (_, output) = self.run(Invocation::new(Verb::Version))?;
        Ok(output)
    }
}

impl CollisionSet for EngineCli {
    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|m| m.name == name))
    }
}

impl MachineInfoSource for EngineCli {
    fn machine_info(&self, name: &str) -> Result<Option<MachineInfo>> {
        self.info(name)
    }
}

/// Identifiers reach the command line unquoted, so only the characters the
/// name generator produces are accepted.
pub fn validate_identifier(verb: Verb, name: &str) -> Result<()> {
    let refuse = |detail: String| Error::Precondition {
        verb: verb.to_string(),
        machine: name.to_string(),
        detail,
    };
    if name.is_empty() {
        return Err(refuse("machine identifier is empty".into()));
    }
    if name.len() > crate::config::MAX_IDENTIFIER_LEN {
        return Err(refuse(format!(
            "machine identifier exceeds {} characters",
            crate::config::MAX_IDENTIFIER_LEN
        )));
    }
    if name.starts_with('-')
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(refuse("machine identifier contains unsupported characters".into()));
    }
    Ok(())
}

fn validate_distribution(distro: &str, name: &str) -> Result<()> {
    let valid = !distro.is_empty()
        && !distro.starts_with('-')
        && distro
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-' | '/'));
    if valid {
        Ok(())
    } else {
        Err(Error::Precondition {
            verb: Verb::Create.to_string(),
            machine: name.to_string(),
            detail: format!("invalid distribution '{}'", distro),
        })
    }
}

fn reports_missing(output: &CommandOutput) -> bool {
    let text = format!("{} {}", output.stderr, output.stdout).to_lowercase();
    text.contains("not found") || text.contains("does not exist") || text.contains("doesn't exist")
}

fn parse_listing(stdout: &str) -> Result<Vec<MachineListing>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(vec![]);
    }

    serde_json::from_str(trimmed).map_err(|e| Error::Parse {
        verb: Verb::List.to_string(),
        machine: "engine".into(),
        detail: e.to_string(),
    })
}

fn parse_info(stdout: &str) -> std::result::Result<Option<MachineInfo>, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }

    let doc: InfoDocument = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
    Ok(Some(doc.record.unwrap_or(doc.top)))
}
