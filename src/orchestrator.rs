//! Lifecycle orchestration for one logical machine
//!
//! `ensure_running` transitions:
//!
//! | observed      | action                                   | cache       |
//! |---------------|------------------------------------------|-------------|
//! | running       | nothing                                  | kept        |
//! | stopped       | `start`                                  | invalidated |
//! | not created   | new identifier, `create`, persist files  | invalidated |
//!
//! Every call runs its engine steps strictly in order on the calling thread.
//! Calls for the same machine are not serialized here; the engine rejects
//! conflicting mutations itself.

use crate::cache::StateCache;
use crate::config::ProviderConfig;
use crate::connection::{ConnectionInfo, ConnectionInfoBuilder};
use crate::engine::{validate_identifier, CliProbe, EngineCli, EngineProbe};
use crate::executor::{Executor, ProcessExecutor, Verb};
use crate::models::{MachineMetadata, MachineState, StatusReport};
use crate::naming::{NameGenerator, SuffixSource};
use crate::readiness::{ReadinessPoller, Sleeper};
use crate::store::MachineStore;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Status cache shared between orchestrators, keyed by machine identifier
pub type SharedStateCache = Arc<StateCache<String, MachineState>>;

/// Result of [`Orchestrator::ensure_running`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpOutcome {
    AlreadyRunning { identifier: String },
    Resumed { identifier: String },
    Created { identifier: String },
}

impl UpOutcome {
    pub fn identifier(&self) -> &str {
        match self {
            UpOutcome::AlreadyRunning { identifier }
            | UpOutcome::Resumed { identifier }
            | UpOutcome::Created { identifier } => identifier,
        }
    }

    /// Whether the engine was asked to change anything
    pub fn mutated(&self) -> bool {
        !matches!(self, UpOutcome::AlreadyRunning { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// No identity on disk; nothing was done
    AlreadyDestroyed,
    Destroyed {
        identifier: String,
        /// False when the engine's delete failed and only local state was removed
        remote_deleted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub up: UpOutcome,
    /// Passed through so the front-end knows to run its provisioners
    pub provision: bool,
}

pub struct Orchestrator {
    logical_name: String,
    config: ProviderConfig,
    engine: EngineCli,
    probe: Box<dyn EngineProbe>,
    probe_injected: bool,
    store: MachineStore,
    cache: SharedStateCache,
    names: NameGenerator,
    poller: ReadinessPoller,
    connections: ConnectionInfoBuilder,
}

impl Orchestrator {
    /// Orchestrator for `logical_name`, storing its files under `data_dir`
    pub fn new(
        logical_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        config: ProviderConfig,
    ) -> Result<Self> {
        config.validate()?;

        let executor = ProcessExecutor::new(config.engine_binary.clone());
        Ok(Self {
            logical_name: logical_name.into(),
            engine: EngineCli::new(Box::new(executor), config.timeouts.clone()),
            probe: Box::new(CliProbe::new(
                config.engine_binary.clone(),
                config.timeouts.clone(),
            )),
            probe_injected: false,
            store: MachineStore::new(data_dir),
            cache: Arc::new(StateCache::new(config.cache_ttl())),
            names: NameGenerator::new(config.name_prefix.clone()),
            poller: ReadinessPoller::new(config.ready_poll_interval(), config.ready_timeout()),
            connections: ConnectionInfoBuilder::new(config.ssh.clone()),
            config,
        })
    }

    /// Route every engine invocation through `executor`. Unless a probe was
    /// supplied with [`Orchestrator::with_probe`], the availability check
    /// runs `version` through the same executor.
    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        let shared: Arc<dyn Executor> = Arc::from(executor);
        self.engine = EngineCli::new(Box::new(shared.clone()), self.config.timeouts.clone());
        if !self.probe_injected {
            self.probe = Box::new(CliProbe::with_executor(
                self.config.engine_binary.clone(),
                Box::new(shared),
                self.config.timeouts.clone(),
            ));
        }
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn EngineProbe>) -> Self {
        self.probe = probe;
        self.probe_injected = true;
        self
    }

    pub fn with_cache(mut self, cache: SharedStateCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_suffix_source(mut self, suffixes: Box<dyn SuffixSource>) -> Self {
        self.names = NameGenerator::with_suffix_source(self.config.name_prefix.clone(), suffixes);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.poller = ReadinessPoller::with_sleeper(
            self.config.ready_poll_interval(),
            self.config.ready_timeout(),
            sleeper,
        );
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.connections = ConnectionInfoBuilder::with_uid(self.config.ssh.clone(), uid);
        self
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn engine(&self) -> &EngineCli {
        &self.engine
    }

    /// Persisted engine identifier, if the machine was created
    pub fn identifier(&self) -> Result<Option<String>> {
        self.store.read_identity()
    }

    pub fn metadata(&self) -> Result<Option<MachineMetadata>> {
        self.store.read_metadata()
    }

    /// Current state; no engine call when nothing was ever created
    pub fn status(&self) -> Result<MachineState> {
        match self.identifier()? {
            Some(id) => self.observe(&id),
            None => Ok(MachineState::NotCreated),
        }
    }

    pub fn status_report(&self) -> Result<StatusReport> {
        let identifier = self.identifier()?;
        let state = match &identifier {
            Some(id) => self.observe(id)?,
            None => MachineState::NotCreated,
        };
        Ok(StatusReport::new(state, identifier))
    }

    pub fn ensure_running(&self) -> Result<UpOutcome> {
        self.require_engine()?;

        let identity = self.identifier()?;
        let state = match &identity {
            Some(id) => self.observe(id)?,
            None => MachineState::NotCreated,
        };

        match (identity, state) {
            (Some(identifier), MachineState::Running) => {
                tracing::info!("{} is already running", identifier);
                Ok(UpOutcome::AlreadyRunning { identifier })
            }
            (Some(identifier), MachineState::Stopped) => {
                tracing::info!("Starting {}", identifier);
                self.engine.start(&identifier)?;
                self.cache.invalidate(&identifier);
                Ok(UpOutcome::Resumed { identifier })
            }
            (stale, _) => self.create(stale.as_deref()),
        }
    }

    fn create(&self, stale_identity: Option<&str>) -> Result<UpOutcome> {
        if let Some(stale) = stale_identity {
            tracing::warn!(
                "{} is recorded for '{}' but unknown to the engine, creating a new machine",
                stale,
                self.logical_name
            );
        }

        let identifier = self.names.generate(&self.logical_name, &self.engine)?;
        tracing::info!(
            "Creating {} for '{}' from {}",
            identifier,
            self.logical_name,
            self.config.distribution
        );
        self.engine.create(&self.config.distribution, &identifier)?;

        // Only reached when the engine confirmed creation
        let metadata = MachineMetadata::new(identifier.clone(), self.config.distribution.clone());
        if let Err(e) = self.store.record_creation(&metadata) {
            tracing::error!(
                "{} was created but could not be recorded under {}; delete it with `{} delete {}`: {}",
                identifier,
                self.store.dir().display(),
                self.config.engine_binary,
                identifier,
                e
            );
            return Err(Error::LocalState {
                verb: Verb::Create.to_string(),
                machine: identifier,
                detail: e.to_string(),
            });
        }

        if let Some(stale) = stale_identity {
            self.cache.invalidate(stale);
        }
        self.cache.invalidate(&identifier);

        Ok(UpOutcome::Created { identifier })
    }

    /// Stop the machine. The engine's stop is idempotent, so it is issued
    /// whatever the last observed state; the cache only changes on success.
    pub fn ensure_stopped(&self) -> Result<()> {
        self.require_engine()?;
        let identifier = self.require_identity(Verb::Stop)?;

        tracing::info!("Stopping {}", identifier);
        self.engine.stop(&identifier)?;
        self.cache.invalidate(&identifier);
        Ok(())
    }

    /// Delete the machine and forget it. The engine-side delete is
    /// best-effort: any failure there is logged and local state is removed anyway.
    pub fn destroy(&self) -> Result<DestroyOutcome> {
        let identifier = match self.identifier()? {
            Some(id) => id,
            None => {
                tracing::info!("'{}' has no machine, nothing to destroy", self.logical_name);
                return Ok(DestroyOutcome::AlreadyDestroyed);
            }
        };

        tracing::info!("Destroying {}", identifier);
        let remote_deleted = match self.engine.delete(&identifier) {
            Ok(output) if output.success => true,
            Ok(output) => {
                tracing::warn!(
                    "delete of {} exited {:?}, removing local state anyway: {}",
                    identifier,
                    output.exit_code,
                    output.stderr.trim()
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    "delete of {} failed, removing local state anyway: {}",
                    identifier,
                    e
                );
                false
            }
        };

        self.cache.invalidate(&identifier);
        if let Err(e) = self.store.clear() {
            tracing::warn!("local state for {} not fully removed: {}", identifier, e);
        }

        Ok(DestroyOutcome::Destroyed {
            identifier,
            remote_deleted,
        })
    }

    /// Halt, then bring back up. A failed halt skips the start; a failed
    /// start leaves the machine stopped.
    pub fn reload(&self, provision: bool) -> Result<ReloadOutcome> {
        self.ensure_stopped()?;
        let up = self.ensure_running()?;
        Ok(ReloadOutcome { up, provision })
    }

    /// SSH parameters, or `None` while the machine is not running
    pub fn connection_info(&self, forward_agent: bool) -> Result<Option<ConnectionInfo>> {
        let identifier = match self.identifier()? {
            Some(id) => id,
            None => return Ok(None),
        };
        let state = self.observe(&identifier)?;
        Ok(self.connections.build(&identifier, state, forward_agent))
    }

    /// Block until the engine reports the machine running
    pub fn wait_for_ready(&self) -> Result<bool> {
        self.require_engine()?;
        let identifier = self.require_identity(Verb::Info)?;

        let ready = self.poller.wait_for_ready(&identifier, &self.engine)?;
        self.cache.set(identifier, MachineState::Running);
        Ok(ready)
    }

    fn observe(&self, identifier: &str) -> Result<MachineState> {
        if let Some(state) = self.cache.get(identifier) {
            tracing::trace!("{} state {} (cached)", identifier, state);
            return Ok(state);
        }

        self.require_engine()?;
        validate_identifier(Verb::List, identifier)?;

        let state = match self.engine.find(identifier)? {
            Some(machine) => machine.state(),
            None => MachineState::NotCreated,
        };
        tracing::debug!("{} state {}", identifier, state);
        self.cache.set(identifier.to_string(), state);
        Ok(state)
    }

    fn require_engine(&self) -> Result<()> {
        if self.probe.is_installed() {
            Ok(())
        } else {
            Err(Error::EngineNotInstalled(self.probe.describe()))
        }
    }

    fn require_identity(&self, verb: Verb) -> Result<String> {
        self.identifier()?.ok_or_else(|| Error::Precondition {
            verb: verb.to_string(),
            machine: self.logical_name.clone(),
            detail: format!("machine '{}' has not been created", self.logical_name),
        })
    }
}
