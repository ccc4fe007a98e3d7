//! Provider configuration with builder pattern

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default engine CLI
pub const DEFAULT_ENGINE_BINARY: &str = "orbctl";

/// Prefix for every machine identifier this provider creates
pub const DEFAULT_NAME_PREFIX: &str = "vagrant";

pub const DEFAULT_DISTRIBUTION: &str = "ubuntu:noble";

/// Helper that hands an SSH connection to the engine's proxy for a given uid
pub const DEFAULT_PROXY_COMMAND: &str = "'/Applications/OrbStack.app/Contents/Frameworks/OrbStack Helper.app/Contents/MacOS/OrbStack Helper' ssh-proxy-fdpass {uid}";

pub const DEFAULT_PRIVATE_KEY_PATH: &str = "~/.orbstack/ssh/id_ed25519";

/// Identifiers longer than this are rejected by the engine's hostname rules
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Upper bound for any per-verb deadline and the readiness ceiling (one day)
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Upper bound for the status cache TTL
pub const MAX_CACHE_TTL_SECS: f64 = 3_600.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub engine_binary: String,
    pub name_prefix: String,
    pub distribution: String,
    pub cache_ttl_secs: f64,
    pub timeouts: CommandTimeouts,
    pub ready_poll_interval_secs: u64,
    pub ready_timeout_secs: u64,
    pub ssh: SshSettings,
}

/// Per-verb deadlines for engine invocations, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTimeouts {
    pub list_secs: u64,
    pub info_secs: u64,
    pub create_secs: u64,
    pub start_secs: u64,
    pub stop_secs: u64,
    pub delete_secs: u64,
    pub version_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub private_key_path: String,
    /// `{uid}` is replaced with the current OS user id
    pub proxy_command: String,
    pub forward_agent: bool,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            list_secs: 30,
            info_secs: 30,
            // Creation provisions and boots the guest
            create_secs: 120,
            start_secs: 60,
            stop_secs: 60,
            delete_secs: 60,
            version_secs: 30,
        }
    }
}

impl CommandTimeouts {
    fn entries(&self) -> [(&'static str, u64); 7] {
        [
            ("list_secs", self.list_secs),
            ("info_secs", self.info_secs),
            ("create_secs", self.create_secs),
            ("start_secs", self.start_secs),
            ("stop_secs", self.stop_secs),
            ("delete_secs", self.delete_secs),
            ("version_secs", self.version_secs),
        ]
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 32222,
            private_key_path: DEFAULT_PRIVATE_KEY_PATH.into(),
            proxy_command: DEFAULT_PROXY_COMMAND.into(),
            forward_agent: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            engine_binary: DEFAULT_ENGINE_BINARY.into(),
            name_prefix: DEFAULT_NAME_PREFIX.into(),
            distribution: DEFAULT_DISTRIBUTION.into(),
            cache_ttl_secs: 5.0,
            timeouts: CommandTimeouts::default(),
            ready_poll_interval_secs: 2,
            ready_timeout_secs: 120,
            ssh: SshSettings::default(),
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Load from a JSON file; missing keys fall back to defaults
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ProviderConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Status cache TTL; a value that is not a valid duration disables caching
    pub fn cache_ttl(&self) -> Duration {
        Duration::try_from_secs_f64(self.cache_ttl_secs).unwrap_or(Duration::ZERO)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ready_poll_interval_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.engine_binary.trim().is_empty() {
            return Err(crate::Error::Config("engine_binary cannot be empty".into()));
        }
        if self.name_prefix.is_empty() {
            return Err(crate::Error::Config("name_prefix cannot be empty".into()));
        }
        if crate::naming::sanitize(&self.name_prefix) != self.name_prefix {
            return Err(crate::Error::Config(format!(
                "name_prefix '{}' must be lowercase alphanumerics separated by single hyphens",
                self.name_prefix
            )));
        }
        // prefix + two separators + 6 hex chars must leave room for a name segment
        if self.name_prefix.len() + 8 >= MAX_IDENTIFIER_LEN {
            return Err(crate::Error::Config(format!(
                "name_prefix '{}' is too long",
                self.name_prefix
            )));
        }
        if self.distribution.trim().is_empty() {
            return Err(crate::Error::Config("distribution cannot be empty".into()));
        }
        if Duration::try_from_secs_f64(self.cache_ttl_secs).is_err()
            || self.cache_ttl_secs > MAX_CACHE_TTL_SECS
        {
            return Err(crate::Error::Config(format!(
                "cache_ttl_secs must be between 0 and {}",
                MAX_CACHE_TTL_SECS
            )));
        }
        for (key, secs) in self.timeouts.entries() {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(crate::Error::Config(format!(
                    "timeouts.{} must be between 1 and {}",
                    key, MAX_TIMEOUT_SECS
                )));
            }
        }
        if self.ready_poll_interval_secs == 0 {
            return Err(crate::Error::Config("ready_poll_interval_secs must be at least 1".into()));
        }
        if self.ready_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(crate::Error::Config(format!(
                "ready_timeout_secs must not exceed {}",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.ready_timeout_secs < self.ready_poll_interval_secs {
            return Err(crate::Error::Config(
                "ready_timeout_secs must not be shorter than the poll interval".into(),
            ));
        }
        if self.ssh.port == 0 {
            return Err(crate::Error::Config("ssh.port cannot be 0".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    pub fn engine_binary(mut self, binary: impl Into<String>) -> Self {
        self.config.engine_binary = binary.into();
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    pub fn distribution(mut self, distro: impl Into<String>) -> Self {
        self.config.distribution = distro.into();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_secs = ttl.as_secs_f64();
        self
    }

    pub fn timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn ready_poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.ready_poll_interval_secs = secs;
        self
    }

    pub fn ready_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ready_timeout_secs = secs;
        self
    }

    pub fn ssh_port(mut self, port: u16) -> Self {
        self.config.ssh.port = port;
        self
    }

    pub fn private_key_path(mut self, path: impl Into<String>) -> Self {
        self.config.ssh.private_key_path = path.into();
        self
    }

    pub fn proxy_command(mut self, template: impl Into<String>) -> Self {
        self.config.ssh.proxy_command = template.into();
        self
    }

    pub fn forward_agent(mut self, enabled: bool) -> Self {
        self.config.ssh.forward_agent = enabled;
        self
    }

    pub fn build(self) -> ProviderConfig {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<ProviderConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
