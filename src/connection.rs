//! SSH connection parameters for a running machine
//!
//! The engine routes every machine through one local SSH proxy: the target
//! machine is selected by the login name, so the descriptor never depends on
//! per-machine attributes such as the guest IP.

use crate::config::SshSettings;
use crate::models::MachineState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    /// The machine identifier; the proxy uses it to pick the machine
    pub username: String,
    pub private_key_path: String,
    pub proxy_command: String,
    pub forward_agent: bool,
}

impl ConnectionInfo {
    /// Render an OpenSSH `Host` block
    pub fn to_ssh_config(&self, alias: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("Host {}\n", alias));
        out.push_str(&format!("  HostName {}\n", self.host));
        out.push_str(&format!("  User {}\n", self.username));
        out.push_str(&format!("  Port {}\n", self.port));
        out.push_str("  UserKnownHostsFile /dev/null\n");
        out.push_str("  StrictHostKeyChecking no\n");
        out.push_str("  PasswordAuthentication no\n");
        out.push_str(&format!("  IdentityFile {}\n", self.private_key_path));
        out.push_str("  IdentitiesOnly yes\n");
        out.push_str(&format!("  ProxyCommand {}\n", self.proxy_command));
        if self.forward_agent {
            out.push_str("  ForwardAgent yes\n");
        }
        out
    }
}

pub struct ConnectionInfoBuilder {
    settings: SshSettings,
    uid: u32,
}

impl ConnectionInfoBuilder {
    pub fn new(settings: SshSettings) -> Self {
        Self::with_uid(settings, current_uid())
    }

    pub fn with_uid(settings: SshSettings, uid: u32) -> Self {
        Self { settings, uid }
    }

    /// Descriptor for `identifier`, or `None` unless the machine is running
    pub fn build(
        &self,
        identifier: &str,
        state: MachineState,
        forward_agent: bool,
    ) -> Option<ConnectionInfo> {
        if state != MachineState::Running {
            return None;
        }

        Some(ConnectionInfo {
            host: self.settings.host.clone(),
            port: self.settings.port,
            username: identifier.to_string(),
            private_key_path: self.settings.private_key_path.clone(),
            proxy_command: self
                .settings
                .proxy_command
                .replace("{uid}", &self.uid.to_string()),
            forward_agent,
        })
    }
}

#[cfg(unix)]
pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
pub fn current_uid() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConnectionInfoBuilder {
        ConnectionInfoBuilder::with_uid(SshSettings::default(), 501)
    }

    #[test]
    fn test_running_machine_descriptor() {
        let info = builder()
            .build("vagrant-web-1a2b3c", MachineState::Running, true)
            .unwrap();

        assert_eq!(info.host, "127.0.0.1");
        assert_eq!(info.port, 32222);
        assert_eq!(info.username, "vagrant-web-1a2b3c");
        assert_eq!(info.private_key_path, "~/.orbstack/ssh/id_ed25519");
        assert!(info.proxy_command.ends_with("ssh-proxy-fdpass 501"));
        assert!(!info.proxy_command.contains("{uid}"));
        assert!(info.forward_agent);
    }

    #[test]
    fn test_not_running_is_unavailable() {
        assert_eq!(builder().build("vagrant-web-1a2b3c", MachineState::Stopped, false), None);
        assert_eq!(builder().build("vagrant-web-1a2b3c", MachineState::NotCreated, false), None);
    }

    #[test]
    fn test_shape_is_independent_of_machine() {
        let a = builder().build("vagrant-a-000001", MachineState::Running, false).unwrap();
        let b = builder().build("vagrant-b-000002", MachineState::Running, false).unwrap();
        assert_eq!(a.host, b.host);
        assert_eq!(a.port, b.port);
        assert_eq!(a.proxy_command, b.proxy_command);
        assert_ne!(a.username, b.username);
    }

    #[test]
    fn test_ssh_config_rendering() {
        let info = builder()
            .build("vagrant-web-1a2b3c", MachineState::Running, false)
            .unwrap();
        let rendered = info.to_ssh_config("default");

        assert!(rendered.starts_with("Host default\n"));
        assert!(rendered.contains("  User vagrant-web-1a2b3c\n"));
        assert!(rendered.contains("  Port 32222\n"));
        assert!(!rendered.contains("ForwardAgent"));
    }
}
