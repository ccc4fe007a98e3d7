//! OrbStack machine provider
//!
//! Drives the lifecycle of machines managed by a CLI-driven virtualization
//! engine (OrbStack's `orbctl` by default) on behalf of a Vagrant-style
//! front-end. The front-end supplies a logical machine name and a data
//! directory; the provider maps lifecycle verbs onto engine commands, keeps
//! the machine's identity and metadata on disk, and reports status.
//!
//! # Key Features
//!
//! - **Idempotent verbs** - `ensure_running` on a running machine does nothing
//! - **Short-lived status cache** - repeated status checks skip the CLI
//! - **Collision-checked names** - identifiers are verified against the engine
//! - **Readiness polling** - wait until a machine accepts SSH
//!
//! # Example
//!
//! ```no_run
//! use orb_provider::{Orchestrator, ProviderConfig};
//!
//! let config = ProviderConfig::builder()
//!     .distribution("ubuntu:noble")
//!     .build_validated()?;
//!
//! let machine = Orchestrator::new("default", ".vagrant/machines/default/orbstack", config)?;
//! machine.ensure_running()?;
//! machine.wait_for_ready()?;
//!
//! if let Some(ssh) = machine.connection_info(false)? {
//!     println!("{}", ssh.to_ssh_config("default"));
//! }
//!
//! machine.destroy()?;
//! # Ok::<(), orb_provider::Error>(())
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod readiness;
pub mod store;

pub use cache::StateCache;
pub use config::ProviderConfig;
pub use connection::ConnectionInfo;
pub use error::{Error, Result};
pub use models::{MachineMetadata, MachineState, StatusReport};
pub use orchestrator::{DestroyOutcome, Orchestrator, ReloadOutcome, UpOutcome};
