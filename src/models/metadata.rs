//! Metadata persisted alongside a machine identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layout version of the metadata record
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Written once when the engine confirms creation, never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
    /// Engine identifier of the machine
    pub machine_name: String,
    /// Distribution image the machine was created from
    pub distribution: String,
    /// Creation time (RFC 3339)
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    /// Version of this provider that created the machine
    pub provider_version: String,
}

impl MachineMetadata {
    pub fn new(machine_name: impl Into<String>, distribution: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            distribution: distribution.into(),
            created_at: Utc::now(),
            schema_version: METADATA_SCHEMA_VERSION,
            provider_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
