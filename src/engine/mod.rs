//! Engine CLI access: typed verbs and availability probing

pub mod commands;
pub mod probe;

pub use commands::{validate_identifier, EngineCli, MachineInfo, MachineListing};
pub use probe::{CliProbe, EngineProbe, StaticProbe};
