//! Data models

mod metadata;
mod state;

pub use metadata::*;
pub use state::*;
