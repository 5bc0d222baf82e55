//! Configuration management for parmap
//!
//! Engine defaults are embedded from `default-config.toml` and layered with
//! user, project and explicit config files plus `PARMAP_` environment
//! variables through figment.

pub mod core;
pub mod smart_load;

pub use self::core::{EngineConfig, ParmapConfig};
