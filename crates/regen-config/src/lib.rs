//! Configuration for the block regeneration service.
//!
//! Settings persist to disk as a RON file. Every section falls back to its
//! defaults when missing, unknown fields are ignored, and a handful of values
//! can be overridden from the command line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, DelayConfig, PresetConfig, RegionConfig, SchedulerConfig, StorageConfig,
    WeightedMaterialConfig,
};
pub use error::ConfigError;
