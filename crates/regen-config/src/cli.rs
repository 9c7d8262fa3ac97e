//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Application directory name under the OS configuration directory.
const APP_NAME: &str = "regen";

/// Block regeneration server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "regen-server", about = "Block regeneration service")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for persisted tasks and regions.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Scheduler tick interval in milliseconds.
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Autosave interval in seconds (0 disables autosave).
    #[arg(long)]
    pub autosave_secs: Option<u64>,

    /// Stop after running this many seconds (runs until killed when absent).
    #[arg(long)]
    pub run_secs: Option<u64>,
}

impl CliArgs {
    /// The config directory to use: `--config` if given, else the OS default.
    pub fn config_dir(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_dir)
    }
}

impl Config {
    /// Default config directory, `<os config dir>/regen`, or `./regen` when the
    /// OS exposes none.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
    }

    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(ms) = args.tick_ms {
            self.scheduler.tick_interval_ms = ms;
        }
        if let Some(secs) = args.autosave_secs {
            self.scheduler.autosave_interval_secs = secs;
        }
    }
}
