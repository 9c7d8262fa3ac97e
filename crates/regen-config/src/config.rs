//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Regeneration scheduling settings.
    pub scheduler: SchedulerConfig,
    /// Region index settings.
    pub regions: RegionConfig,
    /// Where pending tasks and regions are persisted.
    pub storage: StorageConfig,
    /// Regeneration presets, in priority order.
    pub presets: Vec<PresetConfig>,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Interval between autosaves in seconds (0 = disabled).
    pub autosave_interval_secs: u64,
    /// Fire overdue tasks when they are looked up instead of waiting for the next tick.
    pub lazy_expiry: bool,
    /// Persist pending tasks on shutdown so they resume after a restart.
    pub persist_on_shutdown: bool,
}

/// Region index configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionConfig {
    /// Seconds between attempts to resolve regions whose world was not loaded.
    pub reattempt_interval_secs: u64,
    /// Only regenerate blocks that lie inside a registered region.
    pub restrict_to_regions: bool,
}

/// Persistence file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the data files. The server resolves relative paths
    /// against its config directory.
    pub data_dir: PathBuf,
    /// File name for pending regeneration tasks.
    pub tasks_file: String,
    /// File name for region definitions.
    pub regions_file: String,
}

/// A single regeneration preset as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresetConfig {
    /// Unique preset name.
    pub name: String,
    /// Material that triggers this preset when broken.
    pub target_material: String,
    /// Material placed while the block is waiting to regenerate.
    pub replace_with: String,
    /// Weighted candidates the block regenerates into.
    pub regenerate_into: Vec<WeightedMaterialConfig>,
    /// Regeneration delay.
    pub delay: DelayConfig,
    /// Comma separated tool materials, e.g. `"DIAMOND_PICKAXE, IRON_PICKAXE"`.
    pub tools_required: String,
    /// Comma separated enchantments with optional level, e.g. `"FORTUNE;2, EFFICIENCY"`.
    pub enchants_required: String,
    /// Comma separated jobs with optional level, e.g. `"Miner;5"`.
    pub jobs_required: String,
}

/// One weighted replacement candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedMaterialConfig {
    /// Material name.
    pub material: String,
    /// Relative weight (0 disables the entry).
    pub weight: u32,
}

/// Regeneration delay bounds in seconds (inclusive).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    /// Minimum delay in seconds.
    pub min_secs: u64,
    /// Maximum delay in seconds.
    pub max_secs: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            autosave_interval_secs: 300,
            lazy_expiry: true,
            persist_on_shutdown: true,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            reattempt_interval_secs: 30,
            restrict_to_regions: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tasks_file: "tasks.ron".to_string(),
            regions_file: "regions.ron".to_string(),
        }
    }
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            name: "stone".to_string(),
            target_material: "STONE".to_string(),
            replace_with: "BEDROCK".to_string(),
            regenerate_into: vec![WeightedMaterialConfig {
                material: "STONE".to_string(),
                weight: 1,
            }],
            delay: DelayConfig::default(),
            tools_required: String::new(),
            enchants_required: String::new(),
            jobs_required: String::new(),
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_secs: 3,
            max_secs: 3,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path of the task file.
    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(&self.tasks_file)
    }

    /// Full path of the region file.
    pub fn regions_path(&self) -> PathBuf {
        self.data_dir.join(&self.regions_file)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let mut config = Config::default();
            config.presets.push(PresetConfig::default());
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
