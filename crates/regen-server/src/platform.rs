//! Directory layout for a server instance.
//!
//! Everything an instance writes lives under its config directory unless the
//! config points storage somewhere absolute, so `--config <dir>` is enough to
//! run several independent instances side by side.

use std::io;
use std::path::{Path, PathBuf};

use regen_config::StorageConfig;

/// Resolved directories for one server instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Holds the task and region files.
    pub data_dir: PathBuf,
    /// Holds log files.
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// Resolves directories without creating them.
    ///
    /// A relative `storage.data_dir` is taken relative to `config_dir`.
    pub fn resolve(config_dir: &Path, storage: &StorageConfig) -> Self {
        let data_dir = if storage.data_dir.is_absolute() {
            storage.data_dir.clone()
        } else {
            config_dir.join(&storage.data_dir)
        };
        Self {
            config_dir: config_dir.to_path_buf(),
            data_dir,
            log_dir: config_dir.join("logs"),
        }
    }

    /// Creates every directory on disk.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from directory creation.
    pub fn create_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_data_dir_is_under_config() {
        let storage = StorageConfig::default();
        let dirs = PlatformDirs::resolve(Path::new("/srv/regen"), &storage);
        assert_eq!(dirs.data_dir, Path::new("/srv/regen").join("data"));
        assert_eq!(dirs.log_dir, Path::new("/srv/regen").join("logs"));
    }

    #[test]
    fn test_absolute_data_dir_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_dir: tmp.path().join("elsewhere"),
            ..Default::default()
        };
        let dirs = PlatformDirs::resolve(&tmp.path().join("cfg"), &storage);
        assert_eq!(dirs.data_dir, tmp.path().join("elsewhere"));
    }

    #[test]
    fn test_create_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = PlatformDirs::resolve(&tmp.path().join("instance"), &StorageConfig::default());
        dirs.create_dirs().unwrap();
        assert!(dirs.config_dir.exists());
        assert!(dirs.data_dir.exists());
        assert!(dirs.log_dir.exists());
    }
}
