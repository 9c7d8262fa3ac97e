//! On-disk formats for pending tasks and regions, and the synchronous store
//! that reads and writes them.
//!
//! Both files are RON. Writes go to a temporary sibling first and are renamed
//! into place, so a crash mid-write leaves the previous file intact. Both
//! files are parsed one record at a time: a record that fails to decode is
//! skipped and counted instead of failing the whole load.

use std::io;
use std::path::{Path, PathBuf};

use regen_config::StorageConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::location::BlockLocation;
use crate::material::MaterialId;

/// Current task file format version.
pub const TASK_FILE_VERSION: u32 = 1;

/// Errors from reading or writing persisted state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading, writing or renaming a file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid RON for its format.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: ron::error::SpannedError,
    },
    /// Serializing the in-memory state failed.
    #[error("failed to serialize: {0}")]
    Serialize(#[from] ron::Error),
    /// The background persistence worker is no longer running.
    #[error("persistence worker has shut down")]
    WorkerGone,
}

// ---------------------------------------------------------------------------
// Task records
// ---------------------------------------------------------------------------

/// One pending regeneration as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// World name.
    pub world: String,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
    /// Preset name.
    pub preset: String,
    /// Material the block had before it was broken.
    pub original: MaterialId,
    /// Material the block regenerates into.
    pub replacement: MaterialId,
    /// Countdown left at save time.
    pub remaining_ms: i64,
    /// Wall-clock time the task would have fired at, had the process kept running.
    pub deadline_epoch_ms: i64,
    /// Region the block was broken in.
    #[serde(default)]
    pub region: Option<String>,
}

impl TaskRecord {
    /// The block this record refers to.
    pub fn location(&self) -> BlockLocation {
        BlockLocation::new(self.world.clone(), self.x, self.y, self.z)
    }
}

/// The task file as written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at_epoch_ms: i64,
    /// Pending tasks.
    pub tasks: Vec<TaskRecord>,
}

impl TaskFile {
    /// Wraps a snapshot in the current format version.
    pub fn new(saved_at_epoch_ms: i64, tasks: Vec<TaskRecord>) -> Self {
        Self {
            version: TASK_FILE_VERSION,
            saved_at_epoch_ms,
            tasks,
        }
    }
}

/// The task file as read: records are decoded individually afterwards.
#[derive(Deserialize)]
struct LenientTaskFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    tasks: Vec<ron::Value>,
}

/// Result of loading the task file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedTasks {
    /// Records that decoded.
    pub records: Vec<TaskRecord>,
    /// Records that were skipped as corrupt.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Region records
// ---------------------------------------------------------------------------

/// One region as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Region name.
    pub name: String,
    /// Minimum corner, `world,x,y,z`.
    pub min: String,
    /// Maximum corner, `world,x,y,z`.
    pub max: String,
    /// Set for regions that were unresolved when saved and should be retried.
    #[serde(default)]
    pub reattempt: bool,
}

/// The region file: regions in registration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFile {
    /// Resolved and unresolved regions.
    #[serde(default)]
    pub regions: Vec<RegionRecord>,
}

#[derive(Deserialize)]
struct LenientRegionFile {
    #[serde(default)]
    regions: Vec<ron::Value>,
}

/// Result of loading the region file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadedRegions {
    /// Records that decoded, in file order.
    pub file: RegionFile,
    /// Records that were skipped as corrupt.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Synchronous file access for the task and region files.
#[derive(Clone, Debug)]
pub struct DataStore {
    tasks_path: PathBuf,
    regions_path: PathBuf,
}

impl DataStore {
    /// Creates a store over explicit file paths.
    pub fn new(tasks_path: impl Into<PathBuf>, regions_path: impl Into<PathBuf>) -> Self {
        Self {
            tasks_path: tasks_path.into(),
            regions_path: regions_path.into(),
        }
    }

    /// Creates a store from the storage config section.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.tasks_path(), config.regions_path())
    }

    /// Path of the task file.
    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    /// Path of the region file.
    pub fn regions_path(&self) -> &Path {
        &self.regions_path
    }

    /// Writes the task file, returning the number of records written.
    pub fn save_tasks(&self, file: &TaskFile) -> Result<usize, PersistenceError> {
        let serialized = ron::ser::to_string_pretty(file, pretty())?;
        write_atomic(&self.tasks_path, &serialized)?;
        debug!(count = file.tasks.len(), path = %self.tasks_path.display(), "wrote task file");
        Ok(file.tasks.len())
    }

    /// Reads the task file. A missing file loads as empty.
    pub fn load_tasks(&self) -> Result<LoadedTasks, PersistenceError> {
        let Some(contents) = read_optional(&self.tasks_path)? else {
            return Ok(LoadedTasks::default());
        };

        let file: LenientTaskFile =
            ron::from_str(&contents).map_err(|source| PersistenceError::Parse {
                path: self.tasks_path.clone(),
                source,
            })?;

        if file.version > TASK_FILE_VERSION {
            warn!(
                version = file.version,
                supported = TASK_FILE_VERSION,
                "task file is newer than this build, reading what is recognized"
            );
        }

        let (records, skipped) = decode_records::<TaskRecord>(file.tasks, "task");
        Ok(LoadedTasks { records, skipped })
    }

    /// Writes the region file, returning the number of regions written.
    pub fn save_regions(&self, file: &RegionFile) -> Result<usize, PersistenceError> {
        let serialized = ron::ser::to_string_pretty(file, pretty())?;
        write_atomic(&self.regions_path, &serialized)?;
        debug!(count = file.regions.len(), path = %self.regions_path.display(), "wrote region file");
        Ok(file.regions.len())
    }

    /// Reads the region file. A missing file loads as empty.
    pub fn load_regions(&self) -> Result<LoadedRegions, PersistenceError> {
        let Some(contents) = read_optional(&self.regions_path)? else {
            return Ok(LoadedRegions::default());
        };

        let file: LenientRegionFile =
            ron::from_str(&contents).map_err(|source| PersistenceError::Parse {
                path: self.regions_path.clone(),
                source,
            })?;

        let (regions, skipped) = decode_records::<RegionRecord>(file.regions, "region");
        Ok(LoadedRegions {
            file: RegionFile { regions },
            skipped,
        })
    }
}

fn decode_records<T: DeserializeOwned>(
    values: Vec<ron::Value>,
    kind: &str,
) -> (Vec<T>, usize) {
    let mut records = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (index, value) in values.into_iter().enumerate() {
        match value.into_rust::<T>() {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(index, error = %e, "skipping corrupt {kind} record");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

fn pretty() -> ron::ser::PrettyConfig {
    ron::ser::PrettyConfig::new()
        .depth_limit(3)
        .enumerate_arrays(false)
}

fn read_optional(path: &Path) -> Result<Option<String>, PersistenceError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> DataStore {
        DataStore::new(dir.join("tasks.ron"), dir.join("regions.ron"))
    }

    fn record(x: i32, region: Option<&str>) -> TaskRecord {
        TaskRecord {
            world: "world".to_string(),
            x,
            y: 64,
            z: -3,
            preset: "stone".to_string(),
            original: MaterialId::new("STONE"),
            replacement: MaterialId::new("STONE"),
            remaining_ms: 2_500,
            deadline_epoch_ms: 1_000_000,
            region: region.map(str::to_string),
        }
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.load_tasks().unwrap(), LoadedTasks::default());
        assert_eq!(store.load_regions().unwrap(), LoadedRegions::default());
    }

    #[test]
    fn test_tasks_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let file = TaskFile::new(42, vec![record(1, None), record(2, Some("mine"))]);

        assert_eq!(store.save_tasks(&file).unwrap(), 2);
        let loaded = store.load_tasks().unwrap();
        assert_eq!(loaded.records, file.tasks);
        assert_eq!(loaded.skipped, 0);
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let good = ron::to_string(&record(7, None)).unwrap();
        let contents = format!(
            "(version: 1, saved_at_epoch_ms: 0, tasks: [{good}, (world: \"world\", x: \"oops\")])"
        );
        std::fs::write(store.tasks_path(), contents).unwrap();

        let loaded = store.load_tasks().unwrap();
        assert_eq!(loaded.records, vec![record(7, None)]);
        assert_eq!(loaded.skipped, 1);
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.tasks_path(), "{{ not ron").unwrap();
        assert!(matches!(
            store.load_tasks(),
            Err(PersistenceError::Parse { .. })
        ));
    }

    #[test]
    fn test_regions_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let file = RegionFile {
            regions: vec![
                RegionRecord {
                    name: "zeta".to_string(),
                    min: "world,0,0,0".to_string(),
                    max: "world,5,5,5".to_string(),
                    reattempt: false,
                },
                RegionRecord {
                    name: "alpha".to_string(),
                    min: "nether,0,0,0".to_string(),
                    max: "nether,1,1,1".to_string(),
                    reattempt: true,
                },
            ],
        };
        store.save_regions(&file).unwrap();
        assert_eq!(store.load_regions().unwrap().file, file);
    }

    #[test]
    fn test_corrupt_region_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(
            store.regions_path(),
            r#"(regions: [
                (name: "quarry", min: "world,0,0,0", max: "world,9,9,9"),
                (name: "broken", min: 5, max: "world,1,1,1"),
                (name: "pit", min: "world,20,0,0", max: "world,25,5,5", reattempt: true),
            ])"#,
        )
        .unwrap();

        let loaded = store.load_regions().unwrap();
        assert_eq!(loaded.skipped, 1);
        let names: Vec<&str> = loaded.file.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["quarry", "pit"]);
        assert!(loaded.file.regions[1].reattempt);
    }

    #[test]
    fn test_save_creates_parent_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = store(&nested);
        store.save_tasks(&TaskFile::new(0, Vec::new())).unwrap();
        assert!(store.tasks_path().exists());
        assert!(!nested.join("tasks.ron.tmp").exists());
    }
}
