//! Block regeneration core: timed regeneration tasks keyed by block, named
//! spatial regions, selection sessions, and background persistence of both.
//!
//! Everything here is driven from one thread. The host feeds block breaks and
//! ticks into a [`RegenerationScheduler`], which writes blocks back through a
//! [`BlockAccess`] implementation chosen once at startup. File I/O runs on the
//! [`PersistenceGateway`] worker and only ever sees owned snapshots.

pub mod clock;
pub mod events;
pub mod gateway;
pub mod host;
pub mod location;
pub mod material;
pub mod persistence;
pub mod preset;
pub mod region;
pub mod region_index;
pub mod scheduler;
pub mod selection;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{RegenerationEvent, RegenerationListener};
pub use gateway::{JobKind, PersistCompletion, PersistJob, PersistenceGateway, PersistenceHandle};
pub use host::{BlockAccess, BlockChange, MemoryWorld, WorldResolver};
pub use location::{BlockLocation, CornerParseError, Location, format_corner, parse_corner};
pub use material::MaterialId;
pub use persistence::{
    DataStore, LoadedRegions, LoadedTasks, PersistenceError, RegionFile, RegionRecord,
    TASK_FILE_VERSION, TaskFile, TaskRecord,
};
pub use preset::{
    Actor, ActorId, ConditionFailure, DelayRange, Preset, PresetConditions, PresetRegistry,
    PresetResolver, ReplacementPool,
};
pub use region::{RawRegion, RawRegionError, RegionError, SelectionProblem, SpatialRegion};
pub use region_index::{RegionIndex, RegionLoadReport};
pub use scheduler::{
    FireOutcome, LoadDrop, LoadReport, RegenerationScheduler, TaskError, TickReport,
};
pub use selection::{SelectionSession, SelectionStore};
pub use task::{RegenerationTask, TaskState};
