//! The live set of pending regenerations.
//!
//! [`RegenerationScheduler`] owns every [`RegenerationTask`], keyed by block
//! location, and is the only thing that writes regenerated blocks back into
//! the host. It is driven from a single thread: the host's tick loop calls
//! [`tick`](RegenerationScheduler::tick), block-break handlers call
//! [`create`](RegenerationScheduler::create) and
//! [`register`](RegenerationScheduler::register), and persistence goes through
//! immutable snapshots handed to the background gateway.
//!
//! At most one task exists per block. A second `register` for an occupied
//! block is a silent no-op; callers that want to replace a task remove it
//! first.

use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::{RegenerationEvent, RegenerationListener};
use crate::gateway::{PersistJob, PersistenceHandle};
use crate::host::BlockAccess;
use crate::location::{BlockLocation, Location};
use crate::material::MaterialId;
use crate::persistence::{PersistenceError, TaskFile, TaskRecord};
use crate::preset::{Preset, PresetResolver};
use crate::task::RegenerationTask;

/// Errors from creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The preset cannot produce a task right now.
    #[error("preset `{preset}` cannot schedule a regeneration: {reason}")]
    InvalidPreset {
        /// Preset name.
        preset: String,
        /// What is missing.
        reason: String,
    },
}

/// Why a persisted task was not restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadDrop {
    /// The task's world is not loaded.
    #[error("world `{0}` is not loaded")]
    UnresolvableLocation(String),
    /// The task's preset no longer exists. The block was reverted.
    #[error("preset `{0}` no longer exists")]
    UnresolvablePreset(String),
    /// A live task already occupies the block.
    #[error("block already has a live task")]
    Occupied,
}

/// Outcome of [`RegenerationScheduler::rehydrate`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Tasks re-armed and registered.
    pub restored: usize,
    /// Blocks restored to their original material because the task was dropped.
    pub reverted: usize,
    /// Records that were not restored, with the reason.
    pub dropped: Vec<(BlockLocation, LoadDrop)>,
}

/// Counts from one sweep of overdue tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks that regenerated their block.
    pub fired: usize,
    /// Tasks a listener cancelled.
    pub cancelled: usize,
}

impl TickReport {
    fn record(&mut self, outcome: Option<FireOutcome>) {
        match outcome {
            Some(FireOutcome::Regenerated(_)) => self.fired += 1,
            Some(FireOutcome::Cancelled) => self.cancelled += 1,
            None => {}
        }
    }
}

/// What happened to a task that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The block was set to this material.
    Regenerated(MaterialId),
    /// A listener cancelled; the block was left as is.
    Cancelled,
}

/// Owns the pending regenerations and applies them to the host.
pub struct RegenerationScheduler<B: BlockAccess> {
    host: B,
    clock: Arc<dyn Clock>,
    tasks: FxHashMap<BlockLocation, RegenerationTask>,
    listeners: Vec<Box<dyn RegenerationListener>>,
    lazy_expiry: bool,
}

impl<B: BlockAccess> RegenerationScheduler<B> {
    /// Creates an empty scheduler writing into `host`. Lazy expiry is on.
    pub fn new(host: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            host,
            clock,
            tasks: FxHashMap::default(),
            listeners: Vec::new(),
            lazy_expiry: true,
        }
    }

    /// Builder form of [`set_lazy_expiry`](Self::set_lazy_expiry).
    pub fn with_lazy_expiry(mut self, enabled: bool) -> Self {
        self.lazy_expiry = enabled;
        self
    }

    /// When enabled, [`find`](Self::find) fires an overdue task instead of
    /// returning it.
    pub fn set_lazy_expiry(&mut self, enabled: bool) {
        self.lazy_expiry = enabled;
    }

    /// The host this scheduler writes into.
    pub fn host(&self) -> &B {
        &self.host
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut B {
        &mut self.host
    }

    /// Consumes the scheduler, returning the host. Pending tasks are dropped
    /// as they are; call [`revert_all`](Self::revert_all) first to restore them.
    pub fn into_host(self) -> B {
        self.host
    }

    /// Current wall-clock time from the scheduler's clock.
    pub fn now_epoch_ms(&self) -> i64 {
        self.clock.now_epoch_ms()
    }

    /// Registers a listener for [`RegenerationEvent`]s.
    pub fn add_listener(&mut self, listener: impl RegenerationListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Builds an armed task for `location` from `preset`, without registering it.
    ///
    /// The block's current material is kept as the task's original so it can be
    /// reverted later; call this before the host replaces the block.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidPreset`] if the preset has no pickable replacement.
    pub fn create<R: Rng>(
        &self,
        location: BlockLocation,
        preset: &Preset,
        region: Option<String>,
        rng: &mut R,
    ) -> Result<RegenerationTask, TaskError> {
        let replacement =
            preset
                .regenerate_into
                .pick(rng)
                .ok_or_else(|| TaskError::InvalidPreset {
                    preset: preset.name.clone(),
                    reason: "no replacement material can be picked".to_string(),
                })?;
        let original = self
            .host
            .block_at(&location)
            .unwrap_or_else(|| preset.target.clone());
        let delay = preset.delay.sample(rng);

        Ok(RegenerationTask::new(
            location,
            preset.name.clone(),
            original,
            replacement,
            delay,
            region,
            self.clock.now_epoch_ms(),
        ))
    }

    /// Adds `task` if its block is free. Returns `true` if it was added.
    ///
    /// An occupied block keeps its existing task, whether or not it equals
    /// `task`.
    pub fn register(&mut self, task: RegenerationTask) -> bool {
        match self.tasks.entry(task.location().clone()) {
            Entry::Occupied(existing) => {
                if existing.get() != &task {
                    debug!(at = %task.location(), "block already regenerating, keeping existing task");
                }
                false
            }
            Entry::Vacant(slot) => {
                debug!(
                    at = %task.location(),
                    preset = task.preset(),
                    remaining_ms = task.remaining_ms(),
                    "task registered"
                );
                slot.insert(task);
                true
            }
        }
    }

    /// Looks up the task for the block containing `location`.
    ///
    /// With lazy expiry on, an overdue task is fired by this call and `None`
    /// is returned.
    pub fn find(&mut self, location: &Location) -> Option<&RegenerationTask> {
        self.find_block(&location.block())
    }

    /// [`find`](Self::find) for a block location.
    pub fn find_block(&mut self, at: &BlockLocation) -> Option<&RegenerationTask> {
        if self.lazy_expiry {
            let now = self.clock.now_epoch_ms();
            let overdue = match self.tasks.get_mut(at) {
                Some(task) => {
                    task.sync_with_clock(now);
                    task.is_overdue()
                }
                None => return None,
            };
            if overdue {
                debug!(at = %at, "overdue task fired on lookup");
                self.fire(at);
            }
        }
        self.tasks.get(at)
    }

    /// Whether the block containing `location` has a pending task.
    pub fn is_regenerating(&mut self, location: &Location) -> bool {
        self.find(location).is_some()
    }

    /// Looks up a task without firing anything.
    pub fn peek(&self, at: &BlockLocation) -> Option<&RegenerationTask> {
        self.tasks.get(at)
    }

    /// Removes the task at `task`'s block without firing it.
    pub fn remove(&mut self, task: &RegenerationTask) -> bool {
        self.remove_at(task.location()).is_some()
    }

    /// Removes and returns the task at `at` without firing it.
    pub fn remove_at(&mut self, at: &BlockLocation) -> Option<RegenerationTask> {
        let removed = self.tasks.remove(at);
        if removed.is_some() {
            debug!(at = %at, "task removed");
        }
        removed
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Live tasks in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &RegenerationTask> {
        self.tasks.values()
    }

    /// Counts every armed task down by `elapsed`, then fires every overdue one.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        for task in self.tasks.values_mut() {
            if !task.is_overdue() && task.advance(elapsed_ms) {
                debug!(at = %task.location(), "task overdue");
            }
        }
        self.sweep_overdue()
    }

    /// Fires every overdue task, in block order.
    fn sweep_overdue(&mut self) -> TickReport {
        let mut overdue: Vec<BlockLocation> = self
            .tasks
            .values()
            .filter(|task| task.is_overdue())
            .map(|task| task.location().clone())
            .collect();
        overdue.sort();

        let mut report = TickReport::default();
        for at in &overdue {
            report.record(self.fire(at));
        }
        report
    }

    fn fire(&mut self, at: &BlockLocation) -> Option<FireOutcome> {
        let task = self.tasks.remove(at)?;

        let mut event = RegenerationEvent::new(&task);
        for listener in &mut self.listeners {
            listener.on_regenerate(&mut event);
        }
        if event.is_cancelled() {
            debug!(at = %at, preset = task.preset(), "regeneration cancelled by listener");
            return Some(FireOutcome::Cancelled);
        }

        let material = event.regenerate_into;
        self.host.set_block(at, &material);
        debug!(at = %at, material = %material, "block regenerated");
        Some(FireOutcome::Regenerated(material))
    }

    /// Restores every pending block to its original material and drops all
    /// tasks. Returns the number of reverted blocks.
    pub fn revert_all(&mut self) -> usize {
        let mut tasks: Vec<RegenerationTask> = self.tasks.drain().map(|(_, task)| task).collect();
        tasks.sort_by(|a, b| a.location().cmp(b.location()));

        for task in &tasks {
            self.host.set_block(task.location(), task.original());
        }
        info!(count = tasks.len(), "reverted pending regenerations");
        tasks.len()
    }

    /// Takes a save snapshot.
    ///
    /// Every countdown is first capped by the wall clock, then overdue tasks
    /// are fired, so the snapshot never contains a task that has already run.
    pub fn snapshot(&mut self) -> TaskFile {
        let now = self.clock.now_epoch_ms();
        for task in self.tasks.values_mut() {
            task.sync_with_clock(now);
        }
        self.sweep_overdue();

        let mut records: Vec<TaskRecord> =
            self.tasks.values().map(|task| task.to_record(now)).collect();
        records.sort_by(|a, b| (&a.world, a.x, a.y, a.z).cmp(&(&b.world, b.x, b.y, b.z)));
        TaskFile::new(now, records)
    }

    /// Snapshots the live set and queues it for writing. Returns the number of
    /// records queued.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::WorkerGone`] if the gateway has shut down.
    pub fn save_all(&mut self, handle: &PersistenceHandle) -> Result<usize, PersistenceError> {
        let file = self.snapshot();
        let count = file.tasks.len();
        handle.submit(PersistJob::SaveTasks(file))?;
        info!(count, "queued pending tasks for saving");
        Ok(count)
    }

    /// Queues a read of the task file. The records arrive as a gateway
    /// completion and are applied with [`rehydrate`](Self::rehydrate).
    pub fn load_all(&self, handle: &PersistenceHandle) -> Result<(), PersistenceError> {
        handle.submit(PersistJob::LoadTasks)
    }

    /// Re-arms persisted tasks with their stored remaining delay.
    ///
    /// A record whose world is not loaded is dropped. A record whose preset is
    /// gone is dropped and its block reverted. Neither stops the rest from
    /// loading.
    pub fn rehydrate(
        &mut self,
        records: Vec<TaskRecord>,
        presets: &dyn PresetResolver,
    ) -> LoadReport {
        let now = self.clock.now_epoch_ms();
        let mut report = LoadReport::default();

        for record in records {
            let at = record.location();

            if !self.host.world_loaded(&record.world) {
                warn!(at = %at, "dropping persisted task: world is not loaded");
                report
                    .dropped
                    .push((at, LoadDrop::UnresolvableLocation(record.world)));
                continue;
            }

            if presets.resolve_preset(&record.preset).is_none() {
                warn!(at = %at, preset = %record.preset, "dropping persisted task: preset no longer exists");
                self.host.set_block(&at, &record.original);
                report.reverted += 1;
                report
                    .dropped
                    .push((at, LoadDrop::UnresolvablePreset(record.preset)));
                continue;
            }

            if self.register(RegenerationTask::from_record(&record, now)) {
                report.restored += 1;
            } else {
                warn!(at = %at, "dropping persisted task: block already has a live task");
                report.dropped.push((at, LoadDrop::Occupied));
            }
        }

        info!(
            restored = report.restored,
            dropped = report.dropped.len(),
            "rehydrated persisted tasks"
        );
        report
    }

    #[cfg(test)]
    pub(crate) fn task_mut(&mut self, at: &BlockLocation) -> Option<&mut RegenerationTask> {
        self.tasks.get_mut(at)
    }
}
