//! The application context: every component of a running server, built once
//! and passed around explicitly.
//!
//! [`RegenContext`] is what the host's event handlers talk to. Block breaks,
//! ticks, selection commands and config reloads all arrive here on the tick
//! thread; file I/O is handed to the persistence worker and its results are
//! applied on the next [`on_tick`](RegenContext::on_tick).

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use regen_config::Config;
use regen_core::{
    Actor, ActorId, BlockAccess, BlockLocation, Clock, ConditionFailure, DataStore, JobKind,
    Location, PersistCompletion, PersistJob, PersistenceError, PersistenceGateway, PresetRegistry,
    PresetResolver, RegenerationListener, RegenerationScheduler, RegionError, RegionIndex,
    SelectionStore, SpatialRegion, TaskError, TickReport,
};
use tracing::{debug, error, info, warn};

use crate::timer::IntervalTimer;

/// What happened to a block break.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakOutcome {
    /// The block is already waiting to regenerate. The break should be cancelled.
    AlreadyRegenerating,
    /// No preset targets the block's material.
    NoPreset,
    /// Regions are required and the block is not inside one.
    OutsideRegion,
    /// The actor does not meet the preset's requirements. The break should be
    /// cancelled.
    Denied(ConditionFailure),
    /// A regeneration was scheduled and the placeholder placed.
    Scheduled {
        /// Preset that matched.
        preset: String,
        /// Region containing the block.
        region: Option<String>,
        /// Delay until the block regenerates.
        remaining_ms: i64,
    },
    /// The preset could not produce a task.
    Failed(TaskError),
}

impl BreakOutcome {
    /// Whether the host should cancel the break event.
    pub fn cancels_break(&self) -> bool {
        matches!(self, Self::AlreadyRegenerating | Self::Denied(_))
    }
}

/// Result of [`RegenContext::shutdown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks written to disk, if a task save ran and succeeded.
    pub tasks_saved: Option<usize>,
    /// Regions written to disk, if the final region save succeeded.
    pub regions_saved: Option<usize>,
    /// Blocks restored to their original material.
    pub reverted: usize,
    /// Persistence jobs that failed while shutting down.
    pub failed_jobs: usize,
}

/// Load state of one persisted file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileState {
    /// The load job has not completed.
    Pending,
    /// The file was read and applied. Saves may replace it.
    Loaded,
    /// The file exists but could not be read. It is never written over.
    Unreadable,
}

impl FileState {
    fn is_settled(self) -> bool {
        self != Self::Pending
    }
}

/// All state of one regeneration server.
pub struct RegenContext<B: BlockAccess> {
    config: Config,
    presets: PresetRegistry,
    regions: RegionIndex,
    selections: SelectionStore,
    scheduler: RegenerationScheduler<B>,
    gateway: PersistenceGateway,
    autosave: IntervalTimer,
    reattempt: IntervalTimer,
    rng: StdRng,
    tasks_file: FileState,
    regions_file: FileState,
}

impl<B: BlockAccess> RegenContext<B> {
    /// Builds a context over `host`. Nothing is loaded until [`start`](Self::start).
    pub fn new(config: Config, host: B, clock: Arc<dyn Clock>) -> Self {
        let gateway = PersistenceGateway::new(DataStore::from_config(&config.storage));
        let regions = RegionIndex::with_persistence(gateway.handle());
        let scheduler =
            RegenerationScheduler::new(host, clock).with_lazy_expiry(config.scheduler.lazy_expiry);

        Self {
            presets: PresetRegistry::from_config(&config.presets),
            regions,
            selections: SelectionStore::new(),
            scheduler,
            gateway,
            autosave: IntervalTimer::from_secs(config.scheduler.autosave_interval_secs),
            reattempt: IntervalTimer::from_secs(config.regions.reattempt_interval_secs),
            rng: StdRng::from_os_rng(),
            tasks_file: FileState::Pending,
            regions_file: FileState::Pending,
            config,
        }
    }

    /// Replaces the random source, for reproducible replacement picks.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Queues loading of the region and task files.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::WorkerGone`] if the persistence worker is not running.
    pub fn start(&mut self) -> Result<(), PersistenceError> {
        self.gateway.submit(PersistJob::LoadRegions)?;
        self.scheduler.load_all(&self.gateway.handle())?;
        info!(presets = self.presets.len(), "regeneration service starting");
        Ok(())
    }

    /// Blocks until both startup loads have finished or `timeout` passes.
    /// Returns `true` if both finished.
    pub fn await_startup(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_loaded() {
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            match self.gateway.wait_completion(left) {
                Some(completion) => self.apply_completion(completion),
                None => break,
            }
        }
        if !self.is_loaded() {
            warn!(
                tasks = ?self.tasks_file,
                regions = ?self.regions_file,
                "startup loads did not finish in time"
            );
        }
        self.is_loaded()
    }

    /// Whether both startup loads have finished, successfully or not.
    pub fn is_loaded(&self) -> bool {
        self.tasks_file.is_settled() && self.regions_file.is_settled()
    }

    /// Handles a block being broken at `location` by `actor`.
    pub fn on_block_break(&mut self, location: &Location, actor: &Actor) -> BreakOutcome {
        if self.scheduler.is_regenerating(location) {
            return BreakOutcome::AlreadyRegenerating;
        }

        let at = location.block();
        let Some(material) = self.scheduler.host().block_at(&at) else {
            return BreakOutcome::NoPreset;
        };
        let Some(preset) = self.presets.for_material(&material) else {
            return BreakOutcome::NoPreset;
        };

        let region = self
            .regions
            .find_containing_block(&at)
            .map(|region| region.name().to_string());
        if region.is_none() && self.config.regions.restrict_to_regions {
            return BreakOutcome::OutsideRegion;
        }

        if let Err(failure) = preset.conditions.check(actor) {
            debug!(at = %at, preset = %preset.name, %failure, "break denied");
            return BreakOutcome::Denied(failure);
        }

        let task = match self
            .scheduler
            .create(at.clone(), preset, region.clone(), &mut self.rng)
        {
            Ok(task) => task,
            Err(e) => {
                warn!(at = %at, error = %e, "could not schedule regeneration");
                return BreakOutcome::Failed(e);
            }
        };
        let remaining_ms = task.remaining_ms();
        let placeholder = preset.replace_with.clone();
        let preset_name = preset.name.clone();

        self.scheduler.register(task);
        self.scheduler.host_mut().set_block(&at, &placeholder);

        BreakOutcome::Scheduled {
            preset: preset_name,
            region,
            remaining_ms,
        }
    }

    /// Advances the service by `elapsed`: ticks the scheduler, applies
    /// finished persistence jobs, autosaves, and retries unresolved regions.
    pub fn on_tick(&mut self, elapsed: Duration) -> TickReport {
        let report = self.scheduler.tick(elapsed);
        self.process_completions();

        if self.autosave.advance(elapsed) {
            self.save_tasks();
        }
        if self.reattempt.advance(elapsed) && self.regions.pending_count() > 0 {
            self.regions.resolve_failed(self.scheduler.host());
        }
        report
    }

    /// Applies every finished persistence job. Returns how many were applied.
    pub fn process_completions(&mut self) -> usize {
        let completions = self.gateway.drain_completions();
        let count = completions.len();
        for completion in completions {
            self.apply_completion(completion);
        }
        count
    }

    /// Snapshots pending tasks and queues them for writing. Skipped until the
    /// task file has been loaded, and for good if it could not be read, so a
    /// save never replaces tasks this process has not seen.
    pub fn save_tasks(&mut self) -> Option<usize> {
        if self.tasks_file != FileState::Loaded {
            debug!(state = ?self.tasks_file, "task file not loaded, skipping save");
            return None;
        }
        match self.scheduler.save_all(&self.gateway.handle()) {
            Ok(count) => Some(count),
            Err(e) => {
                error!(error = %e, "failed to queue task save");
                None
            }
        }
    }

    fn apply_completion(&mut self, completion: PersistCompletion) {
        match completion {
            PersistCompletion::TasksLoaded(loaded) => {
                if loaded.skipped > 0 {
                    warn!(skipped = loaded.skipped, "skipped corrupt task records");
                }
                let report = self.scheduler.rehydrate(loaded.records, &self.presets);
                for (at, reason) in &report.dropped {
                    debug!(at = %at, %reason, "persisted task dropped");
                }
                self.place_placeholders();
                self.tasks_file = FileState::Loaded;
            }
            PersistCompletion::RegionsLoaded(loaded) => {
                if loaded.skipped > 0 {
                    warn!(skipped = loaded.skipped, "skipped corrupt region records");
                }
                self.regions.load(loaded.file, self.scheduler.host());
                self.regions_file = FileState::Loaded;
            }
            PersistCompletion::TasksSaved { count } => {
                info!(count, "saved pending tasks");
            }
            PersistCompletion::RegionsSaved { count } => {
                debug!(count, "saved regions");
            }
            PersistCompletion::Failed { job, error } => {
                error!(?job, %error, "persistence job failed");
                match job {
                    JobKind::LoadTasks => {
                        warn!("task file left untouched until restart");
                        self.tasks_file = FileState::Unreadable;
                    }
                    JobKind::LoadRegions => {
                        warn!("region file left untouched until restart");
                        self.regions_file = FileState::Unreadable;
                    }
                    JobKind::SaveTasks | JobKind::SaveRegions => {}
                }
            }
        }
    }

    /// Puts each pending block back into its waiting state after a restart.
    fn place_placeholders(&mut self) {
        let pending: Vec<(BlockLocation, String)> = self
            .scheduler
            .iter()
            .map(|task| (task.location().clone(), task.preset().to_string()))
            .collect();
        for (at, preset) in pending {
            if let Some(preset) = self.presets.resolve_preset(&preset) {
                self.scheduler
                    .host_mut()
                    .set_block(&at, &preset.replace_with);
            }
        }
    }

    /// Sets the operator's first selection corner.
    pub fn select_first(&mut self, operator: ActorId, location: Location) {
        self.selections.set_first(operator, location);
    }

    /// Sets the operator's second selection corner.
    pub fn select_second(&mut self, operator: ActorId, location: Location) {
        self.selections.set_second(operator, location);
    }

    /// Commits the operator's selection as region `name`.
    pub fn commit_selection(
        &mut self,
        operator: ActorId,
        name: &str,
    ) -> Result<SpatialRegion, RegionError> {
        self.selections.commit(operator, name, &mut self.regions)
    }

    /// Deletes region `name`. Tasks inside it are not affected.
    pub fn remove_region(&mut self, name: &str) -> Result<(), RegionError> {
        if self.regions.remove(name) {
            info!(region = name, "region removed");
            Ok(())
        } else {
            Err(RegionError::UnknownRegion(name.to_string()))
        }
    }

    /// Applies a reloaded config. Pending tasks keep running with the
    /// replacement and delay they were created with. Storage paths only take
    /// effect after a restart.
    pub fn reload(&mut self, config: Config) {
        if config.storage != self.config.storage {
            warn!("storage settings changed, restart to apply them");
        }
        self.presets = PresetRegistry::from_config(&config.presets);
        self.scheduler
            .set_lazy_expiry(config.scheduler.lazy_expiry);
        self.autosave
            .set_interval(Duration::from_secs(config.scheduler.autosave_interval_secs));
        self.reattempt
            .set_interval(Duration::from_secs(config.regions.reattempt_interval_secs));
        info!(presets = self.presets.len(), "configuration reloaded");
        self.config = config;
    }

    /// Registers a listener for regeneration events.
    pub fn add_listener(&mut self, listener: impl RegenerationListener + 'static) {
        self.scheduler.add_listener(listener);
    }

    /// Saves (when configured), reverts every pending block, flushes the
    /// persistence worker and returns the host.
    ///
    /// The save snapshot is taken before reverting, so pending tasks survive
    /// the restart while the world is left without placeholders. Without
    /// `persist_on_shutdown` the task file is emptied after the revert, so no
    /// earlier autosave brings reverted blocks back.
    pub fn shutdown(mut self) -> (ShutdownReport, B) {
        self.process_completions();

        let persist = self.config.scheduler.persist_on_shutdown;
        let queued_tasks = if persist { self.save_tasks() } else { None };
        let regions = self.regions.snapshot();
        let regions_queued = if self.regions_file == FileState::Loaded {
            self.gateway
                .submit(PersistJob::SaveRegions(regions))
                .map_err(|e| error!(error = %e, "failed to queue region save"))
                .is_ok()
        } else {
            false
        };

        let mut report = ShutdownReport {
            reverted: self.scheduler.revert_all(),
            ..Default::default()
        };
        if !persist {
            self.save_tasks();
        }

        for completion in self.gateway.shutdown() {
            match completion {
                PersistCompletion::TasksSaved { count } if queued_tasks.is_some() => {
                    report.tasks_saved = Some(count);
                }
                PersistCompletion::RegionsSaved { count } if regions_queued => {
                    report.regions_saved = Some(count);
                }
                PersistCompletion::Failed { job, error } => {
                    error!(?job, %error, "persistence job failed during shutdown");
                    report.failed_jobs += 1;
                }
                _ => {}
            }
        }

        info!(
            saved = ?report.tasks_saved,
            reverted = report.reverted,
            "regeneration service stopped"
        );
        (report, self.scheduler.into_host())
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The preset registry.
    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// The region index.
    pub fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Open selection sessions.
    pub fn selections(&self) -> &SelectionStore {
        &self.selections
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &RegenerationScheduler<B> {
        &self.scheduler
    }

    /// Mutable access to the scheduler.
    pub fn scheduler_mut(&mut self) -> &mut RegenerationScheduler<B> {
        &mut self.scheduler
    }

    /// The host.
    pub fn host(&self) -> &B {
        self.scheduler.host()
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut B {
        self.scheduler.host_mut()
    }
}
