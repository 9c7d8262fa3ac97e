//! Background persistence worker.
//!
//! File I/O never runs on the tick thread. Callers hand the worker an owned
//! snapshot through a [`PersistenceHandle`]; results come back on a channel
//! that the tick loop drains with [`PersistenceGateway::drain_completions`].
//! Failed jobs are reported, logged, and not retried.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error};

use crate::persistence::{
    DataStore, LoadedRegions, LoadedTasks, PersistenceError, RegionFile, TaskFile,
};

/// Work accepted by the persistence worker.
#[derive(Clone, Debug)]
pub enum PersistJob {
    /// Write this task snapshot.
    SaveTasks(TaskFile),
    /// Write this region snapshot.
    SaveRegions(RegionFile),
    /// Read the task file.
    LoadTasks,
    /// Read the region file.
    LoadRegions,
}

/// Which job a completion belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// [`PersistJob::SaveTasks`].
    SaveTasks,
    /// [`PersistJob::SaveRegions`].
    SaveRegions,
    /// [`PersistJob::LoadTasks`].
    LoadTasks,
    /// [`PersistJob::LoadRegions`].
    LoadRegions,
}

impl PersistJob {
    /// The kind of this job.
    pub fn kind(&self) -> JobKind {
        match self {
            Self::SaveTasks(_) => JobKind::SaveTasks,
            Self::SaveRegions(_) => JobKind::SaveRegions,
            Self::LoadTasks => JobKind::LoadTasks,
            Self::LoadRegions => JobKind::LoadRegions,
        }
    }
}

/// Outcome of a finished job.
#[derive(Debug)]
pub enum PersistCompletion {
    /// Task file written.
    TasksSaved {
        /// Records written.
        count: usize,
    },
    /// Task file read.
    TasksLoaded(LoadedTasks),
    /// Region file written.
    RegionsSaved {
        /// Regions written.
        count: usize,
    },
    /// Region file read.
    RegionsLoaded(LoadedRegions),
    /// The job failed; the file on disk is unchanged.
    Failed {
        /// Which job.
        job: JobKind,
        /// Why.
        error: PersistenceError,
    },
}

enum WorkerMessage {
    Job(PersistJob),
    Shutdown,
}

/// Cloneable submit side of the gateway.
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: Sender<WorkerMessage>,
}

impl PersistenceHandle {
    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WorkerGone`] if the worker has shut down.
    pub fn submit(&self, job: PersistJob) -> Result<(), PersistenceError> {
        self.sender
            .send(WorkerMessage::Job(job))
            .map_err(|_| PersistenceError::WorkerGone)
    }
}

/// Owns the persistence worker thread.
pub struct PersistenceGateway {
    handle: PersistenceHandle,
    results: Receiver<PersistCompletion>,
    worker: Option<JoinHandle<()>>,
}

impl PersistenceGateway {
    /// Spawns the worker over `store`.
    pub fn new(store: DataStore) -> Self {
        let (job_sender, job_receiver) = unbounded::<WorkerMessage>();
        let (result_sender, result_receiver) = unbounded::<PersistCompletion>();

        let worker = std::thread::Builder::new()
            .name("regen-persist".into())
            .spawn(move || {
                while let Ok(message) = job_receiver.recv() {
                    let WorkerMessage::Job(job) = message else {
                        break;
                    };
                    let completion = run_job(&store, job);
                    if result_sender.send(completion).is_err() {
                        break;
                    }
                }
                debug!("persistence worker stopped");
            })
            .expect("Failed to spawn persistence worker thread");

        Self {
            handle: PersistenceHandle { sender: job_sender },
            results: result_receiver,
            worker: Some(worker),
        }
    }

    /// A submit handle for components that persist on their own.
    pub fn handle(&self) -> PersistenceHandle {
        self.handle.clone()
    }

    /// Queues a job.
    pub fn submit(&self, job: PersistJob) -> Result<(), PersistenceError> {
        self.handle.submit(job)
    }

    /// All completions available right now, without blocking.
    pub fn drain_completions(&self) -> Vec<PersistCompletion> {
        self.results.try_iter().collect()
    }

    /// Blocks up to `timeout` for the next completion.
    pub fn wait_completion(&self, timeout: Duration) -> Option<PersistCompletion> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Finishes every queued job, stops the worker, and returns the
    /// completions that had not been drained yet.
    pub fn shutdown(mut self) -> Vec<PersistCompletion> {
        self.stop_worker();
        self.drain_completions()
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Jobs queued before this message still run.
            let _ = self.handle.sender.send(WorkerMessage::Shutdown);
            if worker.join().is_err() {
                error!("persistence worker panicked");
            }
        }
    }
}

impl Drop for PersistenceGateway {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn run_job(store: &DataStore, job: PersistJob) -> PersistCompletion {
    let kind = job.kind();
    let result = match job {
        PersistJob::SaveTasks(file) => store
            .save_tasks(&file)
            .map(|count| PersistCompletion::TasksSaved { count }),
        PersistJob::SaveRegions(file) => store
            .save_regions(&file)
            .map(|count| PersistCompletion::RegionsSaved { count }),
        PersistJob::LoadTasks => store.load_tasks().map(PersistCompletion::TasksLoaded),
        PersistJob::LoadRegions => store.load_regions().map(PersistCompletion::RegionsLoaded),
    };

    result.unwrap_or_else(|error| {
        error!(job = ?kind, %error, "persistence job failed");
        PersistCompletion::Failed { job: kind, error }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialId;
    use crate::persistence::{RegionRecord, TaskRecord};

    const WAIT: Duration = Duration::from_secs(5);

    fn record() -> TaskRecord {
        TaskRecord {
            world: "world".to_string(),
            x: 1,
            y: 2,
            z: 3,
            preset: "stone".to_string(),
            original: MaterialId::new("STONE"),
            replacement: MaterialId::new("COBBLESTONE"),
            remaining_ms: 100,
            deadline_epoch_ms: 200,
            region: None,
        }
    }

    #[test]
    fn test_save_then_load_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::new(DataStore::new(
            dir.path().join("tasks.ron"),
            dir.path().join("regions.ron"),
        ));

        gateway
            .submit(PersistJob::SaveTasks(TaskFile::new(0, vec![record()])))
            .unwrap();
        gateway.submit(PersistJob::LoadTasks).unwrap();

        assert!(matches!(
            gateway.wait_completion(WAIT),
            Some(PersistCompletion::TasksSaved { count: 1 })
        ));
        match gateway.wait_completion(WAIT) {
            Some(PersistCompletion::TasksLoaded(loaded)) => {
                assert_eq!(loaded.records, vec![record()]);
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_flushes_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let regions_path = dir.path().join("regions.ron");
        let gateway =
            PersistenceGateway::new(DataStore::new(dir.path().join("tasks.ron"), &regions_path));

        let file = RegionFile {
            regions: vec![RegionRecord {
                name: "mine".to_string(),
                min: "world,0,0,0".to_string(),
                max: "world,1,1,1".to_string(),
                reattempt: false,
            }],
        };
        gateway.handle().submit(PersistJob::SaveRegions(file)).unwrap();

        let handle = gateway.handle();
        let remaining = gateway.shutdown();
        assert!(matches!(
            remaining.as_slice(),
            [PersistCompletion::RegionsSaved { count: 1 }]
        ));
        assert!(regions_path.exists());
        assert!(matches!(
            handle.submit(PersistJob::LoadRegions),
            Err(PersistenceError::WorkerGone)
        ));
    }

    #[test]
    fn test_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_path = dir.path().join("tasks.ron");
        std::fs::write(&tasks_path, "not ron at all {").unwrap();
        let gateway = PersistenceGateway::new(DataStore::new(tasks_path, dir.path().join("r.ron")));

        gateway.submit(PersistJob::LoadTasks).unwrap();
        match gateway.wait_completion(WAIT) {
            Some(PersistCompletion::Failed { job, error }) => {
                assert_eq!(job, JobKind::LoadTasks);
                assert!(matches!(error, PersistenceError::Parse { .. }));
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }
}
