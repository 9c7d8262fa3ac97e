//! Named regions in registration order.
//!
//! The index holds resolved [`SpatialRegion`]s alongside raw descriptors that
//! could not be resolved yet (usually because their world was not loaded at
//! startup). Both live in one ordered list, so a region keeps its position
//! when it is promoted later and "first registered wins" stays stable across
//! restarts. Raw descriptors are never dropped; [`RegionIndex::resolve_failed`]
//! retries them and is meant to be polled from the tick loop.
//!
//! Mutations write the whole index through to the persistence gateway when a
//! [`PersistenceHandle`] is attached. Writes are held back until the region
//! file has been applied with [`RegionIndex::load`], so an index that never
//! saw the file cannot replace it.

use tracing::{debug, error, info, warn};

use crate::gateway::{PersistJob, PersistenceHandle};
use crate::host::WorldResolver;
use crate::location::{BlockLocation, Location};
use crate::persistence::{RegionFile, RegionRecord};
use crate::region::{RawRegion, SpatialRegion};

#[derive(Clone, Debug)]
enum Slot {
    Resolved(SpatialRegion),
    Unresolved(RawRegion),
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Self::Resolved(region) => region.name(),
            Self::Unresolved(raw) => &raw.name,
        }
    }

    fn to_record(&self) -> RegionRecord {
        let raw = match self {
            Self::Resolved(region) => region.to_raw(),
            Self::Unresolved(raw) => raw.clone(),
        };
        RegionRecord {
            name: raw.name,
            min: raw.min,
            max: raw.max,
            reattempt: raw.reattempt,
        }
    }
}

/// Counts from [`RegionIndex::load`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionLoadReport {
    /// Regions resolved immediately.
    pub resolved: usize,
    /// Regions waiting for their world to load.
    pub pending: usize,
    /// Regions with malformed corners, kept but never retried.
    pub invalid: usize,
}

/// Ordered set of named regions.
#[derive(Default)]
pub struct RegionIndex {
    slots: Vec<Slot>,
    persistence: Option<PersistenceHandle>,
    loaded: bool,
}

impl RegionIndex {
    /// Creates an empty index with no write-through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index that writes through `handle`.
    pub fn with_persistence(handle: PersistenceHandle) -> Self {
        Self {
            slots: Vec::new(),
            persistence: Some(handle),
            loaded: false,
        }
    }

    /// Attaches or detaches write-through.
    pub fn set_persistence(&mut self, handle: Option<PersistenceHandle>) {
        self.persistence = handle;
    }

    /// Inserts `region`, or replaces the region (resolved or not) with the
    /// same name in place. Returns `true` if a region was replaced.
    pub fn upsert(&mut self, region: SpatialRegion) -> bool {
        let replaced = match self.position(region.name()) {
            Some(index) => {
                self.slots[index] = Slot::Resolved(region);
                true
            }
            None => {
                self.slots.push(Slot::Resolved(region));
                false
            }
        };
        self.persist();
        replaced
    }

    /// Removes the region called `name`. Returns `false` if there was none.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.position(name) else {
            return false;
        };
        self.slots.remove(index);
        self.persist();
        true
    }

    /// The first-registered resolved region containing `location`.
    ///
    /// Linear in the number of regions.
    pub fn find_containing(&self, location: &Location) -> Option<&SpatialRegion> {
        self.resolved()
            .find(|region| region.contains_location(location))
    }

    /// [`find_containing`](Self::find_containing) for a block cell.
    pub fn find_containing_block(&self, at: &BlockLocation) -> Option<&SpatialRegion> {
        self.resolved().find(|region| region.contains_block(at))
    }

    /// Retries every raw descriptor marked for reattempt. Returns how many
    /// were promoted to resolved regions.
    ///
    /// Idempotent: calling it with nothing to resolve does nothing.
    pub fn resolve_failed(&mut self, worlds: &dyn WorldResolver) -> usize {
        let mut promoted = 0;
        for slot in &mut self.slots {
            let Slot::Unresolved(raw) = slot else {
                continue;
            };
            if !raw.reattempt {
                continue;
            }
            match raw.build(worlds) {
                Ok(region) => {
                    *slot = Slot::Resolved(region);
                    promoted += 1;
                }
                Err(e) if e.is_retryable() => {}
                Err(e) => {
                    warn!(region = %raw.name, error = %e, "region can never resolve, no longer retrying");
                    raw.reattempt = false;
                }
            }
        }

        if promoted > 0 {
            info!(
                promoted,
                pending = self.pending_count(),
                "resolved previously unavailable regions"
            );
            self.persist();
        }
        promoted
    }

    /// Replaces the index contents with `file`, resolving what it can, and
    /// enables write-through.
    ///
    /// Regions already in the index win over file entries of the same name and
    /// keep the file entry's position; regions not in the file are appended.
    pub fn load(&mut self, file: RegionFile, worlds: &dyn WorldResolver) -> RegionLoadReport {
        let mut report = RegionLoadReport::default();
        let mut loaded: Vec<Slot> = Vec::with_capacity(file.regions.len());

        for record in file.regions {
            if loaded.iter().any(|slot| slot.name() == record.name) {
                warn!(region = %record.name, "duplicate region in file, keeping the first");
                continue;
            }
            let mut raw = RawRegion {
                name: record.name,
                min: record.min,
                max: record.max,
                reattempt: true,
            };
            match raw.build(worlds) {
                Ok(region) => {
                    report.resolved += 1;
                    loaded.push(Slot::Resolved(region));
                }
                Err(e) if e.is_retryable() => {
                    report.pending += 1;
                    loaded.push(Slot::Unresolved(raw));
                }
                Err(e) => {
                    warn!(region = %raw.name, error = %e, "region has invalid corners");
                    report.invalid += 1;
                    raw.reattempt = false;
                    loaded.push(Slot::Unresolved(raw));
                }
            }
        }

        let existing = std::mem::take(&mut self.slots);
        let merged = !existing.is_empty();
        for slot in existing {
            match loaded.iter().position(|s| s.name() == slot.name()) {
                Some(index) => loaded[index] = slot,
                None => loaded.push(slot),
            }
        }
        self.slots = loaded;
        self.loaded = true;

        info!(
            resolved = report.resolved,
            pending = report.pending,
            invalid = report.invalid,
            "loaded regions"
        );
        if merged {
            self.persist();
        }
        report
    }

    /// The index in its on-disk form, in registration order.
    pub fn snapshot(&self) -> RegionFile {
        RegionFile {
            regions: self.slots.iter().map(Slot::to_record).collect(),
        }
    }

    /// The resolved region called `name`.
    pub fn get(&self, name: &str) -> Option<&SpatialRegion> {
        self.resolved().find(|region| region.name() == name)
    }

    /// Whether a region called `name` exists, resolved or not.
    pub fn exists(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// All region names, resolved or not, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(Slot::name)
    }

    /// Resolved regions in registration order.
    pub fn resolved(&self) -> impl Iterator<Item = &SpatialRegion> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Resolved(region) => Some(region),
            Slot::Unresolved(_) => None,
        })
    }

    /// Raw descriptors that have not been resolved.
    pub fn unresolved(&self) -> impl Iterator<Item = &RawRegion> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Unresolved(raw) => Some(raw),
            Slot::Resolved(_) => None,
        })
    }

    /// Number of raw descriptors still marked for reattempt.
    pub fn pending_count(&self) -> usize {
        self.unresolved().filter(|raw| raw.reattempt).count()
    }

    /// Whether the region file has been applied and writes go through.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of regions, resolved or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the index holds no regions.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name() == name)
    }

    fn persist(&self) {
        let Some(handle) = &self.persistence else {
            return;
        };
        if !self.loaded {
            debug!("region file not loaded yet, holding write");
            return;
        }
        if let Err(e) = handle.submit(PersistJob::SaveRegions(self.snapshot())) {
            error!(error = %e, "failed to queue region save");
        }
    }
}
