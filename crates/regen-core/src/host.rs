//! Capabilities the host game server provides to the regeneration core.
//!
//! One [`BlockAccess`] implementation is picked when the application context is
//! built and handed to the scheduler; nothing downstream switches on which host
//! it is talking to. [`MemoryWorld`] is the in-process implementation used by
//! the standalone server binary and by tests.

use std::collections::{HashMap, HashSet};

use crate::location::BlockLocation;
use crate::material::MaterialId;

/// Answers whether a world is currently loaded.
pub trait WorldResolver {
    /// Returns `true` if `world` is loaded and its blocks can be addressed.
    fn world_loaded(&self, world: &str) -> bool;
}

/// Block read/write access into the host's worlds.
pub trait BlockAccess: WorldResolver {
    /// The material at `at`, or `None` if its world is not loaded.
    fn block_at(&self, at: &BlockLocation) -> Option<MaterialId>;

    /// Replaces the block at `at`. Writes into unloaded worlds are ignored.
    fn set_block(&mut self, at: &BlockLocation, material: &MaterialId);
}

/// A single block write, recorded by [`MemoryWorld`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockChange {
    /// Where.
    pub at: BlockLocation,
    /// The material before the write.
    pub old: MaterialId,
    /// The material written.
    pub new: MaterialId,
}

/// In-memory worlds: a set of loaded world names and a sparse block map where
/// unset cells read as air.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    loaded: HashSet<String>,
    blocks: HashMap<BlockLocation, MaterialId>,
    changes: Vec<BlockChange>,
}

impl MemoryWorld {
    /// Creates a host with no worlds loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host with the given worlds loaded.
    pub fn with_worlds<'a>(worlds: impl IntoIterator<Item = &'a str>) -> Self {
        let mut host = Self::new();
        for world in worlds {
            host.load_world(world);
        }
        host
    }

    /// Marks a world as loaded.
    pub fn load_world(&mut self, world: &str) {
        self.loaded.insert(world.to_string());
    }

    /// Marks a world as unloaded. Its blocks are kept.
    pub fn unload_world(&mut self, world: &str) {
        self.loaded.remove(world);
    }

    /// Sets a block without recording a change, for test and scene setup.
    pub fn place(&mut self, at: BlockLocation, material: MaterialId) {
        self.blocks.insert(at, material);
    }

    /// Every write made through [`BlockAccess::set_block`], oldest first.
    pub fn changes(&self) -> &[BlockChange] {
        &self.changes
    }

    /// Forgets recorded changes.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

impl WorldResolver for MemoryWorld {
    fn world_loaded(&self, world: &str) -> bool {
        self.loaded.contains(world)
    }
}

impl BlockAccess for MemoryWorld {
    fn block_at(&self, at: &BlockLocation) -> Option<MaterialId> {
        if !self.world_loaded(&at.world) {
            return None;
        }
        Some(self.blocks.get(at).cloned().unwrap_or_else(MaterialId::air))
    }

    fn set_block(&mut self, at: &BlockLocation, material: &MaterialId) {
        let Some(old) = self.block_at(at) else {
            return;
        };
        self.blocks.insert(at.clone(), material.clone());
        self.changes.push(BlockChange {
            at: at.clone(),
            old,
            new: material.clone(),
        });
    }
}
