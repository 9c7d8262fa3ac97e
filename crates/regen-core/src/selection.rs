//! Two-corner region selection, one session per operator.
//!
//! Sessions live in memory only. A session is created by the first corner an
//! operator sets and is cleared when it is committed or cancelled. A failed
//! commit leaves the session untouched so the operator can fix a corner and
//! try again.

use std::collections::HashMap;

use tracing::info;

use crate::location::Location;
use crate::preset::ActorId;
use crate::region::{RegionError, SelectionProblem, SpatialRegion};
use crate::region_index::RegionIndex;

/// An operator's in-progress selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSession {
    /// First corner.
    pub first: Option<Location>,
    /// Second corner.
    pub second: Option<Location>,
}

impl SelectionSession {
    /// Both corners, if set and in the same world.
    pub fn corners(&self) -> Result<(&Location, &Location), SelectionProblem> {
        let first = self.first.as_ref().ok_or(SelectionProblem::MissingFirst)?;
        let second = self
            .second
            .as_ref()
            .ok_or(SelectionProblem::MissingSecond)?;
        if first.world != second.world {
            return Err(SelectionProblem::WorldMismatch {
                first: first.world.clone(),
                second: second.world.clone(),
            });
        }
        Ok((first, second))
    }

    /// The region these corners describe, normalized to min/max.
    ///
    /// Corners snap to the block cells they fall in, so both clicked blocks
    /// are inside the region.
    pub fn to_region(&self, name: &str) -> Result<SpatialRegion, SelectionProblem> {
        let (first, second) = self.corners()?;
        Ok(SpatialRegion::new(
            name,
            first.world.clone(),
            first.position().floor(),
            second.position().floor(),
        ))
    }
}

/// Selection sessions keyed by operator.
#[derive(Debug, Default)]
pub struct SelectionStore {
    sessions: HashMap<ActorId, SelectionSession>,
}

impl SelectionStore {
    /// Creates a store with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operator's first corner, starting a session if needed.
    pub fn set_first(&mut self, operator: ActorId, location: Location) {
        self.sessions.entry(operator).or_default().first = Some(location);
    }

    /// Sets the operator's second corner, starting a session if needed.
    pub fn set_second(&mut self, operator: ActorId, location: Location) {
        self.sessions.entry(operator).or_default().second = Some(location);
    }

    /// The operator's session.
    pub fn get(&self, operator: ActorId) -> Option<&SelectionSession> {
        self.sessions.get(&operator)
    }

    /// Drops the operator's session. Returns `false` if there was none.
    pub fn cancel(&mut self, operator: ActorId) -> bool {
        self.sessions.remove(&operator).is_some()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no operator has a session.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Turns the operator's selection into a region called `name` and upserts
    /// it into `index`, replacing any region of the same name.
    ///
    /// # Errors
    ///
    /// [`RegionError::InvalidSelection`] if there is no session, a corner is
    /// missing, or the corners are in different worlds. The index is not
    /// touched in that case.
    pub fn commit(
        &mut self,
        operator: ActorId,
        name: &str,
        index: &mut RegionIndex,
    ) -> Result<SpatialRegion, RegionError> {
        let session = self
            .sessions
            .get(&operator)
            .ok_or(SelectionProblem::NoSession)?;
        let region = session.to_region(name)?;

        let replaced = index.upsert(region.clone());
        self.sessions.remove(&operator);
        info!(
            region = name,
            world = region.world(),
            replaced,
            "region committed"
        );
        Ok(region)
    }
}
