//! Named axis-aligned regions and their unresolved raw form.

use glam::DVec3;
use thiserror::Error;

use crate::host::WorldResolver;
use crate::location::{BlockLocation, CornerParseError, Location, format_corner, parse_corner};

/// Why a selection cannot become a region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionProblem {
    /// The operator has no selection in progress.
    #[error("no selection in progress")]
    NoSession,
    /// The first corner is not set.
    #[error("first corner is not set")]
    MissingFirst,
    /// The second corner is not set.
    #[error("second corner is not set")]
    MissingSecond,
    /// The corners lie in different worlds.
    #[error("corners are in different worlds ({first} and {second})")]
    WorldMismatch {
        /// World of the first corner.
        first: String,
        /// World of the second corner.
        second: String,
    },
}

/// Errors from region authoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// The selection is incomplete or spans two worlds.
    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] SelectionProblem),
    /// No region has this name.
    #[error("unknown region `{0}`")]
    UnknownRegion(String),
}

/// Why a raw region could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawRegionError {
    /// A corner string is malformed.
    #[error("invalid corner: {0}")]
    Corner(#[from] CornerParseError),
    /// The two corners name different worlds.
    #[error("corners are in different worlds ({0} and {1})")]
    WorldMismatch(String, String),
    /// The world is not loaded yet.
    #[error("world `{0}` is not loaded")]
    WorldNotLoaded(String),
}

impl RawRegionError {
    /// Whether retrying later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WorldNotLoaded(_))
    }
}

/// A named box in one world.
///
/// Invariant: `min <= max` on every axis. [`SpatialRegion::new`] sorts the
/// corners, and the fields are private so the box is only ever replaced whole.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialRegion {
    name: String,
    world: String,
    min: DVec3,
    max: DVec3,
}

impl SpatialRegion {
    /// Creates a region from any two opposite corners.
    pub fn new(name: impl Into<String>, world: impl Into<String>, a: DVec3, b: DVec3) -> Self {
        Self {
            name: name.into(),
            world: world.into(),
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World the region lies in.
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Minimum corner.
    pub fn min(&self) -> DVec3 {
        self.min
    }

    /// Maximum corner.
    pub fn max(&self) -> DVec3 {
        self.max
    }

    /// Returns `true` if `point` in `world` lies inside or on the boundary.
    pub fn contains(&self, world: &str, point: DVec3) -> bool {
        world == self.world
            && point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Containment test for a continuous location.
    pub fn contains_location(&self, location: &Location) -> bool {
        self.contains(&location.world, location.position())
    }

    /// Containment test for a block cell, using its minimum corner.
    pub fn contains_block(&self, block: &BlockLocation) -> bool {
        self.contains(&block.world, block.position())
    }

    /// Converts back to the textual form used on disk.
    pub fn to_raw(&self) -> RawRegion {
        RawRegion {
            name: self.name.clone(),
            min: format_corner(&self.world, self.min),
            max: format_corner(&self.world, self.max),
            reattempt: false,
        }
    }
}

/// A region as read from storage, before its world has been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRegion {
    /// Region name.
    pub name: String,
    /// Minimum corner string, `world,x,y,z`.
    pub min: String,
    /// Maximum corner string, `world,x,y,z`.
    pub max: String,
    /// Whether resolution should be retried later.
    pub reattempt: bool,
}

impl RawRegion {
    /// Creates a raw region that will be retried.
    pub fn new(name: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: min.into(),
            max: max.into(),
            reattempt: true,
        }
    }

    /// Parses both corners and checks that their world is loaded.
    pub fn build(&self, worlds: &dyn WorldResolver) -> Result<SpatialRegion, RawRegionError> {
        let (min_world, min) = parse_corner(&self.min)?;
        let (max_world, max) = parse_corner(&self.max)?;

        if min_world != max_world {
            return Err(RawRegionError::WorldMismatch(min_world, max_world));
        }
        if !worlds.world_loaded(&min_world) {
            return Err(RawRegionError::WorldNotLoaded(min_world));
        }

        Ok(SpatialRegion::new(self.name.clone(), min_world, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryWorld;

    fn cube() -> SpatialRegion {
        SpatialRegion::new("mine", "world", DVec3::ZERO, DVec3::splat(10.0))
    }

    #[test]
    fn test_corners_are_normalized() {
        let region = SpatialRegion::new(
            "r",
            "world",
            DVec3::new(10.0, -5.0, 3.0),
            DVec3::new(-2.0, 8.0, 1.0),
        );
        assert_eq!(region.min(), DVec3::new(-2.0, -5.0, 1.0));
        assert_eq!(region.max(), DVec3::new(10.0, 8.0, 3.0));
    }

    #[test]
    fn test_contains_inside_and_boundary() {
        let region = cube();
        assert!(region.contains("world", DVec3::splat(5.0)));
        assert!(region.contains("world", DVec3::ZERO));
        assert!(region.contains("world", DVec3::splat(10.0)));
        assert!(region.contains("world", DVec3::new(10.0, 0.0, 5.0)));
    }

    #[test]
    fn test_contains_outside() {
        let region = cube();
        assert!(!region.contains("world", DVec3::new(11.0, 0.0, 0.0)));
        assert!(!region.contains("world", DVec3::new(5.0, -0.01, 5.0)));
        assert!(!region.contains("nether", DVec3::splat(5.0)));
    }

    #[test]
    fn test_contains_block_and_location() {
        let region = cube();
        assert!(region.contains_block(&BlockLocation::new("world", 10, 10, 10)));
        assert!(!region.contains_block(&BlockLocation::new("world", 11, 0, 0)));
        assert!(region.contains_location(&Location::new("world", 9.5, 0.2, 3.0)));
    }

    #[test]
    fn test_raw_roundtrip() {
        let host = MemoryWorld::with_worlds(["world"]);
        let raw = cube().to_raw();
        assert_eq!(raw.min, "world,0,0,0");
        assert_eq!(raw.max, "world,10,10,10");
        assert_eq!(raw.build(&host).unwrap(), cube());
    }

    #[test]
    fn test_raw_world_not_loaded_is_retryable() {
        let host = MemoryWorld::new();
        let err = cube().to_raw().build(&host).unwrap_err();
        assert_eq!(err, RawRegionError::WorldNotLoaded("world".to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_raw_malformed_is_not_retryable() {
        let host = MemoryWorld::with_worlds(["world"]);
        let raw = RawRegion::new("broken", "", "world,1,2,3");
        let err = raw.build(&host).unwrap_err();
        assert_eq!(err, RawRegionError::Corner(CornerParseError::Empty));
        assert!(!err.is_retryable());

        let mixed = RawRegion::new("mixed", "world,0,0,0", "nether,1,1,1");
        assert!(matches!(
            mixed.build(&host),
            Err(RawRegionError::WorldMismatch(_, _))
        ));
    }
}
