//! World locations: continuous points, block cells, and the textual corner codec.
//!
//! A [`Location`] is a point in one world with `f64` coordinates, as reported by
//! the host for a player click or a block event. A [`BlockLocation`] is the
//! integer cell containing it. Regeneration tasks are keyed by block location,
//! so two locations inside the same cell always map to the same task.

use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the fields of a corner string.
const CORNER_SEPARATOR: char = ',';

/// A point in a named world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// World name.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Location {
    /// Creates a location from a world name and coordinates.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The coordinates as a vector.
    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// The block cell containing this point. Each axis is floored, so
    /// `-0.5` lands in cell `-1`.
    pub fn block(&self) -> BlockLocation {
        BlockLocation {
            world: self.world.clone(),
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }
}

/// An integer block cell in a named world.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockLocation {
    /// World name.
    pub world: String,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
}

impl BlockLocation {
    /// Creates a block location.
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The minimum corner of the cell as a vector.
    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// The minimum corner of the cell as a continuous location.
    pub fn to_location(&self) -> Location {
        Location::new(self.world.clone(), self.x as f64, self.y as f64, self.z as f64)
    }
}

impl From<&Location> for BlockLocation {
    fn from(location: &Location) -> Self {
        location.block()
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Errors produced while parsing a corner string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CornerParseError {
    /// The string is empty.
    #[error("empty corner string")]
    Empty,
    /// The string does not have the `world,x,y,z` shape.
    #[error("expected `world,x,y,z`, got `{0}`")]
    Malformed(String),
    /// A coordinate is not a finite number.
    #[error("invalid coordinate `{0}`")]
    InvalidCoordinate(String),
}

/// Formats a region corner as `world,x,y,z`.
pub fn format_corner(world: &str, point: DVec3) -> String {
    format!(
        "{world}{sep}{}{sep}{}{sep}{}",
        point.x,
        point.y,
        point.z,
        sep = CORNER_SEPARATOR
    )
}

/// Parses a `world,x,y,z` corner string.
///
/// Fields are split from the right, so a world name containing the separator
/// still round-trips through [`format_corner`].
pub fn parse_corner(input: &str) -> Result<(String, DVec3), CornerParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CornerParseError::Empty);
    }

    let mut fields = input.rsplitn(4, CORNER_SEPARATOR);
    let (Some(z), Some(y), Some(x), Some(world)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(CornerParseError::Malformed(input.to_string()));
    };

    if world.is_empty() {
        return Err(CornerParseError::Malformed(input.to_string()));
    }

    let coord = |raw: &str| -> Result<f64, CornerParseError> {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CornerParseError::InvalidCoordinate(raw.to_string()))
    };

    Ok((world.to_string(), DVec3::new(coord(x)?, coord(y)?, coord(z)?)))
}
