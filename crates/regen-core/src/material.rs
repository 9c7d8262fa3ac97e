//! Material identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A block or item material, identified by its upper-case name (`"STONE"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(String);

impl MaterialId {
    /// Empty space.
    pub const AIR_NAME: &'static str = "AIR";

    /// Creates a material id, normalizing the name to upper case with
    /// underscores (`"diamond pickaxe"` becomes `"DIAMOND_PICKAXE"`).
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_uppercase().replace([' ', '-'], "_"))
    }

    /// The air material.
    pub fn air() -> Self {
        Self(Self::AIR_NAME.to_string())
    }

    /// Returns `true` for air.
    pub fn is_air(&self) -> bool {
        self.0 == Self::AIR_NAME
    }

    /// The normalized material name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MaterialId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
