//! Location Addressing
//!
//! Block locations identify containers; positions place observers and display
//! entities. The location key is the canonical string used for shop identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vertical offset of the display anchor above the container block
pub const ANCHOR_HEIGHT: f64 = 1.3;

/// Integer block coordinates in a named world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockLocation {
    pub fn new(world: &str, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.to_string(),
            x,
            y,
            z,
        }
    }

    /// Canonical key: `{world}_{x}_{y}_{z}`
    pub fn key(&self) -> String {
        format!("{}_{}_{}_{}", self.world, self.x, self.y, self.z)
    }

    /// Center of the block's top face, shifted up by `height`
    pub fn center_at(&self, height: f64) -> Position {
        Position::new(
            &self.world,
            self.x as f64 + 0.5,
            self.y as f64 + height,
            self.z as f64 + 0.5,
        )
    }

    /// Point that proximity checks are measured against
    pub fn display_anchor(&self) -> Position {
        self.center_at(ANCHOR_HEIGHT)
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Real-valued position in a named world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(world: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.to_string(),
            x,
            y,
            z,
        }
    }

    /// Block containing this position
    pub fn block(&self) -> BlockLocation {
        BlockLocation {
            world: self.world.clone(),
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// Squared distance, or `None` when the positions are in different worlds
    pub fn distance_squared(&self, other: &Position) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dx * dx + dy * dy + dz * dz)
    }

    /// Strictly closer than `radius`
    pub fn within(&self, other: &Position, radius: f64) -> bool {
        self.distance_squared(other)
            .map_or(false, |d| d < radius * radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_key() {
        assert_eq!(BlockLocation::new("world", 10, 64, -20).key(), "world_10_64_-20");
        assert_eq!(BlockLocation::new("nether", 0, 0, 0).key(), "nether_0_0_0");
    }

    #[test]
    fn test_position_block() {
        let pos = Position::new("world", -0.5, 64.9, 3.2);
        assert_eq!(pos.block(), BlockLocation::new("world", -1, 64, 3));
    }

    #[test]
    fn test_display_anchor() {
        let anchor = BlockLocation::new("world", 1, 2, 3).display_anchor();
        assert_eq!(anchor, Position::new("world", 1.5, 3.3, 3.5));
    }

    #[test]
    fn test_within_radius() {
        let a = Position::new("world", 0.0, 0.0, 0.0);
        let b = Position::new("world", 3.0, 4.0, 0.0);
        assert!(a.within(&b, 5.1));
        // Strict comparison
        assert!(!a.within(&b, 5.0));
        // Different worlds are never in range
        let c = Position::new("nether", 0.0, 0.0, 0.0);
        assert!(!a.within(&c, 1000.0));
    }
}
