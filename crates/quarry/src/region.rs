//! Geometry primitives — positions, regions, and block metadata.
//!
//! A `Region` is whatever two corners the user clicked; `NormalizedRegion`
//! is its min/max-ordered form and the only shape the rest of the crate
//! accepts. Normalization happens exactly once, at the start of a run.

use serde::{Deserialize, Serialize};

/// Continuous position in world space (entity coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance ignoring the vertical axis.
    pub fn horizontal_distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// The block this position falls inside.
    pub fn floored(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Integer voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Center of the block face-on, where the agent should look to dig it.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn distance_to(&self, point: &Vec3) -> f64 {
        self.center().distance_to(point)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Two arbitrary corner coordinates as selected by the user.
///
/// Carries no ordering invariant; call [`Region::normalized`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub corner_a: BlockPos,
    pub corner_b: BlockPos,
}

impl Region {
    pub fn new(corner_a: BlockPos, corner_b: BlockPos) -> Self {
        Self { corner_a, corner_b }
    }

    /// Order the corners componentwise into a canonical min/max pair.
    pub fn normalized(&self) -> NormalizedRegion {
        NormalizedRegion {
            min: BlockPos::new(
                self.corner_a.x.min(self.corner_b.x),
                self.corner_a.y.min(self.corner_b.y),
                self.corner_a.z.min(self.corner_b.z),
            ),
            max: BlockPos::new(
                self.corner_a.x.max(self.corner_b.x),
                self.corner_a.y.max(self.corner_b.y),
                self.corner_a.z.max(self.corner_b.z),
            ),
        }
    }
}

/// Canonical cuboid with `min <= max` componentwise.
///
/// Immutable for the lifetime of a run; the traversal plan and the persisted
/// progress file are both derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl NormalizedRegion {
    /// Number of blocks in the cuboid.
    pub fn volume(&self) -> u64 {
        let dx = (self.max.x - self.min.x + 1) as u64;
        let dy = (self.max.y - self.min.y + 1) as u64;
        let dz = (self.max.z - self.min.z + 1) as u64;
        dx * dy * dz
    }

    pub fn contains(&self, pos: &BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Geometric center, used when navigating toward the work site.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) as f64 / 2.0 + 0.5,
            (self.min.y + self.max.y) as f64 / 2.0 + 0.5,
            (self.min.z + self.max.z) as f64 / 2.0 + 0.5,
        )
    }
}

impl std::fmt::Display for NormalizedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// What the world reports about one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block name as the server reports it (e.g., "stone").
    pub name: String,
    /// Whether a tool exists that can break this block.
    pub diggable: bool,
    /// Whether the agent can move through it.
    pub passable: bool,
    /// Hardness in dig-time units; `None` means indestructible terrain.
    pub hardness: Option<f64>,
}

impl BlockInfo {
    pub fn is_air(&self) -> bool {
        self.name == "air"
    }

    /// Terrain no tool can break, whether by missing hardness or an
    /// explicit undiggable flag. Never a dig or recovery-clear candidate.
    pub fn is_indestructible(&self) -> bool {
        !self.diggable || self.hardness.is_none()
    }

    /// Solid enough to suffocate in or to block a path.
    pub fn is_obstruction(&self) -> bool {
        !self.is_air() && !self.passable
    }
}
