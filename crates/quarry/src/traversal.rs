//! Traversal planning — deterministic excavation order for a region.
//!
//! The plan is a pure function of the normalized region: layers are taken
//! top-down (digging a ceiling before the floor under it avoids collapse and
//! fall hazards), rows advance along `z`, and each row scans `x` in
//! alternating direction so the agent never walks back across a finished
//! row. Because any `(region, index)` pair maps to exactly one coordinate,
//! resuming at index `k` revisits precisely the block an uninterrupted run
//! would have visited.

use crate::region::{BlockPos, NormalizedRegion};

/// Ordered sequence of dig targets for one region.
#[derive(Debug, Clone, Copy)]
pub struct TraversalPlan {
    region: NormalizedRegion,
}

impl TraversalPlan {
    pub fn new(region: NormalizedRegion) -> Self {
        Self { region }
    }

    /// Total number of targets (the region's volume).
    pub fn len(&self) -> u64 {
        self.region.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unique coordinate at `index`, or `None` past the end.
    ///
    /// Index arithmetic rather than iteration so resuming at a large offset
    /// is O(1).
    pub fn coordinate_at(&self, index: u64) -> Option<BlockPos> {
        if index >= self.len() {
            return None;
        }

        let r = &self.region;
        let width_x = (r.max.x - r.min.x + 1) as u64;
        let width_z = (r.max.z - r.min.z + 1) as u64;
        let layer_size = width_x * width_z;

        let layer = index / layer_size;
        let within_layer = index % layer_size;
        let row = within_layer / width_x;
        let col = within_layer % width_x;

        let y = r.max.y - layer as i32;
        let z = r.min.z + row as i32;
        // Even rows ascend, odd rows descend (boustrophedon).
        let x = if row % 2 == 0 {
            r.min.x + col as i32
        } else {
            r.max.x - col as i32
        };

        Some(BlockPos::new(x, y, z))
    }

    /// Iterate targets starting from `start_index`.
    pub fn iter_from(&self, start_index: u64) -> TraversalIter {
        TraversalIter {
            plan: *self,
            next: start_index,
        }
    }
}

impl IntoIterator for TraversalPlan {
    type Item = BlockPos;
    type IntoIter = TraversalIter;

    fn into_iter(self) -> TraversalIter {
        self.iter_from(0)
    }
}

/// Iterator over a traversal plan.
#[derive(Debug, Clone)]
pub struct TraversalIter {
    plan: TraversalPlan,
    next: u64,
}

impl Iterator for TraversalIter {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        let coord = self.plan.coordinate_at(self.next)?;
        self.next += 1;
        Some(coord)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}
