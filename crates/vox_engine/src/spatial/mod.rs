//! Spatial partitioning data structures
//!
//! Provides the axis-aligned bounding box primitive and the bounded-fanout
//! R-tree used as the scene's collision index.

mod aabb;
mod rtree;

pub use aabb::{Aabb, MERGE_EPSILON};
pub use rtree::{Rtree, RtreeLeafId};
