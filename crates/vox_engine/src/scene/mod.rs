//! Scene management system
//!
//! Owns the transform hierarchy, the spatial index, and the physics
//! bookkeeping queues, and keeps them mutually consistent across the two
//! ordered passes of a simulation tick.
//!
//! ## Architecture
//!
//! ```text
//! hierarchy  →  physics  →  spatial index  →  bookkeeping queues
//! ```
//!
//! Data flows strictly left to right during `simulate`; structural changes
//! flow back into the hierarchy only during the `end_of_frame` drain phases.

mod graph;
mod shape;
mod transform_node;

pub use graph::{Scene, SceneInstrumentation};
pub use shape::Shape;
pub use transform_node::{TransformFlags, TransformId, TransformNode};
