//! # Vox Engine
//!
//! Per-frame scene synchronization for a voxel game engine.
//!
//! The crate keeps three things mutually consistent across a simulation tick:
//! a hierarchical transform tree, an R-tree of collidable volumes, and the
//! physics bookkeeping around them (collision couples, sleep/wake regions,
//! deferred destruction).
//!
//! ## Tick structure
//!
//! ```text
//! Scene::simulate(dt)       top-down physics + spatial index update
//! Scene::end_of_frame(dt)   commit hierarchy membership, then drain:
//!                             1. removal queue   (cascading teardown)
//!                             2. collision registry (end-of-contact)
//!                             3. awake regions   (wake sleeping bodies)
//!                             4. mask commit     (deferred index masks)
//! ```
//!
//! Structural mutation (spawn, re-parent, removal) requested while a tick is
//! running is buffered and becomes authoritative during `end_of_frame`, never
//! mid-walk.
//!
//! ## Quick Start
//!
//! ```rust
//! use vox_engine::prelude::*;
//!
//! let mut scene = Scene::new(SceneConfig::default());
//! let root = scene.root();
//!
//! let node = TransformNode::new()
//!     .with_rigid_body(RigidBody::new(Aabb::from_center_extents(
//!         Vec3::zeros(),
//!         Vec3::new(0.5, 0.5, 0.5),
//!     )));
//! let id = scene.spawn(root, node);
//!
//! scene.simulate(1.0 / 60.0);
//! scene.end_of_frame(1.0 / 60.0);
//! assert!(scene.is_in_scene(id));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod foundation;
pub mod physics;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ConfigError, PhysicsConfig, SceneConfig},
        foundation::math::{Mat4, Quat, Transform, Vec3},
        physics::{AxesMask, PhysicsGroups, RigidBody},
        scene::{Scene, SceneInstrumentation, Shape, TransformId, TransformNode},
        spatial::{Aabb, Rtree},
    };
}
