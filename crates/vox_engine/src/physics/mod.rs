//! Physics bookkeeping consumed by the scene synchronization passes
//!
//! Provides collision group filtering, contact axis masks, and the per-node
//! rigid body state (enable/validity flags, masks, sleep/wake state, and the
//! per-tick integration entry point).

pub mod axes;
pub mod groups;
pub mod rigid_body;

pub use axes::AxesMask;
pub use groups::PhysicsGroups;
pub use rigid_body::{check_end_of_contact, RigidBody};
