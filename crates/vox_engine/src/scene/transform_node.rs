//! Transform hierarchy node
//!
//! Nodes live in the scene's arena and reference each other by
//! generation-checked ids, so a stale id resolves to nothing instead of
//! dangling. Dirty flags drive the per-tick synchronization passes; the
//! hierarchy-dirty flag is only cleared deep-first, after every descendant
//! has had a chance to observe it.

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::foundation::math::{lossy_scale, Mat4, Transform, Vec3};
use crate::physics::RigidBody;
use crate::spatial::Aabb;

use super::Shape;

new_key_type! {
    /// Generation-checked handle to a transform node
    ///
    /// Doubles as the weak-reference mechanism: after the node is destroyed,
    /// lookups through a stale id yield `None`.
    pub struct TransformId;
}

bitflags! {
    /// Per-node state flags driving the synchronization passes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransformFlags: u8 {
        /// Local pose or parent changed since the flag was last cleared
        /// (cleared deep-first, after all descendants were visited)
        const HIERARCHY_DIRTY = 1 << 0;
        /// World pose changed since the last spatial index sync
        const PHYSICS_DIRTY = 1 << 1;
        /// Scene membership changed since the last commit pass
        const SCENE_DIRTY = 1 << 2;
        /// Node was inside the hierarchy at the last commit pass
        const IN_SCENE = 1 << 3;
    }
}

/// A node of the transform hierarchy
#[derive(Debug, Clone)]
pub struct TransformNode {
    pub(crate) parent: Option<TransformId>,
    pub(crate) children: Vec<TransformId>,
    local: Transform,
    world: Mat4,
    pub(crate) flags: TransformFlags,
    pub(crate) rigid_body: Option<RigidBody>,
    pub(crate) shape: Option<Shape>,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformNode {
    /// Create a detached node with an identity local pose
    pub fn new() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            local: Transform::identity(),
            world: Mat4::identity(),
            flags: TransformFlags::HIERARCHY_DIRTY | TransformFlags::SCENE_DIRTY,
            rigid_body: None,
            shape: None,
        }
    }

    /// Builder pattern: Set the local pose
    pub fn with_local(mut self, local: Transform) -> Self {
        self.local = local;
        self
    }

    /// Builder pattern: Attach a rigid body
    pub fn with_rigid_body(mut self, rigid_body: RigidBody) -> Self {
        self.rigid_body = Some(rigid_body);
        self
    }

    /// Builder pattern: Attach a renderable shape
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Parent node id, if attached
    pub fn parent(&self) -> Option<TransformId> {
        self.parent
    }

    /// Child node ids
    pub fn children(&self) -> &[TransformId] {
        &self.children
    }

    /// Local pose
    pub fn local(&self) -> &Transform {
        &self.local
    }

    /// Replace the local pose and mark the hierarchy dirty
    pub fn set_local(&mut self, local: Transform) {
        self.local = local;
        self.flags.insert(TransformFlags::HIERARCHY_DIRTY);
    }

    /// Move the local position and mark the hierarchy dirty
    pub fn set_local_position(&mut self, position: Vec3) {
        self.local.position = position;
        self.flags.insert(TransformFlags::HIERARCHY_DIRTY);
    }

    /// Cached world matrix (valid after the last refresh)
    pub fn world(&self) -> Mat4 {
        self.world
    }

    /// Whether the local pose or parent changed since the last deep-first clear
    pub fn is_hierarchy_dirty(&self) -> bool {
        self.flags.contains(TransformFlags::HIERARCHY_DIRTY)
    }

    /// Whether the node was inside the hierarchy at the last commit pass
    pub fn is_in_scene(&self) -> bool {
        self.flags.contains(TransformFlags::IN_SCENE)
    }

    /// Whether scene membership changed since the last commit pass
    pub fn is_scene_dirty(&self) -> bool {
        self.flags.contains(TransformFlags::SCENE_DIRTY)
    }

    pub(crate) fn set_scene_dirty(&mut self, dirty: bool) {
        self.flags.set(TransformFlags::SCENE_DIRTY, dirty);
    }

    pub(crate) fn set_in_scene(&mut self, in_scene: bool) {
        self.flags.set(TransformFlags::IN_SCENE, in_scene);
    }

    /// Attached rigid body
    pub fn rigid_body(&self) -> Option<&RigidBody> {
        self.rigid_body.as_ref()
    }

    /// Attached rigid body, mutable
    pub fn rigid_body_mut(&mut self) -> Option<&mut RigidBody> {
        self.rigid_body.as_mut()
    }

    /// Attached shape payload
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// Attached shape payload, mutable
    pub fn shape_mut(&mut self) -> Option<&mut Shape> {
        self.shape.as_mut()
    }

    /// Recompute the cached world matrix if this node or an ancestor changed
    ///
    /// Does NOT clear the hierarchy-dirty flag; descendants still need to
    /// observe it during their own refresh. [`Self::refresh_children_done`]
    /// clears it once the subtree has been visited.
    pub(crate) fn refresh(&mut self, parent_world: &Mat4, ancestor_dirty: bool, force: bool) {
        if force || ancestor_dirty || self.is_hierarchy_dirty() {
            self.world = parent_world * self.local.to_matrix();
            self.flags.insert(TransformFlags::PHYSICS_DIRTY);
        }
    }

    /// Deep-first clear of the intra-frame refresh flags
    pub(crate) fn refresh_children_done(&mut self) {
        self.flags.remove(TransformFlags::HIERARCHY_DIRTY);
    }

    /// World-space collider box, if a rigid body is attached
    pub fn world_collider(&self) -> Option<Aabb> {
        self.rigid_body
            .as_ref()
            .map(|rb| rb.collider().transformed(&self.world))
    }

    /// Per-axis world scale magnitudes
    pub fn lossy_world_scale(&self) -> Vec3 {
        lossy_scale(&self.world)
    }
}
