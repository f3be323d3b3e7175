//! The scene graph and its per-tick synchronization passes
//!
//! [`Scene`] owns the transform arena, the spatial index, and three pieces of
//! physics bookkeeping: the deferred-removal queue, the collision couple
//! registry, and the awake region set. One tick is `simulate` followed by
//! `end_of_frame`; both walk the hierarchy top-down-then-bottom-up, and the
//! commit pass finishes with four drain phases in a fixed order (removals,
//! collisions, awake regions, mask commit).
//!
//! Structural mutation while a walk is in progress is forbidden; requests
//! made from inside a tick are buffered through the removal queue and the
//! scene-dirty protocol and resolved during the commit drain.

use std::collections::VecDeque;

use log::{debug, trace, warn};
use slotmap::SlotMap;

use crate::core::config::SceneConfig;
use crate::foundation::math::{Mat4, Vec3};
use crate::physics::{check_end_of_contact, AxesMask, PhysicsGroups, RigidBody};
use crate::spatial::{Aabb, Rtree, RtreeLeafId, MERGE_EPSILON};

use super::{TransformFlags, TransformId, TransformNode};

/// Tracked pair of transforms currently in contact
///
/// Participants are held weakly: either may be destroyed independently, in
/// which case the couple treats the vanished side as an implicit end of
/// contact.
#[derive(Debug)]
struct CollisionCouple {
    t1: TransformId,
    t2: TransformId,
    axes: AxesMask,
    frames: u32,
}

/// Injectable instrumentation hooks for the scene's drain phases
///
/// All hooks default to no-ops; install an implementation with
/// [`Scene::set_instrumentation`] to collect counters in tests or tooling.
pub trait SceneInstrumentation {
    /// Called once per drained awake region, with the number of leaf hits
    fn on_awake_query(&mut self, _hits: usize) {}

    /// Called when a queued transform is finalized and destroyed
    fn on_transform_removed(&mut self) {}
}

/// The scene: transform hierarchy, spatial index, and physics bookkeeping
pub struct Scene {
    nodes: SlotMap<TransformId, TransformNode>,
    root: TransformId,
    /// Weak reference to the map subtree; the hierarchy owns the node
    map: Option<TransformId>,
    rtree: Rtree,

    /// Transforms pending deferred destruction; a queued id's slot is only
    /// reclaimed inside the removal drain
    removed: VecDeque<TransformId>,

    /// Couples waiting for their end-of-contact
    collisions: Vec<CollisionCouple>,

    /// Merged regions to re-evaluate for sleeping bodies at end of frame
    awake_regions: Vec<Aabb>,
    /// Index of the running map-region accumulator within `awake_regions`
    map_region: Option<usize>,

    /// Constant acceleration applied to every body (gravity, usually)
    constant_acceleration: Vec3,

    config: SceneConfig,
    instrumentation: Option<Box<dyn SceneInstrumentation>>,
}

impl Scene {
    /// Create a scene with an empty hierarchy and a fresh spatial index
    pub fn new(config: SceneConfig) -> Self {
        debug_assert!(config.physics.validate().is_ok(), "invalid physics config");

        let mut nodes = SlotMap::with_key();
        let mut root_node = TransformNode::new();
        root_node.set_in_scene(true);
        root_node.set_scene_dirty(false);
        let root = nodes.insert(root_node);

        let constant_acceleration = config.physics.gravity_vec();
        Self {
            nodes,
            root,
            map: None,
            rtree: Rtree::new(
                config.physics.rtree_min_per_node,
                config.physics.rtree_max_per_node,
            ),
            removed: VecDeque::new(),
            collisions: Vec::new(),
            awake_regions: Vec::new(),
            map_region: None,
            constant_acceleration,
            config,
            instrumentation: None,
        }
    }

    /// Id of the hierarchy root
    pub fn root(&self) -> TransformId {
        self.root
    }

    /// The spatial index
    pub fn rtree(&self) -> &Rtree {
        &self.rtree
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Install instrumentation hooks for the drain phases
    pub fn set_instrumentation(&mut self, hook: Box<dyn SceneInstrumentation>) {
        self.instrumentation = Some(hook);
    }

    // MARK: - Hierarchy -

    /// Insert a node under `parent` and return its id
    ///
    /// An attached shape defines the rigid body's collider.
    pub fn spawn(&mut self, parent: TransformId, mut node: TransformNode) -> TransformId {
        debug_assert!(self.nodes.contains_key(parent), "spawn under a dead parent");
        node.parent = Some(parent);
        node.flags
            .insert(TransformFlags::HIERARCHY_DIRTY | TransformFlags::SCENE_DIRTY);
        if let (Some(shape), Some(rb)) = (node.shape.as_ref(), node.rigid_body.as_mut()) {
            rb.set_collider(shape.bounds());
        }

        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        } else {
            warn!("spawn: parent transform is gone, node left detached");
        }
        id
    }

    /// Re-parent a node; cancels a pending removal once the commit pass runs
    pub fn set_parent(&mut self, child: TransformId, parent: TransformId) {
        debug_assert!(child != parent, "cannot parent a transform to itself");
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            warn!("set_parent: stale transform id, ignored");
            return;
        }

        if let Some(old_parent) = self.nodes[child].parent {
            if let Some(old) = self.nodes.get_mut(old_parent) {
                old.children.retain(|c| *c != child);
            }
        }
        self.nodes[parent].children.push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.flags
            .insert(TransformFlags::HIERARCHY_DIRTY | TransformFlags::SCENE_DIRTY);
    }

    /// Detach a node and queue it for deferred destruction
    ///
    /// The node is destroyed during the next commit drain unless it is
    /// re-parented back into the hierarchy before then.
    pub fn remove(&mut self, id: TransformId) {
        debug_assert!(id != self.root, "cannot remove the hierarchy root");
        if id == self.root || !self.nodes.contains_key(id) {
            return;
        }
        self.register_removed_transform(id);
        self.detach(id);
        trace!("transform queued for removal");
    }

    /// Queue a transform for the removal drain without detaching it
    ///
    /// If the transform is still (or again) inside the hierarchy at commit,
    /// it is dequeued without destruction.
    pub fn register_removed_transform(&mut self, id: TransformId) {
        if !self.nodes.contains_key(id) {
            return;
        }
        // The queue keeps the slot alive until the drain resolves its fate
        self.removed.push_back(id);
    }

    /// Resolve a node, if still alive
    pub fn node(&self, id: TransformId) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    /// Resolve a node mutably, if still alive
    pub fn node_mut(&mut self, id: TransformId) -> Option<&mut TransformNode> {
        self.nodes.get_mut(id)
    }

    /// Whether the id still resolves to a live node
    pub fn contains(&self, id: TransformId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Whether the node was inside the hierarchy at the last commit pass
    pub fn is_in_scene(&self, id: TransformId) -> bool {
        self.nodes.get(id).is_some_and(TransformNode::is_in_scene)
    }

    /// Spatial leaf handle of a node's rigid body, if any
    pub fn leaf_of(&self, id: TransformId) -> Option<RtreeLeafId> {
        self.nodes
            .get(id)
            .and_then(|n| n.rigid_body.as_ref())
            .and_then(RigidBody::leaf)
    }

    fn detach(&mut self, id: TransformId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        self.nodes[id].set_scene_dirty(true);
    }

    // MARK: - Map -

    /// Attach the static map subtree under the root
    ///
    /// A previously attached map is detached first. The scene keeps only a
    /// weak reference; the hierarchy owns the node.
    pub fn attach_map(&mut self, id: TransformId) {
        debug_assert!(self.nodes.contains_key(id), "attach_map: dead transform");
        if !self.nodes.contains_key(id) {
            return;
        }
        if let Some(old) = self.map.take() {
            if self.nodes.contains_key(old) {
                self.detach(old);
            }
        }
        self.map = Some(id);
        let root = self.root;
        self.set_parent(id, root);
        debug!("map attached to the scene");
    }

    /// Detach the map subtree, if any
    pub fn detach_map(&mut self) {
        if let Some(map) = self.map.take() {
            if self.nodes.contains_key(map) {
                self.detach(map);
            }
            debug!("map detached from the scene");
        }
    }

    /// Id of the attached map subtree, if any
    pub fn map(&self) -> Option<TransformId> {
        self.map
    }

    // MARK: - Acceleration -

    /// Constant acceleration applied during integration
    pub fn constant_acceleration(&self) -> Vec3 {
        self.constant_acceleration
    }

    /// Replace the constant acceleration vector
    pub fn set_constant_acceleration(&mut self, acceleration: Vec3) {
        self.constant_acceleration = acceleration;
    }

    /// Update individual components of the constant acceleration
    pub fn set_constant_acceleration_axes(
        &mut self,
        x: Option<f32>,
        y: Option<f32>,
        z: Option<f32>,
    ) {
        if let Some(x) = x {
            self.constant_acceleration.x = x;
        }
        if let Some(y) = y {
            self.constant_acceleration.y = y;
        }
        // Known quirk, kept on purpose: a z input lands in the x component.
        // Callers needing the full vector use `set_constant_acceleration`.
        if let Some(z) = z {
            self.constant_acceleration.x = z;
        }
    }

    // MARK: - Registration -

    /// Track a contact between two transforms until it ends
    pub fn register_collision_couple(&mut self, t1: TransformId, t2: TransformId, axes: AxesMask) {
        if !self.nodes.contains_key(t1) || !self.nodes.contains_key(t2) {
            warn!("register_collision_couple: stale transform id, ignored");
            return;
        }
        self.collisions.push(CollisionCouple {
            t1,
            t2,
            axes,
            frames: 0,
        });
    }

    /// Number of couples currently tracked
    pub fn collision_couple_count(&self) -> usize {
        self.collisions.len()
    }

    /// Drop every tracked couple immediately
    ///
    /// Weak participant handles need no individual release; dropping the
    /// couples invalidates them atomically.
    pub fn clear_collision_couples(&mut self) {
        self.collisions.clear();
    }

    /// Queue a region for the end-of-frame awake phase
    ///
    /// Zero-volume regions are discarded. A region overlapping an already
    /// pending one (map accumulator excluded) is merged into it in place, so
    /// the per-frame query count stays proportional to the number of disjoint
    /// active areas.
    pub fn register_awake_region(&mut self, region: Aabb) {
        if region.is_empty(self.config.physics.collision_epsilon) {
            return;
        }
        for (i, existing) in self.awake_regions.iter_mut().enumerate() {
            if self.map_region == Some(i) {
                continue;
            }
            if existing.intersects_epsilon(&region, MERGE_EPSILON) {
                existing.merge(&region);
                return;
            }
        }
        self.awake_regions.push(region);
    }

    /// Queue the world-space box of a map cell for the awake phase
    ///
    /// Map edits accumulate into a single running region per frame instead of
    /// one region per edited cell.
    pub fn register_awake_region_for_map(&mut self, x: i32, y: i32, z: i32) {
        let Some(map) = self.map else {
            warn!("register_awake_region_for_map: no map attached");
            return;
        };
        let Some(node) = self.nodes.get(map) else {
            warn!("register_awake_region_for_map: map transform is gone");
            return;
        };

        let scale = node.lossy_world_scale();
        let margin = self.config.physics.awake_distance;
        #[allow(clippy::cast_precision_loss)]
        let region = Aabb::new(
            Vec3::new(
                x as f32 * scale.x - margin,
                y as f32 * scale.y - margin,
                z as f32 * scale.z - margin,
            ),
            Vec3::new(
                (x + 1) as f32 * scale.x + margin,
                (y + 1) as f32 * scale.y + margin,
                (z + 1) as f32 * scale.z + margin,
            ),
        );

        match self.map_region {
            Some(i) => self.awake_regions[i].merge(&region),
            None => {
                self.awake_regions.push(region);
                self.map_region = Some(self.awake_regions.len() - 1);
            }
        }
    }

    /// Number of awake regions pending for the next commit drain
    pub fn pending_awake_regions(&self) -> usize {
        self.awake_regions.len()
    }

    // MARK: - Tick passes -

    /// Simulation pass: top-down physics step and spatial index update
    pub fn simulate(&mut self, dt: f32) {
        trace!("physics step");
        let root_dirty = self.nodes[self.root].is_hierarchy_dirty();
        self.simulate_recurse(self.root, Mat4::identity(), root_dirty, dt);
    }

    /// Commit pass: finalize hierarchy membership, then drain deferred work
    ///
    /// Drain order is fixed: removals, collision couples, awake regions,
    /// spatial index mask commit.
    pub fn end_of_frame(&mut self, _dt: f32) {
        let root_dirty = self.nodes[self.root].is_hierarchy_dirty();
        self.commit_recurse(self.root, Mat4::identity(), root_dirty);

        self.drain_removals();
        self.drain_collisions();
        self.drain_awake_regions();
        self.rtree.refresh_pending_masks();
    }

    /// Single forced refresh with no physics, for non-running contexts
    ///
    /// Applies pending shape transactions and recomputes every world pose.
    pub fn standalone_refresh(&mut self) {
        let mut stack = vec![(self.root, Mat4::identity())];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if let Some(shape) = node.shape.as_mut() {
                if shape.apply_transaction(true) {
                    let bounds = shape.bounds();
                    if let Some(rb) = node.rigid_body.as_mut() {
                        rb.set_collider(bounds);
                    }
                }
            }
            node.refresh(&parent_world, true, true);
            let world = node.world();
            for &child in &node.children {
                stack.push((child, world));
            }
        }
    }

    fn simulate_recurse(
        &mut self,
        id: TransformId,
        parent_world: Mat4,
        ancestor_dirty: bool,
        dt: f32,
    ) {
        // Refresh transform (top-first) after hierarchy changes
        let mut dirty;
        {
            let Some(node) = self.nodes.get_mut(id) else {
                return;
            };
            dirty = node.is_hierarchy_dirty();
            node.refresh(&parent_world, ancestor_dirty, false);
        }

        // Step physics (top-first); integration may move the local pose
        if let Some(mut rb) = self.nodes[id].rigid_body.take() {
            let world = self.nodes[id].world();
            let collider = rb.collider().transformed(&world);
            let mut pose = self.nodes[id].local().clone();
            let contacts = rb.tick(
                &mut pose,
                &collider,
                &self.rtree,
                self.constant_acceleration,
                &self.config.physics,
                dt,
            );
            let node = &mut self.nodes[id];
            if pose != *node.local() {
                node.set_local(pose);
            }
            node.rigid_body = Some(rb);
            if contacts {
                self.register_awake_around(self.leaf_of(id));
            }
        }

        // Refresh transform (top-first) after physics changes
        {
            let node = &mut self.nodes[id];
            dirty = node.is_hierarchy_dirty() || dirty;
            node.refresh(&parent_world, false, false);
        }

        // Update the spatial index (top-first)
        if let Some(collider) = self.nodes[id].world_collider() {
            self.sync_leaf(id, &collider, true);
        }

        // Recurse down the branch; ids are cloned so a buffered structural
        // request cannot invalidate the iteration
        let children = self.nodes[id].children.clone();
        let world = self.nodes[id].world();
        for child in children {
            self.simulate_recurse(child, world, ancestor_dirty || dirty, dt);
        }

        // Clear intra-frame refresh flags (deep-first)
        if let Some(node) = self.nodes.get_mut(id) {
            node.refresh_children_done();
        }
    }

    fn commit_recurse(&mut self, id: TransformId, parent_world: Mat4, ancestor_dirty: bool) {
        // Transform ends the frame inside the scene hierarchy
        let dirty;
        {
            let Some(node) = self.nodes.get_mut(id) else {
                return;
            };
            node.set_scene_dirty(false);
            node.set_in_scene(true);

            dirty = node.is_hierarchy_dirty();
            node.refresh(&parent_world, ancestor_dirty, false);

            // Apply the shape's pending transaction (top-first); this may
            // change the collider
            if let Some(shape) = node.shape.as_mut() {
                if shape.apply_transaction(false) {
                    let bounds = shape.bounds();
                    if let Some(rb) = node.rigid_body.as_mut() {
                        rb.set_collider(bounds);
                    }
                }
            }
        }

        // Update the spatial index (top-first); no awake registration here
        if let Some(collider) = self.nodes[id].world_collider() {
            self.sync_leaf(id, &collider, false);
            self.refresh_leaf_masks(id);
        }

        // Recurse down the branch
        let children = self.nodes[id].children.clone();
        let world = self.nodes[id].world();
        for child in children {
            self.commit_recurse(child, world, ancestor_dirty || dirty);
        }

        // Clear intra-frame refresh flags, refresh geometry (deep-first)
        let headless = self.config.headless;
        if let Some(node) = self.nodes.get_mut(id) {
            node.refresh_children_done();
            if !headless {
                if let Some(shape) = node.shape.as_mut() {
                    shape.refresh_buffers();
                }
            }
        }
    }

    /// Reconcile a node's spatial leaf with its rigid body state
    ///
    /// Awake regions are registered for appearing and disappearing colliders
    /// when `register_awake` is set, never for pure geometric moves.
    fn sync_leaf(&mut self, id: TransformId, collider: &Aabb, register_awake: bool) {
        let Some(mut rb) = self.nodes[id].rigid_body.take() else {
            return;
        };
        let physics_dirty = self.nodes[id].flags.contains(TransformFlags::PHYSICS_DIRTY);

        if rb.is_enabled() {
            if rb.leaf().is_none() {
                // Insert as a new leaf, if the collider is valid; a new
                // collider may overlap sleeping bodies
                if rb.is_collider_valid() {
                    let leaf =
                        self.rtree
                            .insert(*collider, rb.groups(), rb.collides_with(), id);
                    rb.set_leaf(Some(leaf));
                    if register_awake {
                        self.register_awake_around(rb.leaf());
                    }
                }
            } else if rb.collider_dirty() {
                // Replace the leaf after a collider change, or drop it if the
                // collider became invalid
                if register_awake {
                    self.register_awake_around(rb.leaf());
                }
                if let Some(leaf) = rb.leaf() {
                    self.rtree.remove(leaf);
                }
                rb.set_leaf(None);

                if rb.is_collider_valid() {
                    let leaf =
                        self.rtree
                            .insert(*collider, rb.groups(), rb.collides_with(), id);
                    rb.set_leaf(Some(leaf));
                    if register_awake {
                        self.register_awake_around(rb.leaf());
                    }
                }
            } else if physics_dirty {
                // Pure geometric move; integration-triggered wake already
                // covered it
                if let Some(leaf) = rb.leaf() {
                    self.rtree.remove(leaf);
                }
                let leaf = self
                    .rtree
                    .insert(*collider, rb.groups(), rb.collides_with(), id);
                rb.set_leaf(Some(leaf));
            }
        } else if let Some(leaf) = rb.leaf() {
            // Disabled body leaves the index without replacement
            if register_awake {
                self.register_awake_around(rb.leaf());
            }
            self.rtree.remove(leaf);
            rb.set_leaf(None);
        }

        rb.reset_collider_dirty();
        let node = &mut self.nodes[id];
        node.flags.remove(TransformFlags::PHYSICS_DIRTY);
        node.rigid_body = Some(rb);
    }

    /// Push the rigid body's masks to its leaf if they changed since last commit
    fn refresh_leaf_masks(&mut self, id: TransformId) {
        let Some((leaf, groups, collides_with)) = self
            .nodes
            .get(id)
            .and_then(|n| n.rigid_body.as_ref())
            .and_then(|rb| rb.leaf().map(|leaf| (leaf, rb.groups(), rb.collides_with())))
        else {
            return;
        };
        if let Some((current_groups, current_cw)) = self.rtree.leaf_masks(leaf) {
            if current_groups != groups || current_cw != collides_with {
                self.rtree.set_masks(leaf, groups, collides_with);
            }
        }
    }

    /// Register an awake region around a leaf's current bounds
    fn register_awake_around(&mut self, leaf: Option<RtreeLeafId>) {
        let Some(leaf) = leaf else {
            return;
        };
        if let Some(aabb) = self.rtree.leaf_aabb(leaf) {
            let region = aabb.expanded(self.config.physics.awake_distance);
            self.register_awake_region(region);
        }
    }

    // MARK: - Drain phases -

    fn drain_removals(&mut self) {
        while let Some(id) = self.removed.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                // Already torn down by a cascading ancestor
                continue;
            };

            // Still outside the hierarchy at end of frame: proceed with
            // removal. A transform re-parented back before commit was visited
            // by the walk, is no longer scene-dirty, and is simply dequeued.
            if node.is_scene_dirty() {
                // Cascade: direct children follow their parent out
                let children = node.children.clone();
                for child in children {
                    if let Some(child_node) = self.nodes.get_mut(child) {
                        child_node.set_scene_dirty(true);
                    }
                    self.removed.push_back(child);
                }

                // Spatial leaf removal
                let leaf = self.nodes[id].rigid_body.as_ref().and_then(RigidBody::leaf);
                if let Some(leaf) = leaf {
                    self.rtree.remove(leaf);
                    if let Some(rb) = self.nodes[id].rigid_body.as_mut() {
                        rb.set_leaf(None);
                    }
                }

                {
                    let node = &mut self.nodes[id];
                    node.set_scene_dirty(false);
                    node.set_in_scene(false);
                }

                // The queue held the last strong reference; reclaim the slot
                self.nodes.remove(id);
                if self.map == Some(id) {
                    self.map = None;
                }
                if let Some(hook) = self.instrumentation.as_mut() {
                    hook.on_transform_removed();
                }
                trace!("transform removed from the scene");
            }
        }
    }

    fn drain_collisions(&mut self) {
        let mut couples = std::mem::take(&mut self.collisions);
        couples.retain_mut(|couple| {
            let c1 = self.nodes.get(couple.t1).and_then(TransformNode::world_collider);
            let c2 = self.nodes.get(couple.t2).and_then(TransformNode::world_collider);
            match (c1, c2) {
                (Some(c1), Some(c2)) => !check_end_of_contact(
                    &c1,
                    &c2,
                    couple.axes,
                    &mut couple.frames,
                    &self.config.physics,
                ),
                // A vanished participant is an implicit end of contact
                _ => false,
            }
        });
        self.collisions = couples;
    }

    fn drain_awake_regions(&mut self) {
        let regions = std::mem::take(&mut self.awake_regions);
        self.map_region = None;

        let mut hits = Vec::new();
        for region in &regions {
            hits.clear();
            let count = self.rtree.query_overlap(
                region,
                PhysicsGroups::ALL,
                PhysicsGroups::ALL,
                self.config.physics.collision_epsilon,
                &mut hits,
            );
            for &leaf in &hits {
                let Some(owner) = self.rtree.leaf_owner(leaf) else {
                    continue;
                };
                if let Some(node) = self.nodes.get_mut(owner) {
                    debug_assert!(node.rigid_body.is_some(), "spatial leaf without a rigid body");
                    if let Some(rb) = node.rigid_body.as_mut() {
                        rb.set_awake();
                    }
                }
            }
            if let Some(hook) = self.instrumentation.as_mut() {
                hook.on_awake_query(count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Transform;
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    fn still_scene() -> Scene {
        let mut scene = Scene::new(SceneConfig::default());
        scene.set_constant_acceleration(Vec3::zeros());
        scene
    }

    fn unit_rb() -> RigidBody {
        RigidBody::new(Aabb::from_center_extents(
            Vec3::zeros(),
            Vec3::new(0.5, 0.5, 0.5),
        ))
    }

    fn spawn_body(scene: &mut Scene, position: Vec3) -> TransformId {
        let root = scene.root();
        scene.spawn(
            root,
            TransformNode::new()
                .with_local(Transform::from_position(position))
                .with_rigid_body(unit_rb()),
        )
    }

    #[derive(Default)]
    struct CountingHook {
        awake_queries: Rc<Cell<usize>>,
        removals: Rc<Cell<usize>>,
    }

    impl SceneInstrumentation for CountingHook {
        fn on_awake_query(&mut self, _hits: usize) {
            self.awake_queries.set(self.awake_queries.get() + 1);
        }

        fn on_transform_removed(&mut self) {
            self.removals.set(self.removals.get() + 1);
        }
    }

    #[test]
    fn test_leaf_exists_iff_enabled_and_valid() {
        let mut scene = still_scene();
        let id = spawn_body(&mut scene, Vec3::new(3.0, 4.0, 5.0));

        scene.simulate(DT);
        assert_eq!(scene.rtree().leaf_count(), 1);

        let leaf = scene.leaf_of(id).expect("leaf after simulate");
        let leaf_aabb = scene.rtree().leaf_aabb(leaf).expect("live leaf");
        let expected = scene.node(id).unwrap().world_collider().unwrap();
        assert_relative_eq!(leaf_aabb.min.x, expected.min.x, epsilon = 1e-5);
        assert_relative_eq!(leaf_aabb.max.y, expected.max.y, epsilon = 1e-5);

        // Disabled body loses its leaf without replacement
        scene
            .node_mut(id)
            .unwrap()
            .rigid_body_mut()
            .unwrap()
            .set_enabled(false);
        scene.simulate(DT);
        assert_eq!(scene.rtree().leaf_count(), 0);
        assert!(scene.leaf_of(id).is_none());

        // Re-enabled body gets a fresh leaf
        scene
            .node_mut(id)
            .unwrap()
            .rigid_body_mut()
            .unwrap()
            .set_enabled(true);
        scene.simulate(DT);
        assert_eq!(scene.rtree().leaf_count(), 1);
    }

    #[test]
    fn test_invalid_collider_removes_leaf() {
        let mut scene = still_scene();
        let id = spawn_body(&mut scene, Vec3::zeros());

        scene.simulate(DT);
        assert_eq!(scene.rtree().leaf_count(), 1);

        scene
            .node_mut(id)
            .unwrap()
            .rigid_body_mut()
            .unwrap()
            .set_collider_valid(false);
        scene.simulate(DT);
        assert_eq!(scene.rtree().leaf_count(), 0);
    }

    #[test]
    fn test_world_pose_propagates_to_children() {
        let mut scene = still_scene();
        let root = scene.root();
        let parent = scene.spawn(
            root,
            TransformNode::new().with_local(Transform::from_position(Vec3::new(1.0, 0.0, 0.0))),
        );
        let child = scene.spawn(
            parent,
            TransformNode::new().with_local(Transform::from_position(Vec3::new(0.0, 2.0, 0.0))),
        );

        scene.simulate(DT);
        let p = scene
            .node(child)
            .unwrap()
            .world()
            .transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);

        // Parent moves after flags were cleared; child must follow
        scene
            .node_mut(parent)
            .unwrap()
            .set_local_position(Vec3::new(5.0, 0.0, 0.0));
        scene.simulate(DT);
        let p = scene
            .node(child)
            .unwrap()
            .world()
            .transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_commit_marks_membership() {
        let mut scene = still_scene();
        let id = spawn_body(&mut scene, Vec3::zeros());

        assert!(!scene.is_in_scene(id));
        scene.simulate(DT);
        scene.end_of_frame(DT);
        assert!(scene.is_in_scene(id));
        assert!(!scene.node(id).unwrap().is_scene_dirty());
    }

    #[test]
    fn test_reparent_cancels_pending_removal() {
        let mut scene = still_scene();
        let id = spawn_body(&mut scene, Vec3::zeros());
        scene.simulate(DT);
        scene.end_of_frame(DT);

        scene.remove(id);
        let root = scene.root();
        scene.set_parent(id, root);
        scene.end_of_frame(DT);

        assert!(scene.contains(id));
        assert!(scene.is_in_scene(id));
        assert_eq!(scene.rtree().leaf_count(), 1);
    }

    #[test]
    fn test_removal_cascades_to_children() {
        let mut scene = still_scene();
        let parent = spawn_body(&mut scene, Vec3::zeros());
        let child = scene.spawn(
            parent,
            TransformNode::new()
                .with_local(Transform::from_position(Vec3::new(2.0, 0.0, 0.0)))
                .with_rigid_body(unit_rb()),
        );

        scene.simulate(DT);
        scene.end_of_frame(DT);
        assert_eq!(scene.rtree().leaf_count(), 2);

        let removals = Rc::new(Cell::new(0));
        scene.set_instrumentation(Box::new(CountingHook {
            removals: removals.clone(),
            ..Default::default()
        }));

        // Only the parent is registered; the child follows implicitly
        scene.remove(parent);
        scene.end_of_frame(DT);

        assert!(!scene.contains(parent));
        assert!(!scene.contains(child));
        assert_eq!(scene.rtree().leaf_count(), 0);
        assert_eq!(removals.get(), 2);
    }

    #[test]
    fn test_collision_couple_survives_while_in_contact() {
        let mut scene = still_scene();
        let a = spawn_body(&mut scene, Vec3::zeros());
        let b = spawn_body(&mut scene, Vec3::new(1.0, 0.0, 0.0));

        scene.simulate(DT);
        scene.register_collision_couple(a, b, AxesMask::X);

        scene.end_of_frame(DT);
        scene.end_of_frame(DT);
        assert_eq!(scene.collision_couple_count(), 1);

        // Separate the bodies; the couple ends after the configured number
        // of consecutive separated frames
        scene
            .node_mut(b)
            .unwrap()
            .set_local_position(Vec3::new(10.0, 0.0, 0.0));
        scene.simulate(DT);
        scene.end_of_frame(DT);
        assert_eq!(scene.collision_couple_count(), 1);
        scene.end_of_frame(DT);
        assert_eq!(scene.collision_couple_count(), 0);
    }

    #[test]
    fn test_collision_couple_released_when_participant_destroyed() {
        let mut scene = still_scene();
        let a = spawn_body(&mut scene, Vec3::zeros());
        let b = spawn_body(&mut scene, Vec3::new(1.0, 0.0, 0.0));

        scene.simulate(DT);
        scene.register_collision_couple(a, b, AxesMask::X);
        scene.end_of_frame(DT);
        assert_eq!(scene.collision_couple_count(), 1);

        scene.remove(a);
        scene.end_of_frame(DT);
        assert!(!scene.contains(a));
        assert_eq!(scene.collision_couple_count(), 0);
    }

    #[test]
    fn test_awake_regions_merge_into_one_query() {
        let mut scene = still_scene();
        let queries = Rc::new(Cell::new(0));
        scene.set_instrumentation(Box::new(CountingHook {
            awake_queries: queries.clone(),
            ..Default::default()
        }));

        scene.register_awake_region(Aabb::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0)));
        scene.register_awake_region(Aabb::new(
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(3.0, 3.0, 3.0),
        ));
        assert_eq!(scene.pending_awake_regions(), 1);

        // Zero-volume region is a no-op
        scene.register_awake_region(Aabb::new(Vec3::zeros(), Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(scene.pending_awake_regions(), 1);

        // Disjoint region stays separate
        scene.register_awake_region(Aabb::new(
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(51.0, 1.0, 1.0),
        ));
        assert_eq!(scene.pending_awake_regions(), 2);

        scene.end_of_frame(DT);
        assert_eq!(queries.get(), 2);
        assert_eq!(scene.pending_awake_regions(), 0);
    }

    #[test]
    fn test_awake_region_wakes_sleeping_body() {
        let mut config = SceneConfig::default();
        config.physics.sleep_frames = 2;
        let mut scene = Scene::new(config);
        scene.set_constant_acceleration(Vec3::zeros());

        let id = spawn_body(&mut scene, Vec3::zeros());
        scene.simulate(DT);
        scene.simulate(DT);
        assert!(!scene.node(id).unwrap().rigid_body().unwrap().is_awake());

        scene.register_awake_region(Aabb::from_center_extents(
            Vec3::zeros(),
            Vec3::new(1.0, 1.0, 1.0),
        ));
        scene.end_of_frame(DT);
        assert!(scene.node(id).unwrap().rigid_body().unwrap().is_awake());
    }

    #[test]
    fn test_map_region_accumulates_into_single_region() {
        let mut scene = still_scene();
        let root = scene.root();
        let map = scene.spawn(root, TransformNode::new());
        scene.attach_map(map);

        scene.register_awake_region_for_map(0, 0, 0);
        scene.register_awake_region_for_map(1, 0, 0);
        scene.register_awake_region_for_map(2, 0, 0);
        assert_eq!(scene.pending_awake_regions(), 1);

        // General regions never merge into the map accumulator
        scene.register_awake_region(Aabb::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        ));
        assert_eq!(scene.pending_awake_regions(), 2);

        scene.end_of_frame(DT);
        assert_eq!(scene.pending_awake_regions(), 0);

        // Accumulator resets each frame
        scene.register_awake_region_for_map(5, 0, 0);
        assert_eq!(scene.pending_awake_regions(), 1);
    }

    #[test]
    fn test_mask_changes_commit_at_end_of_frame() {
        let mut scene = still_scene();
        let id = spawn_body(&mut scene, Vec3::zeros());
        scene.simulate(DT);

        scene
            .node_mut(id)
            .unwrap()
            .rigid_body_mut()
            .unwrap()
            .set_masks(PhysicsGroups::PLAYER, PhysicsGroups::MAP);
        scene.end_of_frame(DT);

        let leaf = scene.leaf_of(id).unwrap();
        assert_eq!(
            scene.rtree().leaf_masks(leaf),
            Some((PhysicsGroups::PLAYER, PhysicsGroups::MAP))
        );
    }

    #[test]
    fn test_shape_transaction_updates_collider_at_commit() {
        let mut scene = still_scene();
        let root = scene.root();
        let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let id = scene.spawn(
            root,
            TransformNode::new()
                .with_shape(crate::scene::Shape::new(bounds))
                .with_rigid_body(unit_rb()),
        );

        scene.simulate(DT);
        scene.end_of_frame(DT);
        let leaf = scene.leaf_of(id).unwrap();
        let before = scene.rtree().leaf_aabb(leaf).unwrap();
        assert_relative_eq!(before.max.x, 0.5, epsilon = 1e-5);

        let bigger = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
        scene
            .node_mut(id)
            .unwrap()
            .shape_mut()
            .unwrap()
            .set_pending_bounds(bigger);

        // Invisible until commit
        scene.simulate(DT);
        let unchanged = scene.rtree().leaf_aabb(scene.leaf_of(id).unwrap()).unwrap();
        assert_relative_eq!(unchanged.max.x, 0.5, epsilon = 1e-5);

        scene.end_of_frame(DT);
        let after = scene.rtree().leaf_aabb(scene.leaf_of(id).unwrap()).unwrap();
        assert_relative_eq!(after.max.x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gravity_moves_bodies() {
        let mut scene = Scene::new(SceneConfig::default());
        let id = spawn_body(&mut scene, Vec3::new(0.0, 10.0, 0.0));

        scene.simulate(DT);
        scene.end_of_frame(DT);
        let y = scene.node(id).unwrap().local().position.y;
        assert!(y < 10.0, "gravity should pull the body down, got y = {y}");
    }

    #[test]
    fn test_acceleration_axes_setter_quirk() {
        let mut scene = still_scene();
        scene.set_constant_acceleration_axes(None, Some(-5.0), None);
        assert_relative_eq!(scene.constant_acceleration().y, -5.0);

        // The z input is applied to the x component
        scene.set_constant_acceleration_axes(None, None, Some(7.0));
        assert_relative_eq!(scene.constant_acceleration().x, 7.0);
        assert_relative_eq!(scene.constant_acceleration().z, 0.0);
    }

    #[test]
    fn test_standalone_refresh_applies_transactions() {
        let mut scene = still_scene();
        let root = scene.root();
        let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let id = scene.spawn(
            root,
            TransformNode::new()
                .with_local(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)))
                .with_shape(crate::scene::Shape::new(bounds)),
        );

        let bigger = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(4.0, 4.0, 4.0));
        scene
            .node_mut(id)
            .unwrap()
            .shape_mut()
            .unwrap()
            .set_pending_bounds(bigger);

        scene.standalone_refresh();
        assert_eq!(scene.node(id).unwrap().shape().unwrap().bounds(), bigger);
        let p = scene
            .node(id)
            .unwrap()
            .world()
            .transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_detach_map_keeps_node_alive() {
        let mut scene = still_scene();
        let root = scene.root();
        let map = scene.spawn(root, TransformNode::new());
        scene.attach_map(map);
        assert_eq!(scene.map(), Some(map));

        scene.detach_map();
        assert_eq!(scene.map(), None);
        // The hierarchy no longer reaches it, but the node is not destroyed
        assert!(scene.contains(map));
    }
}
