//! Per-node rigid body state and tick integration
//!
//! The rigid body owns the flags the scene synchronization passes key off:
//! enabled, collider validity, collider dirtiness, collision masks, the
//! back-pointer to its spatial index leaf, and sleep/wake state. Numeric
//! integration is intentionally minimal; the scene only relies on the
//! "contacts found" result of [`RigidBody::tick`].

use crate::core::config::PhysicsConfig;
use crate::foundation::math::{Transform, Vec3};
use crate::spatial::{Aabb, Rtree, RtreeLeafId};

use super::axes::AxesMask;

/// Rigid body attached to a transform node
#[derive(Debug, Clone)]
pub struct RigidBody {
    enabled: bool,
    /// Local-space collider box
    collider: Aabb,
    collider_valid: bool,
    collider_dirty: bool,
    groups: u32,
    collides_with: u32,
    /// Weak back-pointer to the spatial index leaf; leaf lifetime is owned
    /// by the index
    leaf: Option<RtreeLeafId>,
    velocity: Vec3,
    awake: bool,
    low_motion_frames: u32,
}

impl RigidBody {
    /// Create an enabled, awake body with the given local collider box
    pub fn new(collider: Aabb) -> Self {
        Self {
            enabled: true,
            collider,
            collider_valid: true,
            collider_dirty: false,
            groups: crate::physics::PhysicsGroups::DEFAULT,
            collides_with: crate::physics::PhysicsGroups::ALL,
            leaf: None,
            velocity: Vec3::zeros(),
            awake: true,
            low_motion_frames: 0,
        }
    }

    /// Builder pattern: Set collision masks
    pub fn with_masks(mut self, groups: u32, collides_with: u32) -> Self {
        self.groups = groups;
        self.collides_with = collides_with;
        self
    }

    /// Whether the body participates in simulation
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the body; the leaf is reconciled on the next pass
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the collider currently describes a usable volume
    pub fn is_collider_valid(&self) -> bool {
        self.collider_valid
    }

    /// Mark the collider usable or unusable
    pub fn set_collider_valid(&mut self, valid: bool) {
        if self.collider_valid != valid {
            self.collider_valid = valid;
            self.collider_dirty = true;
        }
    }

    /// Local-space collider box
    pub fn collider(&self) -> Aabb {
        self.collider
    }

    /// Replace the local collider box, marking it dirty for the next sync
    pub fn set_collider(&mut self, collider: Aabb) {
        self.collider = collider;
        self.collider_dirty = true;
    }

    /// Whether the collider changed since the last spatial index sync
    pub fn collider_dirty(&self) -> bool {
        self.collider_dirty
    }

    /// Clear the collider-dirty flag after a sync
    pub fn reset_collider_dirty(&mut self) {
        self.collider_dirty = false;
    }

    /// Collision groups this body belongs to
    pub fn groups(&self) -> u32 {
        self.groups
    }

    /// Collision groups this body reacts to
    pub fn collides_with(&self) -> u32 {
        self.collides_with
    }

    /// Change collision masks; the spatial index picks them up at commit
    pub fn set_masks(&mut self, groups: u32, collides_with: u32) {
        self.groups = groups;
        self.collides_with = collides_with;
    }

    /// Spatial index leaf back-pointer
    pub fn leaf(&self) -> Option<RtreeLeafId> {
        self.leaf
    }

    /// Set or clear the spatial index leaf back-pointer
    pub fn set_leaf(&mut self, leaf: Option<RtreeLeafId>) {
        self.leaf = leaf;
    }

    /// Linear velocity
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Set linear velocity; a sleeping body is woken up
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.set_awake();
    }

    /// Whether the body is simulated this frame
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Transition to the awake state, restarting sleep tracking
    pub fn set_awake(&mut self) {
        self.awake = true;
        self.low_motion_frames = 0;
    }

    /// Integrate one tick and report whether new contacts were found
    ///
    /// Applies the scene's constant acceleration, translates the pose, and
    /// probes the spatial index at the displaced collider. Sleeping or
    /// disabled bodies do nothing. A body whose motion stays below the
    /// configured threshold for enough consecutive ticks falls asleep.
    pub fn tick(
        &mut self,
        pose: &mut Transform,
        world_collider: &Aabb,
        rtree: &Rtree,
        constant_acceleration: Vec3,
        config: &PhysicsConfig,
        dt: f32,
    ) -> bool {
        if !self.enabled || !self.awake {
            return false;
        }

        self.velocity += constant_acceleration * dt;
        let displacement = self.velocity * dt;

        if self.velocity.magnitude() <= config.sleep_velocity_epsilon {
            self.low_motion_frames += 1;
            if self.low_motion_frames >= config.sleep_frames {
                self.awake = false;
                self.velocity = Vec3::zeros();
            }
            return false;
        }
        self.low_motion_frames = 0;

        pose.position += displacement;

        // Probe the index at the displaced collider for fresh contacts
        let probe = world_collider.translated(displacement);
        let mut hits = Vec::new();
        rtree.query_overlap(
            &probe,
            self.groups,
            self.collides_with,
            config.collision_epsilon,
            &mut hits,
        );
        hits.iter().any(|hit| Some(*hit) != self.leaf)
    }
}

/// End-of-contact predicate for a tracked collision couple
///
/// `frames` counts consecutive separated frames and is mutated in place; the
/// couple ends once it reaches the configured threshold. Any overlap along
/// the tracked axes (and proximity overall) resets the counter.
pub fn check_end_of_contact(
    c1: &Aabb,
    c2: &Aabb,
    axes: AxesMask,
    frames: &mut u32,
    config: &PhysicsConfig,
) -> bool {
    let epsilon = config.collision_epsilon;
    let mut in_contact = c1.intersects_epsilon(c2, epsilon);
    if in_contact {
        // Contact axes must still overlap individually
        for axis in axes.indices() {
            if !c1.overlaps_on_axis(c2, axis, epsilon) {
                in_contact = false;
                break;
            }
        }
    }

    if in_contact {
        *frames = 0;
        false
    } else {
        *frames += 1;
        *frames >= config.end_of_contact_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_body() -> RigidBody {
        RigidBody::new(Aabb::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5)))
    }

    #[test]
    fn test_set_collider_marks_dirty() {
        let mut rb = unit_body();
        assert!(!rb.collider_dirty());

        rb.set_collider(Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)));
        assert!(rb.collider_dirty());

        rb.reset_collider_dirty();
        assert!(!rb.collider_dirty());
    }

    #[test]
    fn test_tick_integrates_constant_acceleration() {
        let mut rb = unit_body();
        let mut pose = Transform::identity();
        let rtree = Rtree::new(2, 8);
        let config = PhysicsConfig::default();

        let gravity = Vec3::new(0.0, -10.0, 0.0);
        rb.tick(&mut pose, &rb.collider(), &rtree, gravity, &config, 0.1);

        assert_relative_eq!(rb.velocity().y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.position.y, -0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_sleeping_body_skips_integration() {
        let mut rb = unit_body();
        let mut pose = Transform::identity();
        let rtree = Rtree::new(2, 8);
        let config = PhysicsConfig::default();

        // Idle long enough to fall asleep under zero acceleration
        for _ in 0..config.sleep_frames {
            rb.tick(&mut pose, &rb.collider(), &rtree, Vec3::zeros(), &config, 0.1);
        }
        assert!(!rb.is_awake());

        // Gravity no longer moves it until something wakes it
        rb.tick(&mut pose, &rb.collider(), &rtree, Vec3::new(0.0, -10.0, 0.0), &config, 0.1);
        assert_relative_eq!(pose.position.y, 0.0);

        rb.set_awake();
        assert!(rb.is_awake());
    }

    #[test]
    fn test_end_of_contact_counts_consecutive_frames() {
        let config = PhysicsConfig {
            end_of_contact_frames: 2,
            ..Default::default()
        };
        let a = Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let touching = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let apart = Aabb::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 1.0, 1.0));
        let mut frames = 0;

        assert!(!check_end_of_contact(&a, &touching, AxesMask::X, &mut frames, &config));
        assert_eq!(frames, 0);

        assert!(!check_end_of_contact(&a, &apart, AxesMask::X, &mut frames, &config));
        assert_eq!(frames, 1);

        // Contact again: counter resets
        assert!(!check_end_of_contact(&a, &touching, AxesMask::X, &mut frames, &config));
        assert_eq!(frames, 0);

        assert!(!check_end_of_contact(&a, &apart, AxesMask::X, &mut frames, &config));
        assert!(check_end_of_contact(&a, &apart, AxesMask::X, &mut frames, &config));
    }
}
