//! Collision group system for filtering collision detection
//!
//! Every collider carries a `groups` mask (what it is) and a `collides_with`
//! mask (what it reacts to). Spatial index queries and contact detection
//! filter on both.

/// Collision group definitions using bit masks for efficient filtering
pub struct PhysicsGroups;

impl PhysicsGroups {
    /// No collision group
    pub const NONE: u32 = 0;

    /// All collision groups
    pub const ALL: u32 = 0xFFFF_FFFF;

    /// The static voxel map
    pub const MAP: u32 = 1 << 0;

    /// Default group for dynamic objects
    pub const DEFAULT: u32 = 1 << 1;

    /// Player characters
    pub const PLAYER: u32 = 1 << 2;

    /// Free-standing scene objects
    pub const OBJECT: u32 = 1 << 3;

    /// Projectiles
    pub const PROJECTILE: u32 = 1 << 4;

    /// Trigger volumes (no physical response)
    pub const TRIGGER: u32 = 1 << 5;

    /// Check whether two collider mask pairs should interact
    ///
    /// Interaction requires each side's groups to appear in the other side's
    /// `collides_with` mask.
    pub fn should_collide(groups_a: u32, mask_a: u32, groups_b: u32, mask_b: u32) -> bool {
        (groups_a & mask_b) != 0 && (groups_b & mask_a) != 0
    }

    /// Helper to create a mask from multiple groups
    pub fn mask(groups: &[u32]) -> u32 {
        groups.iter().fold(0, |acc, &g| acc | g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_collide_mutual() {
        let player = PhysicsGroups::PLAYER;
        let player_mask = PhysicsGroups::MAP | PhysicsGroups::OBJECT;

        let map = PhysicsGroups::MAP;
        let map_mask = PhysicsGroups::ALL;

        assert!(PhysicsGroups::should_collide(player, player_mask, map, map_mask));
    }

    #[test]
    fn test_should_not_collide_one_way() {
        let projectile = PhysicsGroups::PROJECTILE;
        let projectile_mask = PhysicsGroups::PLAYER;

        let player = PhysicsGroups::PLAYER;
        let player_mask = PhysicsGroups::MAP; // does not react to projectiles

        assert!(!PhysicsGroups::should_collide(
            projectile,
            projectile_mask,
            player,
            player_mask
        ));
    }

    #[test]
    fn test_mask_creation() {
        let mask = PhysicsGroups::mask(&[PhysicsGroups::MAP, PhysicsGroups::PLAYER]);
        assert_eq!(mask, PhysicsGroups::MAP | PhysicsGroups::PLAYER);
    }
}
