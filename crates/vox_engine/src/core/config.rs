//! # Unified Configuration System
//!
//! Typed configuration for the scene and physics subsystems.
//!
//! ## Design Goals
//!
//! - **Centralized**: All tunables in one place for easy discovery
//! - **Serializable**: Loadable from TOML files
//! - **Type Safe**: Strong typing with validation and defaults

use crate::foundation::math::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration values are out of range
    #[error("invalid config value: {0}")]
    Validation(String),
}

/// # Physics Configuration
///
/// Tunables for collision detection, sleep/wake management, and the
/// spatial index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Tolerance used for overlap tests and zero-volume checks
    pub collision_epsilon: f32,

    /// Margin applied uniformly on all faces of a collider when registering
    /// an awake region around it
    pub awake_distance: f32,

    /// Consecutive separated frames required before a tracked contact
    /// couple is considered ended
    pub end_of_contact_frames: u32,

    /// Consecutive low-motion ticks before a body falls asleep
    pub sleep_frames: u32,

    /// Linear speed below which a tick counts as low-motion
    pub sleep_velocity_epsilon: f32,

    /// Minimum children per spatial index node
    pub rtree_min_per_node: usize,

    /// Maximum children per spatial index node before a split
    pub rtree_max_per_node: usize,

    /// Default constant acceleration (gravity), y-up
    pub gravity: (f32, f32, f32),
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            collision_epsilon: 1e-3,
            awake_distance: 1.0,
            end_of_contact_frames: 2,
            sleep_frames: 60,
            sleep_velocity_epsilon: 1e-3,
            rtree_min_per_node: 2,
            rtree_max_per_node: 8,
            gravity: (0.0, -25.0, 0.0),
        }
    }
}

impl PhysicsConfig {
    /// Default gravity as a vector
    pub fn gravity_vec(&self) -> Vec3 {
        Vec3::new(self.gravity.0, self.gravity.1, self.gravity.2)
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collision_epsilon <= 0.0 {
            return Err(ConfigError::Validation(
                "collision_epsilon must be positive".into(),
            ));
        }
        if self.awake_distance < 0.0 {
            return Err(ConfigError::Validation(
                "awake_distance must not be negative".into(),
            ));
        }
        if self.rtree_min_per_node < 2 {
            return Err(ConfigError::Validation(
                "rtree_min_per_node must be at least 2".into(),
            ));
        }
        if self.rtree_max_per_node < self.rtree_min_per_node * 2 {
            return Err(ConfigError::Validation(
                "rtree_max_per_node must be at least twice rtree_min_per_node".into(),
            ));
        }
        Ok(())
    }
}

/// # Scene Configuration
///
/// Top-level configuration for a [`crate::scene::Scene`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Headless contexts skip geometry buffer refresh in the commit pass
    pub headless: bool,

    /// Physics tunables
    pub physics: PhysicsConfig,
}

impl SceneConfig {
    /// Load and validate a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.physics.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_capacity() {
        let config = PhysicsConfig {
            rtree_min_per_node: 4,
            rtree_max_per_node: 6,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_from_toml() {
        let text = r#"
            headless = true

            [physics]
            collision_epsilon = 0.001
            awake_distance = 2.0
            end_of_contact_frames = 3
            sleep_frames = 30
            sleep_velocity_epsilon = 0.001
            rtree_min_per_node = 2
            rtree_max_per_node = 16
            gravity = [0.0, -9.81, 0.0]
        "#;
        let config: SceneConfig = toml::from_str(text).expect("valid toml");
        assert!(config.headless);
        assert_eq!(config.physics.rtree_max_per_node, 16);
        assert!(config.physics.validate().is_ok());
    }
}
