use std::path::Path;

use character_actions::ActionConfig;
use character_collision::CapsuleProfile;
use character_motor::MotorConfig;
use rapier3d::math::Point;
use rapier3d::prelude::Real;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse controller config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: Real },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: Real },
}

/// Tuning for one controlled character. Every field falls back to the
/// reference tuning when absent from the TOML.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Animation cross-fade, seconds.
    pub blend_duration: Real,
    pub walk_speed: Real,
    pub run_speed: Real,
    pub gravity: Real,
    pub jump_impulse: Real,
    pub capsule_radius: Real,
    pub segment_height: Real,
    /// Radians per frame.
    pub rotation_speed: Real,
    pub fall_reset_y: Real,
    pub spawn: [Real; 3],
    pub normalize_diagonal: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            blend_duration: 0.3,
            walk_speed: 2.0,
            run_speed: 10.0,
            gravity: -30.0,
            jump_impulse: 10.0,
            capsule_radius: 0.5,
            segment_height: 1.0,
            rotation_speed: 0.15,
            fall_reset_y: -10.0,
            spawn: [0.0, 2.0, 0.0],
            normalize_diagonal: false,
        }
    }
}

/// Out-of-bounds recovery: below `floor_y` the character is put back at `spawn`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallReset {
    pub floor_y: Real,
    pub spawn: Point<Real>,
}

impl FallReset {
    pub fn should_reset(&self, position: Point<Real>) -> bool {
        position.y < self.floor_y
    }
}

impl ControllerConfig {
    pub fn parse_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse_toml(&text)?;
        log::info!("loaded controller config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("blend_duration", self.blend_duration),
            ("walk_speed", self.walk_speed),
            ("run_speed", self.run_speed),
            ("gravity", self.gravity),
            ("jump_impulse", self.jump_impulse),
            ("capsule_radius", self.capsule_radius),
            ("segment_height", self.segment_height),
            ("rotation_speed", self.rotation_speed),
            ("fall_reset_y", self.fall_reset_y),
            ("spawn.x", self.spawn[0]),
            ("spawn.y", self.spawn[1]),
            ("spawn.z", self.spawn[2]),
        ];
        if let Some((field, _)) = scalars.into_iter().find(|(_, value)| !value.is_finite()) {
            return Err(ConfigError::NonFinite { field });
        }
        for (field, value) in [
            ("capsule_radius", self.capsule_radius),
            ("rotation_speed", self.rotation_speed),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        for (field, value) in [
            ("blend_duration", self.blend_duration),
            ("walk_speed", self.walk_speed),
            ("run_speed", self.run_speed),
            ("jump_impulse", self.jump_impulse),
            ("segment_height", self.segment_height),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        Ok(())
    }

    pub fn motor(&self) -> MotorConfig {
        MotorConfig {
            walk_speed: self.walk_speed,
            run_speed: self.run_speed,
            gravity: self.gravity,
            jump_impulse: self.jump_impulse,
            normalize_diagonal: self.normalize_diagonal,
        }
    }

    pub fn capsule(&self) -> CapsuleProfile {
        CapsuleProfile {
            radius: self.capsule_radius,
            segment_height: self.segment_height,
        }
    }

    pub fn actions(&self) -> ActionConfig {
        ActionConfig {
            blend_duration: self.blend_duration,
            rotation_speed: self.rotation_speed,
        }
    }

    pub fn fall_reset(&self) -> FallReset {
        FallReset {
            floor_y: self.fall_reset_y,
            spawn: Point::from(self.spawn),
        }
    }
}
