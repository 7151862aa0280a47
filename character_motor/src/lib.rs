//! Kinematic integrator: gravity, jump impulse and camera-relative key motion.
//!
//! Produces the unresolved displacement for one frame. Collision correction
//! happens afterwards in `character_collision`.
#![forbid(unsafe_code)]

use character_actions::{heading_direction, DirectionKeys};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;

#[derive(Clone, Copy, Debug)]
pub struct MotorConfig {
    pub walk_speed: Real,
    pub run_speed: Real,
    /// Vertical acceleration, negative is down.
    pub gravity: Real,
    pub jump_impulse: Real,
    /// Scale multi-key motion back to a single key's speed.
    pub normalize_diagonal: bool,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            walk_speed: 2.0,
            run_speed: 10.0,
            gravity: -30.0,
            jump_impulse: 10.0,
            normalize_diagonal: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MotorInput {
    pub directions: DirectionKeys,
    pub run: bool,
    pub jump_triggered: bool,
    /// False while sitting.
    pub horizontal_allowed: bool,
    /// Camera heading, radians about +Y.
    pub azimuth: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct MotorState {
    pub velocity: Vector<Real>,
    pub grounded: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct MotorOutput {
    /// Unresolved translation for this frame.
    pub displacement: Vector<Real>,
    /// Key-driven part of `displacement`.
    pub horizontal: Vector<Real>,
    pub next_velocity: Vector<Real>,
    pub jumped: bool,
}

pub struct KinematicMotor {
    config: MotorConfig,
}

impl KinematicMotor {
    pub fn new(config: MotorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> MotorConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut MotorConfig {
        &mut self.config
    }

    pub fn step(&self, input: MotorInput, state: MotorState, dt: Real) -> MotorOutput {
        let dt = dt.max(0.0);
        let mut velocity = state.velocity;
        let mut grounded = state.grounded;
        if input.jump_triggered {
            velocity.y = self.config.jump_impulse;
            grounded = false;
        }
        // On the ground the fall speed is re-seeded every frame so the
        // resolver always sees a small push into the floor.
        if grounded {
            velocity.y = self.config.gravity * dt;
        } else {
            velocity.y += self.config.gravity * dt;
        }

        let horizontal = if input.horizontal_allowed {
            self.horizontal_displacement(input, dt)
        } else {
            Vector::zeros()
        };

        MotorOutput {
            displacement: velocity * dt + horizontal,
            horizontal,
            next_velocity: velocity,
            jumped: input.jump_triggered,
        }
    }

    /// Each held key contributes a full-speed step along its own heading, so two
    /// orthogonal keys move √2 times faster unless `normalize_diagonal` is set.
    pub fn horizontal_displacement(&self, input: MotorInput, dt: Real) -> Vector<Real> {
        let speed = if input.run {
            self.config.run_speed
        } else {
            self.config.walk_speed
        };
        let sum: Vector<Real> = input
            .directions
            .pressed_offsets()
            .map(|offset| heading_direction(input.azimuth + offset))
            .fold(Vector::zeros(), |acc, dir| acc + dir);
        let sum = if self.config.normalize_diagonal {
            sum.try_normalize(1.0e-6).unwrap_or_else(Vector::zeros)
        } else {
            sum
        };
        sum * speed * dt
    }
}
