//! Per-frame character orchestration (input + actions + motor + collision + camera).
//!
//! A tick always runs in the same order: input edges, action selection and
//! clip dispatch, facing, integration, collision resolution, fall reset,
//! camera follow.
#![forbid(unsafe_code)]

mod config;
mod input;
mod world;

pub use config::{ConfigError, ControllerConfig, FallReset};
pub use input::{InputEdges, InputSnapshot};
pub use world::WorldSlot;

use character_actions::{
    ActionAnimator, ActionInput, ActionMachine, ActionState, ActionTransition, AnimationSink,
    ClipTable,
};
use character_collision::{CapsuleResolver, CollisionState};
use character_motor::{KinematicMotor, MotorInput, MotorState};
use player_camera::CameraRig;
use rapier3d::math::{Point, Rotation, Vector};
use rapier3d::prelude::Real;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Character {
    /// Centre of the foot sphere.
    pub position: Point<Real>,
    pub orientation: Rotation<Real>,
    pub velocity: Vector<Real>,
    pub grounded: bool,
    pub sitting: bool,
}

impl Character {
    pub fn at(position: Point<Real>) -> Self {
        Self {
            position,
            orientation: Rotation::identity(),
            velocity: Vector::zeros(),
            grounded: false,
            sitting: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CharacterFrame {
    pub position: Point<Real>,
    pub orientation: Rotation<Real>,
    pub action: ActionState,
    pub grounded: bool,
    pub velocity: Vector<Real>,
    /// Key-driven velocity this frame, Y always zero.
    pub horizontal_velocity: Vector<Real>,
    /// Push-out applied by the resolver.
    pub correction: Vector<Real>,
    pub transition: Option<ActionTransition>,
    /// True when the character fell out of bounds and was respawned. The
    /// frame's `action` is then the post-respawn action.
    pub reset: bool,
}

pub struct CharacterController<S: AnimationSink, C: CameraRig> {
    machine: ActionMachine,
    motor: KinematicMotor,
    resolver: CapsuleResolver,
    animator: ActionAnimator<S>,
    camera: C,
    fall_reset: FallReset,
    character: Character,
    previous_input: InputSnapshot,
}

impl<S: AnimationSink, C: CameraRig> CharacterController<S, C> {
    pub fn new(config: &ControllerConfig, sink: S, clips: ClipTable<S::Clip>, camera: C) -> Self {
        let fall_reset = config.fall_reset();
        let mut animator = ActionAnimator::new(sink, clips, config.blend_duration);
        animator.start(ActionState::Idle);
        Self {
            machine: ActionMachine::new(config.actions()),
            motor: KinematicMotor::new(config.motor()),
            resolver: CapsuleResolver::new(config.capsule()),
            animator,
            camera,
            fall_reset,
            character: Character::at(fall_reset.spawn),
            previous_input: InputSnapshot::default(),
        }
    }

    /// Swaps in new tuning without touching the character's state.
    pub fn apply_config(&mut self, config: &ControllerConfig) {
        *self.machine.config_mut() = config.actions();
        *self.motor.config_mut() = config.motor();
        self.resolver.set_profile(config.capsule());
        self.animator.set_blend_duration(config.blend_duration);
        self.fall_reset = config.fall_reset();
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn character_mut(&mut self) -> &mut Character {
        &mut self.character
    }

    pub fn action(&self) -> ActionState {
        self.machine.current()
    }

    pub fn animator(&self) -> &ActionAnimator<S> {
        &self.animator
    }

    pub fn animator_mut(&mut self) -> &mut ActionAnimator<S> {
        &mut self.animator
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// Puts the character back at the spawn point, at rest and standing, and
    /// drops any action still in progress.
    pub fn respawn(&mut self) {
        let previous = self.machine.current();
        self.machine.reset();
        if previous != self.machine.current() {
            self.animator.apply(ActionTransition {
                from: previous,
                to: self.machine.current(),
            });
        }
        let orientation = self.character.orientation;
        self.character = Character {
            orientation,
            ..Character::at(self.fall_reset.spawn)
        };
        self.previous_input = InputSnapshot::default();
    }

    pub fn tick(&mut self, world: &WorldSlot, input: InputSnapshot, dt: Real) -> CharacterFrame {
        let dt = dt.max(0.0);
        let edges = InputEdges::between(&self.previous_input, &input);
        self.previous_input = input;
        if edges.sit_pressed {
            self.character.sitting = !self.character.sitting;
        }

        let actions = self.machine.step(ActionInput {
            directions: input.directions(),
            run: input.run,
            jump_pressed: edges.jump_pressed,
            sit_active: self.character.sitting,
            grounded: self.character.grounded,
        });
        if let Some(transition) = actions.transition {
            self.animator.apply(transition);
        }
        self.animator.advance(dt);

        let azimuth = self.camera.azimuth();
        self.character.orientation = self.machine.face(
            self.character.orientation,
            actions.action,
            azimuth,
            actions.direction_offset,
        );

        let motion = self.motor.step(
            MotorInput {
                directions: input.directions(),
                run: input.run,
                jump_triggered: actions.jump_triggered,
                horizontal_allowed: actions.action.allows_horizontal_motion(),
                azimuth,
            },
            MotorState {
                velocity: self.character.velocity,
                grounded: self.character.grounded,
            },
            dt,
        );
        let start = self.character.position;
        let grounded = self.character.grounded && !motion.jumped;

        let resolved = self.resolver.resolve(
            world.ready(),
            CollisionState {
                position: start + motion.displacement,
                velocity: motion.next_velocity,
                grounded,
            },
            dt,
        );
        self.character.position = resolved.position;
        self.character.velocity = resolved.velocity;
        self.character.grounded = resolved.grounded;

        let reset = self.fall_reset.should_reset(self.character.position);
        if reset {
            log::warn!(
                "character fell to y = {:.2}, resetting to spawn",
                self.character.position.y
            );
            self.respawn();
            self.previous_input = input;
        }

        let moved = self.character.position - start;
        self.camera
            .follow(self.character.position, Vector::new(moved.x, 0.0, moved.z));

        let horizontal_velocity = if dt > 0.0 {
            motion.horizontal / dt
        } else {
            Vector::zeros()
        };
        CharacterFrame {
            position: self.character.position,
            orientation: self.character.orientation,
            action: self.machine.current(),
            grounded: self.character.grounded,
            velocity: self.character.velocity,
            horizontal_velocity,
            correction: resolved.correction,
            transition: actions.transition,
            reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use character_actions::NullSink;
    use character_collision::WorldCollider;
    use collision_world::Triangle;
    use player_camera::FollowCamera;

    const DT: Real = 1.0 / 60.0;

    fn controller(config: &ControllerConfig) -> CharacterController<NullSink, FollowCamera> {
        let spawn = config.fall_reset().spawn;
        CharacterController::new(
            config,
            NullSink,
            ClipTable::new(),
            FollowCamera::behind(spawn, 5.0, 2.0),
        )
    }

    fn floor() -> WorldSlot {
        let mut slot = WorldSlot::default();
        slot.finish_loading(Arc::new(WorldCollider::from_triangles([
            Triangle::new(
                Point::new(-50.0, 0.0, -50.0),
                Point::new(-50.0, 0.0, 50.0),
                Point::new(50.0, 0.0, 50.0),
            ),
            Triangle::new(
                Point::new(-50.0, 0.0, -50.0),
                Point::new(50.0, 0.0, 50.0),
                Point::new(50.0, 0.0, -50.0),
            ),
        ])));
        slot
    }

    fn settle(
        controller: &mut CharacterController<NullSink, FollowCamera>,
        world: &WorldSlot,
    ) {
        for _ in 0..120 {
            controller.tick(world, InputSnapshot::default(), DT);
        }
        assert!(controller.character().grounded);
    }

    #[test]
    fn unloaded_world_is_a_free_fall() {
        let mut controller = controller(&ControllerConfig::default());
        let frame = controller.tick(&WorldSlot::Unloaded, InputSnapshot::default(), DT);
        assert_eq!(frame.correction, Vector::zeros());
        assert!(!frame.grounded);
        assert!(frame.position.y < 2.0);
    }

    #[test]
    fn settles_on_floor_at_capsule_radius() {
        let world = floor();
        let mut controller = controller(&ControllerConfig::default());
        settle(&mut controller, &world);
        assert!((controller.character().position.y - 0.5).abs() < 1.0e-2);
        assert_eq!(controller.action(), ActionState::Idle);
    }

    #[test]
    fn walking_forward_moves_away_from_camera() {
        let world = floor();
        let mut controller = controller(&ControllerConfig::default());
        settle(&mut controller, &world);
        let start = controller.character().position;
        let input = InputSnapshot::from_key_names(["w"]);
        let mut frame = controller.tick(&world, input, DT);
        assert_eq!(frame.action, ActionState::Walk);
        for _ in 0..59 {
            frame = controller.tick(&world, input, DT);
        }
        // One second at walk speed along +Z, the camera's view heading.
        assert!((frame.position.z - start.z - 2.0).abs() < 1.0e-2);
        assert!((frame.position.x - start.x).abs() < 1.0e-3);
        assert!(frame.grounded);
        // Camera kept its offset from the character.
        let eye = controller.camera().eye();
        assert!((eye.z - (frame.position.z - 5.0)).abs() < 1.0e-2);
    }

    #[test]
    fn falling_out_of_bounds_respawns() {
        let mut controller = controller(&ControllerConfig::default());
        let mut reset = false;
        for _ in 0..240 {
            let frame = controller.tick(&WorldSlot::Unloaded, InputSnapshot::default(), DT);
            if frame.reset {
                reset = true;
                assert_eq!(frame.position, Point::new(0.0, 2.0, 0.0));
                assert_eq!(frame.velocity, Vector::zeros());
                break;
            }
        }
        assert!(reset);
    }

    #[test]
    fn respawn_ends_a_jump_in_flight() {
        let floor = floor();
        let mut controller = controller(&ControllerConfig::default());
        settle(&mut controller, &floor);
        let jump = controller.tick(&floor, InputSnapshot::from_key_names(["space"]), DT);
        assert_eq!(jump.action, ActionState::Jump);

        // The floor goes away mid-jump and the character drops out of bounds.
        let mut reset = None;
        for _ in 0..240 {
            let frame = controller.tick(&WorldSlot::Unloaded, InputSnapshot::default(), DT);
            if frame.reset {
                reset = Some(frame);
                break;
            }
            assert_eq!(frame.action, ActionState::Jump);
        }
        let reset = reset.expect("fell out of bounds");
        assert_eq!(reset.action, ActionState::Idle);
        assert_eq!(controller.action(), ActionState::Idle);

        // Still airborne after respawn, so a stale jump would show up here.
        let after = controller.tick(&floor, InputSnapshot::default(), DT);
        assert!(!after.grounded);
        assert_eq!(after.action, ActionState::Idle);
    }
}
