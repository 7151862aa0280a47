//! Action state machine: picks Idle/Walk/Run/Jump/Sit from input and contact
//! state, derives the camera-relative heading, and turns the character.
#![forbid(unsafe_code)]

pub mod animation;

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;

pub use animation::{ActionAnimator, AnimationSink, ClipPlayback, ClipTable, LoopMode, NullSink};

const ROTATION_EPS: Real = 1.0e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActionState {
    #[default]
    Idle,
    Walk,
    Run,
    Jump,
    Sit,
}

impl ActionState {
    pub const COUNT: usize = 5;
    pub const ALL: [ActionState; Self::COUNT] = [
        ActionState::Idle,
        ActionState::Walk,
        ActionState::Run,
        ActionState::Jump,
        ActionState::Sit,
    ];

    pub fn index(self) -> usize {
        match self {
            ActionState::Idle => 0,
            ActionState::Walk => 1,
            ActionState::Run => 2,
            ActionState::Jump => 3,
            ActionState::Sit => 4,
        }
    }

    pub fn clip_name(self) -> &'static str {
        match self {
            ActionState::Idle => "Idle",
            ActionState::Walk => "Walk",
            ActionState::Run => "Run",
            ActionState::Jump => "Jump",
            ActionState::Sit => "Sit",
        }
    }

    /// Idle and Sit keep their facing; every other action turns toward the camera heading.
    pub fn rotates_with_camera(self) -> bool {
        !matches!(self, ActionState::Idle | ActionState::Sit)
    }

    pub fn allows_horizontal_motion(self) -> bool {
        self != ActionState::Sit
    }
}

/// Held movement keys (w/s/a/d).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionKeys {
    pub fn any(self) -> bool {
        self.forward || self.back || self.left || self.right
    }

    /// Heading offset from the camera azimuth, radians counter-clockwise about +Y.
    /// Forward wins over back, left wins over right.
    pub fn offset(self) -> Real {
        if self.forward {
            if self.left {
                FRAC_PI_4
            } else if self.right {
                -FRAC_PI_4
            } else {
                0.0
            }
        } else if self.back {
            if self.left {
                FRAC_PI_4 + FRAC_PI_2
            } else if self.right {
                -FRAC_PI_4 - FRAC_PI_2
            } else {
                PI
            }
        } else if self.left {
            FRAC_PI_2
        } else if self.right {
            -FRAC_PI_2
        } else {
            0.0
        }
    }

    /// One offset per held key, for per-key displacement.
    pub fn pressed_offsets(self) -> impl Iterator<Item = Real> {
        [
            (self.forward, 0.0),
            (self.back, PI),
            (self.left, FRAC_PI_2),
            (self.right, -FRAC_PI_2),
        ]
        .into_iter()
        .filter_map(|(held, offset)| held.then_some(offset))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ActionInput {
    pub directions: DirectionKeys,
    /// Run modifier held.
    pub run: bool,
    /// Jump key went down this frame.
    pub jump_pressed: bool,
    pub sit_active: bool,
    /// Contact state from the previous frame's resolution.
    pub grounded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionTransition {
    pub from: ActionState,
    pub to: ActionState,
}

#[derive(Clone, Copy, Debug)]
pub struct ActionOutput {
    pub action: ActionState,
    pub transition: Option<ActionTransition>,
    pub jump_triggered: bool,
    pub direction_offset: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct ActionConfig {
    /// Cross-fade time between clips, seconds.
    pub blend_duration: Real,
    /// Max facing change per frame, radians.
    pub rotation_speed: Real,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            blend_duration: 0.3,
            rotation_speed: 0.15,
        }
    }
}

/// Priority order: Sit, Jump in flight, movement (Run if the modifier is held), Idle.
pub fn select_action(input: &ActionInput, jump_in_flight: bool) -> ActionState {
    if input.sit_active {
        ActionState::Sit
    } else if jump_in_flight {
        ActionState::Jump
    } else if input.directions.any() {
        if input.run {
            ActionState::Run
        } else {
            ActionState::Walk
        }
    } else {
        ActionState::Idle
    }
}

pub struct ActionMachine {
    config: ActionConfig,
    current: ActionState,
    jump_in_flight: bool,
}

impl ActionMachine {
    pub fn new(config: ActionConfig) -> Self {
        Self {
            config,
            current: ActionState::Idle,
            jump_in_flight: false,
        }
    }

    pub fn config(&self) -> ActionConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut ActionConfig {
        &mut self.config
    }

    pub fn current(&self) -> ActionState {
        self.current
    }

    pub fn jump_in_flight(&self) -> bool {
        self.jump_in_flight
    }

    pub fn reset(&mut self) {
        self.current = ActionState::Idle;
        self.jump_in_flight = false;
    }

    /// Advances one frame. A jump triggers only on a key-down edge while grounded
    /// and not sitting; once triggered it stays in flight until contact returns.
    pub fn step(&mut self, input: ActionInput) -> ActionOutput {
        let jump_triggered = input.jump_pressed && input.grounded && !input.sit_active;
        if jump_triggered {
            self.jump_in_flight = true;
        } else if input.grounded {
            self.jump_in_flight = false;
        }

        let action = select_action(&input, self.jump_in_flight);
        let transition = (action != self.current).then_some(ActionTransition {
            from: self.current,
            to: action,
        });
        if let Some(transition) = transition {
            log::debug!("action {:?} -> {:?}", transition.from, transition.to);
        }
        self.current = action;
        ActionOutput {
            action,
            transition,
            jump_triggered,
            direction_offset: input.directions.offset(),
        }
    }

    /// Turns `orientation` toward the camera-relative heading, limited by the
    /// rotation speed. Idle and Sit keep their current facing.
    pub fn face(
        &self,
        orientation: Rotation<Real>,
        action: ActionState,
        azimuth: Real,
        direction_offset: Real,
    ) -> Rotation<Real> {
        if !action.rotates_with_camera() {
            return orientation;
        }
        rotate_towards(
            orientation,
            heading_rotation(azimuth + direction_offset),
            self.config.rotation_speed,
        )
    }
}

/// Rotation about +Y that turns local +Z toward `heading`.
pub fn heading_rotation(heading: Real) -> Rotation<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), heading)
}

/// Unit horizontal direction for a heading angle, matching [`heading_rotation`].
pub fn heading_direction(heading: Real) -> Vector<Real> {
    Vector::new(heading.sin(), 0.0, heading.cos())
}

/// Steps `current` toward `target` by at most `max_step` radians.
pub fn rotate_towards(
    current: Rotation<Real>,
    target: Rotation<Real>,
    max_step: Real,
) -> Rotation<Real> {
    let angle = current.angle_to(&target);
    if angle <= max_step.max(ROTATION_EPS) {
        return target;
    }
    let t = (max_step / angle).clamp(0.0, 1.0);
    current
        .try_slerp(&target, t, ROTATION_EPS)
        .unwrap_or_else(|| Rotation::from_axis_angle(&Vector::y_axis(), max_step) * current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(spec: &str) -> DirectionKeys {
        DirectionKeys {
            forward: spec.contains('w'),
            back: spec.contains('s'),
            left: spec.contains('a'),
            right: spec.contains('d'),
        }
    }

    fn grounded_input(spec: &str) -> ActionInput {
        ActionInput {
            directions: keys(spec),
            grounded: true,
            ..Default::default()
        }
    }

    #[test]
    fn direction_offset_table() {
        let table = [
            ("", 0.0),
            ("w", 0.0),
            ("s", PI),
            ("a", FRAC_PI_2),
            ("d", -FRAC_PI_2),
            ("wa", FRAC_PI_4),
            ("wd", -FRAC_PI_4),
            ("sa", 3.0 * FRAC_PI_4),
            ("sd", -3.0 * FRAC_PI_4),
        ];
        for (spec, expected) in table {
            let offset = keys(spec).offset();
            assert!(
                (offset - expected).abs() < 1.0e-6,
                "{spec:?}: {offset} != {expected}"
            );
        }
    }

    #[test]
    fn pressed_offsets_follow_held_keys() {
        let offsets: Vec<Real> = keys("wd").pressed_offsets().collect();
        assert_eq!(offsets, vec![0.0, -FRAC_PI_2]);
        assert_eq!(keys("").pressed_offsets().count(), 0);
    }

    #[test]
    fn movement_selects_walk_and_run() {
        let mut machine = ActionMachine::new(ActionConfig::default());
        assert_eq!(machine.step(grounded_input("")).action, ActionState::Idle);
        let walk = machine.step(grounded_input("w"));
        assert_eq!(walk.action, ActionState::Walk);
        assert_eq!(
            walk.transition,
            Some(ActionTransition {
                from: ActionState::Idle,
                to: ActionState::Walk
            })
        );
        let run = machine.step(ActionInput {
            run: true,
            ..grounded_input("w")
        });
        assert_eq!(run.action, ActionState::Run);
        let held = machine.step(ActionInput {
            run: true,
            ..grounded_input("w")
        });
        assert!(held.transition.is_none());
    }

    #[test]
    fn jump_requires_grounded_edge() {
        let mut machine = ActionMachine::new(ActionConfig::default());
        let airborne = machine.step(ActionInput {
            jump_pressed: true,
            grounded: false,
            ..Default::default()
        });
        assert!(!airborne.jump_triggered);
        assert_eq!(airborne.action, ActionState::Idle);

        let jump = machine.step(ActionInput {
            jump_pressed: true,
            ..grounded_input("w")
        });
        assert!(jump.jump_triggered);
        assert_eq!(jump.action, ActionState::Jump);

        let in_flight = machine.step(ActionInput {
            directions: keys("w"),
            grounded: false,
            ..Default::default()
        });
        assert!(!in_flight.jump_triggered);
        assert_eq!(in_flight.action, ActionState::Jump);

        let landed = machine.step(grounded_input("w"));
        assert_eq!(landed.action, ActionState::Walk);
        assert!(!machine.jump_in_flight());
    }

    #[test]
    fn sit_overrides_everything_and_blocks_jump() {
        let mut machine = ActionMachine::new(ActionConfig::default());
        machine.step(grounded_input("w"));
        let sit = machine.step(ActionInput {
            sit_active: true,
            jump_pressed: true,
            run: true,
            ..grounded_input("wa")
        });
        assert_eq!(sit.action, ActionState::Sit);
        assert!(!sit.jump_triggered);
        assert!(!sit.action.allows_horizontal_motion());
    }

    #[test]
    fn idle_and_sit_keep_facing() {
        let machine = ActionMachine::new(ActionConfig::default());
        let facing = heading_rotation(0.4);
        for action in [ActionState::Idle, ActionState::Sit] {
            assert_eq!(machine.face(facing, action, 2.0, 0.0), facing);
        }
        let turned = machine.face(facing, ActionState::Walk, 2.0, 0.0);
        assert!((facing.angle_to(&turned) - 0.15).abs() < 1.0e-4);
    }

    #[test]
    fn rotation_converges_at_fixed_speed() {
        let target = heading_rotation(PI);
        let mut current = heading_rotation(0.0);
        let mut frames = 0;
        while current.angle_to(&target) > 1.0e-5 && frames < 100 {
            let next = rotate_towards(current, target, 0.15);
            assert!(current.angle_to(&next) <= 0.15 + 1.0e-4);
            current = next;
            frames += 1;
        }
        assert!(frames >= 20 && frames <= 23, "took {frames} frames");
    }

    #[test]
    fn heading_direction_matches_rotation() {
        for heading in [0.0, 0.7, -2.1, PI] {
            let rotated = heading_rotation(heading) * Vector::z();
            assert!((rotated - heading_direction(heading)).norm() < 1.0e-5);
        }
    }
}
