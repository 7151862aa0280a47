use character_actions::{ActionState, AnimationSink, ClipPlayback, ClipTable, NullSink};
use player_camera::FollowCamera;
use player_controller::{CharacterController, ControllerConfig, InputSnapshot, WorldSlot};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use world_geometry::WorldGeometry;

const DT: Real = 1.0 / 60.0;

const PLAZA: &str = r#"
version = 1
name = "plaza"

[[solids]]
id = "floor"
kind = "box"
pos = [0.0, -0.5, 0.0]
size = [40.0, 1.0, 40.0]
"#;

fn world(text: &str) -> WorldSlot {
    let baked = WorldGeometry::parse_toml(text)
        .expect("parse world")
        .bake()
        .expect("bake world");
    let mut slot = WorldSlot::default();
    slot.load_baked(&baked);
    slot
}

fn plaza_with(extra: &str) -> WorldSlot {
    world(&format!("{PLAZA}\n{extra}"))
}

/// Camera placed so that "forward" walks along +X.
fn facing_plus_x(config: &ControllerConfig) -> CharacterController<NullSink, FollowCamera> {
    let spawn = config.fall_reset().spawn;
    let camera = FollowCamera::new(spawn + Vector::new(-5.0, 2.0, 0.0), spawn);
    CharacterController::new(config, NullSink, ClipTable::new(), camera)
}

fn spawn_at(x: Real, z: Real) -> ControllerConfig {
    ControllerConfig {
        spawn: [x, 1.0, z],
        ..Default::default()
    }
}

fn settle<S: AnimationSink>(controller: &mut CharacterController<S, FollowCamera>, world: &WorldSlot) {
    for _ in 0..90 {
        controller.tick(world, InputSnapshot::default(), DT);
    }
    assert!(controller.character().grounded, "character never landed");
}

fn keys(names: &[&str]) -> InputSnapshot {
    InputSnapshot::from_key_names(names.iter().copied())
}

#[test]
fn grounded_without_keys_is_idle_and_still() {
    let world = world(PLAZA);
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);
    let frame = controller.tick(&world, InputSnapshot::default(), DT);
    assert_eq!(frame.action, ActionState::Idle);
    assert!(frame.grounded);
    assert_eq!(frame.horizontal_velocity, Vector::zeros());
    assert!(frame.velocity.x.abs() < 1.0e-6 && frame.velocity.z.abs() < 1.0e-6);
    assert!((frame.position.y - 0.5).abs() < 1.0e-2);
}

#[test]
fn airborne_vertical_velocity_decreases_until_landing() {
    let world = world(PLAZA);
    let config = ControllerConfig {
        spawn: [0.0, 4.0, 0.0],
        ..Default::default()
    };
    let mut controller = facing_plus_x(&config);
    let mut previous = controller.character().velocity.y;
    let mut landed = false;
    for _ in 0..120 {
        let frame = controller.tick(&world, InputSnapshot::default(), DT);
        if frame.grounded {
            landed = true;
            break;
        }
        // A touch that does not ground may cancel the fall speed.
        if frame.correction == Vector::zeros() {
            assert!(frame.velocity.y < previous);
        }
        previous = frame.velocity.y;
    }
    assert!(landed);
}

#[test]
fn free_fall_matches_gravity() {
    let mut controller = facing_plus_x(&ControllerConfig::default());
    let ticks = 30;
    for _ in 0..ticks {
        controller.tick(&WorldSlot::Unloaded, InputSnapshot::default(), DT);
    }
    let expected = -30.0 * ticks as Real * DT;
    assert!((controller.character().velocity.y - expected).abs() < 1.0e-3);
    assert!(!controller.character().grounded);
}

#[test]
fn jump_triggers_only_on_grounded_edge() {
    let world = world(PLAZA);
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);

    let jump = keys(&["space"]);
    let frame = controller.tick(&world, jump, DT);
    assert_eq!(frame.action, ActionState::Jump);
    assert!(!frame.grounded);
    assert!((frame.velocity.y - (10.0 - 30.0 * DT)).abs() < 1.0e-4);

    // Holding the key is not a new edge.
    let held = controller.tick(&world, jump, DT);
    assert!(held.velocity.y < frame.velocity.y);

    // Release and press again mid-air: no second impulse.
    controller.tick(&world, InputSnapshot::default(), DT);
    let before = controller.character().velocity.y;
    let airborne_press = controller.tick(&world, jump, DT);
    assert!(!airborne_press.grounded);
    assert!(airborne_press.velocity.y < before);
    assert_eq!(airborne_press.action, ActionState::Jump);

    let mut landed = None;
    for _ in 0..120 {
        let frame = controller.tick(&world, InputSnapshot::default(), DT);
        if frame.grounded {
            landed = Some(frame);
            break;
        }
    }
    let landed = landed.expect("landed after jump");
    assert!((landed.position.y - 0.5).abs() < 0.2);
    let after = controller.tick(&world, InputSnapshot::default(), DT);
    assert_eq!(after.action, ActionState::Idle);
}

#[test]
fn sit_toggle_stops_walking_on_the_same_tick() {
    let world = world(PLAZA);
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);

    let walk = keys(&["w"]);
    let mut last = controller.tick(&world, walk, DT);
    for _ in 0..10 {
        last = controller.tick(&world, walk, DT);
    }
    assert_eq!(last.action, ActionState::Walk);
    assert!(last.horizontal_velocity.norm() > 1.0);

    let sit = controller.tick(&world, keys(&["w", "c"]), DT);
    assert_eq!(sit.action, ActionState::Sit);
    assert_eq!(sit.horizontal_velocity, Vector::zeros());
    assert!((sit.position.x - last.position.x).abs() < 1.0e-5);
    assert!((sit.position.z - last.position.z).abs() < 1.0e-5);

    // Sit is a toggle: releasing the key keeps sitting.
    let still = controller.tick(&world, walk, DT);
    assert_eq!(still.action, ActionState::Sit);
    assert!((still.position.x - sit.position.x).abs() < 1.0e-5);

    let stand = controller.tick(&world, keys(&["w", "c"]), DT);
    assert_eq!(stand.action, ActionState::Walk);
    assert!(stand.position.x > still.position.x);
}

#[test]
fn wall_blocks_walking() {
    let world = plaza_with(
        r#"
[[solids]]
id = "wall"
kind = "box"
pos = [3.5, 1.0, 0.0]
size = [1.0, 2.0, 10.0]
"#,
    );
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);
    let walk = keys(&["w"]);
    let mut frame = controller.tick(&world, walk, DT);
    for _ in 0..180 {
        frame = controller.tick(&world, walk, DT);
    }
    assert!(frame.position.x < 2.55, "walked through wall: {}", frame.position.x);
    assert!(frame.position.x > 2.3);
    assert!(frame.position.z.abs() < 1.0e-3);
    assert!(frame.grounded);
}

#[test]
fn ramp_lifts_the_character() {
    let world = plaza_with(
        r#"
[[solids]]
id = "ramp"
kind = "ramp"
pos = [2.0, 0.0, 0.0]
length = 8.0
width = 4.0
angle_deg = 15.0
"#,
    );
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);
    let walk = keys(&["w"]);
    let mut frame = controller.tick(&world, walk, DT);
    for _ in 0..180 {
        frame = controller.tick(&world, walk, DT);
    }
    assert!(frame.position.x > 3.5);
    assert!(frame.position.y > 1.0, "stayed low: {}", frame.position.y);
}

#[test]
fn running_diagonally_is_sqrt_two_faster_by_default() {
    let world = world(PLAZA);
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);
    let straight = controller.tick(&world, keys(&["w", "shift"]), DT);
    let diagonal = controller.tick(&world, keys(&["w", "a", "shift"]), DT);
    assert_eq!(straight.action, ActionState::Run);
    assert!((straight.horizontal_velocity.norm() - 10.0).abs() < 1.0e-3);
    assert!((diagonal.horizontal_velocity.norm() - 10.0 * 2.0_f32.sqrt()).abs() < 1.0e-3);
}

#[test]
fn facing_turns_toward_movement_at_limited_speed() {
    let world = world(PLAZA);
    let mut controller = facing_plus_x(&spawn_at(0.0, 0.0));
    settle(&mut controller, &world);
    let start = controller.character().orientation;
    let frame = controller.tick(&world, keys(&["w"]), DT);
    assert!((start.angle_to(&frame.orientation) - 0.15).abs() < 1.0e-4);
    let mut orientation = frame.orientation;
    for _ in 0..20 {
        orientation = controller.tick(&world, keys(&["w"]), DT).orientation;
    }
    // Heading π/2 turns local +Z onto +X.
    let forward = orientation * Vector::z();
    assert!((forward - Vector::x()).norm() < 1.0e-3);

    let idle = controller.tick(&world, InputSnapshot::default(), DT);
    assert_eq!(idle.orientation, orientation);
}

#[test]
fn falling_below_the_floor_respawns() {
    // Floor only covers the origin, so walking off the edge drops forever.
    let world = world(
        r#"
version = 1
name = "ledge"

[[solids]]
id = "pad"
kind = "box"
pos = [0.0, -0.5, 0.0]
size = [2.0, 1.0, 2.0]
"#,
    );
    let config = spawn_at(0.0, 0.0);
    let mut controller = facing_plus_x(&config);
    settle(&mut controller, &world);
    let mut reset = None;
    for _ in 0..600 {
        let frame = controller.tick(&world, keys(&["w", "shift"]), DT);
        if frame.reset {
            reset = Some(frame);
            break;
        }
    }
    let frame = reset.expect("fell off and respawned");
    assert_eq!(frame.position, Point::new(0.0, 1.0, 0.0));
    assert_eq!(frame.velocity, Vector::zeros());
}

#[derive(Default)]
struct Recorder {
    events: Vec<(String, bool)>,
}

impl AnimationSink for Recorder {
    type Clip = String;

    fn fade_in(&mut self, clip: &String, _playback: ClipPlayback) {
        self.events.push((clip.clone(), true));
    }

    fn fade_out(&mut self, clip: &String, _duration: Real) {
        self.events.push((clip.clone(), false));
    }

    fn advance(&mut self, _dt: Real) {}
}

#[test]
fn transitions_drive_clip_fades() {
    let world = world(PLAZA);
    let config = spawn_at(0.0, 0.0);
    let clips = ClipTable::from_fn(|action| Some(action.clip_name().to_string()));
    let camera = FollowCamera::behind(Point::new(0.0, 1.0, 0.0), 5.0, 2.0);
    let mut controller = CharacterController::new(&config, Recorder::default(), clips, camera);
    settle(&mut controller, &world);
    controller.tick(&world, keys(&["w"]), DT);
    controller.tick(&world, keys(&["w", "shift"]), DT);
    let events: Vec<(&str, bool)> = controller
        .animator()
        .sink()
        .events
        .iter()
        .map(|(name, fade_in)| (name.as_str(), *fade_in))
        .collect();
    assert_eq!(
        events,
        vec![
            ("Idle", true),
            ("Idle", false),
            ("Walk", true),
            ("Walk", false),
            ("Run", true),
        ]
    );
}
