use std::path::{Path, PathBuf};

use character_actions::{ClipTable, NullSink};
use clap::{Parser, Subcommand};
use player_camera::FollowCamera;
use player_controller::{CharacterController, ControllerConfig, InputSnapshot, WorldSlot};
use world_geometry::{BakedWorld, WorldGeometry};

const EXIT_SUCCESS: i32 = 0;
const EXIT_WORLD: i32 = 10;
const EXIT_CONFIG: i32 = 11;

#[derive(Parser)]
#[command(name = "tools", version, about = "Character movement tools CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake a world description and print index statistics.
    Inspect {
        #[arg(value_name = "WORLD")]
        world: PathBuf,
    },
    /// Run the frame loop headless with a fixed key set.
    Simulate(SimulateArgs),
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(value_name = "WORLD")]
    world: PathBuf,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 120)]
    ticks: u32,

    /// Comma-separated held keys, e.g. `w,shift`.
    #[arg(long, value_delimiter = ',')]
    keys: Vec<String>,

    #[arg(long, default_value_t = 60.0)]
    hz: f32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Inspect { world } => run_inspect(&world),
        Commands::Simulate(args) => run_simulate(args),
    };
    std::process::exit(exit_code);
}

fn bake_world(path: &Path) -> Result<BakedWorld, i32> {
    let geometry = match WorldGeometry::load(path) {
        Ok(geometry) => geometry,
        Err(err) => {
            eprintln!("world load failed: {}", err);
            return Err(EXIT_WORLD);
        }
    };
    match geometry.bake() {
        Ok(baked) => Ok(baked),
        Err(err) => {
            eprintln!("world bake failed: {}", err);
            Err(EXIT_WORLD)
        }
    }
}

fn run_inspect(path: &Path) -> i32 {
    let baked = match bake_world(path) {
        Ok(baked) => baked,
        Err(code) => return code,
    };
    let mut slot = WorldSlot::default();
    slot.load_baked(&baked);

    println!("world: {}", baked.name);
    for group in &baked.groups {
        println!(
            "  group {:<12} {:>6} triangles  [{}]",
            group.material,
            group.triangles.len(),
            group.attributes.join(", ")
        );
    }
    for skipped in &baked.skipped {
        println!("  skipped {:<10} {}", skipped.material, skipped.error);
    }
    println!("dropped degenerate: {}", baked.dropped_degenerate);
    if let Some(world) = slot.ready() {
        let index = world.index();
        println!(
            "index: {} triangles, {} nodes",
            index.triangle_count(),
            index.node_count()
        );
        if let Some(bounds) = index.bounds() {
            println!(
                "bounds: ({:.2}, {:.2}, {:.2}) .. ({:.2}, {:.2}, {:.2})",
                bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
            );
        }
        let validation = index.validate();
        for warning in &validation.warnings {
            eprintln!("index warning: {}", warning);
        }
        for error in &validation.errors {
            eprintln!("index error: {}", error);
        }
        if !validation.is_ok() {
            return EXIT_WORLD;
        }
    }
    EXIT_SUCCESS
}

fn run_simulate(args: SimulateArgs) -> i32 {
    let config = match &args.config {
        Some(path) => match ControllerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("config load failed: {}", err);
                return EXIT_CONFIG;
            }
        },
        None => ControllerConfig::default(),
    };
    let baked = match bake_world(&args.world) {
        Ok(baked) => baked,
        Err(code) => return code,
    };
    let mut slot = WorldSlot::default();
    slot.load_baked(&baked);

    let spawn = config.fall_reset().spawn;
    let camera = FollowCamera::behind(spawn, 5.0, 2.0);
    let mut controller = CharacterController::new(&config, NullSink, ClipTable::new(), camera);
    let input = InputSnapshot::from_key_names(&args.keys);
    let dt = 1.0 / args.hz.max(1.0);

    let mut resets = 0;
    let mut transitions = 0;
    let mut frame = None;
    for _ in 0..args.ticks {
        let next = controller.tick(&slot, input, dt);
        resets += usize::from(next.reset);
        transitions += usize::from(next.transition.is_some());
        frame = Some(next);
    }

    let Some(frame) = frame else {
        println!("no ticks run");
        return EXIT_SUCCESS;
    };
    println!(
        "after {} ticks: position ({:.3}, {:.3}, {:.3})",
        args.ticks, frame.position.x, frame.position.y, frame.position.z
    );
    println!(
        "velocity ({:.3}, {:.3}, {:.3})",
        frame.velocity.x, frame.velocity.y, frame.velocity.z
    );
    println!(
        "action {:?}, grounded {}, transitions {}, resets {}",
        frame.action, frame.grounded, transitions, resets
    );
    EXIT_SUCCESS
}
