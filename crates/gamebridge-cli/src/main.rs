//! Headless runner for WASM game modules.
//!
//! This CLI provides tools for:
//! - Driving a game module for a fixed number of frames without a renderer
//! - Recording and dumping the drawing commands a module issues
//! - Running against a file-backed persistent store
//! - Inspecting a module's exports

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gamebridge::{
    Bridge, BridgeConfig, FileStorage, MemoryStorage, RecordingSurface, Session, StorageBackend,
    Tick,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gamebridge")]
#[command(author, version, about = "Headless WASM game module runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a module for a number of frames against a recording surface
    Run {
        /// Path to the .wasm module
        module: PathBuf,

        /// Number of frames to draw
        #[arg(long, default_value_t = 120)]
        frames: u32,

        /// Simulated frame rate
        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        /// Logical surface width
        #[arg(long, default_value_t = 800.0)]
        width: f64,

        /// Logical surface height
        #[arg(long, default_value_t = 600.0)]
        height: f64,

        /// Back saves with a JSON store file instead of memory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Fuel budget for the session
        #[arg(long)]
        fuel: Option<u64>,

        /// Print every recorded drawing command
        #[arg(long)]
        dump_commands: bool,
    },

    /// List a module's exported functions
    Info {
        /// Path to the .wasm module
        module: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            module,
            frames,
            fps,
            width,
            height,
            store,
            fuel,
            dump_commands,
        } => cmd_run(module, frames, fps, width, height, store, fuel, dump_commands),

        Commands::Info { module } => cmd_info(module),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    path: PathBuf,
    frames: u32,
    fps: f64,
    width: f64,
    height: f64,
    store: Option<PathBuf>,
    fuel: Option<u64>,
    dump_commands: bool,
) -> Result<()> {
    anyhow::ensure!(fps > 0.0, "fps must be positive");

    let mut config = BridgeConfig::default();
    if let Some(fuel) = fuel {
        config = config.fuel_limit(fuel);
    }

    let bridge = Bridge::new(config)?;
    let module = bridge
        .load_module(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!("loaded module '{}'", module.name());

    let surface = RecordingSurface::new(width, height);
    match store {
        Some(store_path) => {
            let storage = FileStorage::open(&store_path)
                .with_context(|| format!("failed to open store {}", store_path.display()))?;
            let session = bridge.instantiate(&module, surface, storage)?;
            run_frames(session, frames, fps, dump_commands)
        }
        None => {
            let session = bridge.instantiate(&module, surface, MemoryStorage::new())?;
            run_frames(session, frames, fps, dump_commands)
        }
    }
}

fn run_frames<B>(
    mut session: Session<RecordingSurface, B>,
    frames: u32,
    fps: f64,
    dump_commands: bool,
) -> Result<()>
where
    B: StorageBackend + 'static,
{
    session.start()?;

    let step_ms = 1000.0 / fps;
    let mut drawn = 0_u32;
    let mut total_draw_us = 0_u64;

    // One extra tick: the first only records its timestamp.
    for i in 0..=frames {
        match session.tick(f64::from(i) * step_ms)? {
            Tick::Skipped => {}
            Tick::Drawn { draw_time_us, .. } => {
                drawn += 1;
                total_draw_us += draw_time_us;
            }
            Tick::Halted => {
                warn!("module halted the frame loop");
                if let Some(location) = session.fault_location() {
                    warn!(
                        "fault at {}:{}:{}",
                        location.path, location.line, location.column
                    );
                }
                break;
            }
        }
    }

    let commands = session.surface().commands();
    println!(
        "{} frames drawn, {} drawing commands, mean draw time {:.1}us",
        drawn,
        commands.len(),
        if drawn > 0 {
            total_draw_us as f64 / f64::from(drawn)
        } else {
            0.0
        }
    );

    if dump_commands {
        for command in commands {
            println!("{command:?}");
        }
    }

    Ok(())
}

fn cmd_info(path: PathBuf) -> Result<()> {
    let bridge = Bridge::new(BridgeConfig::development())?;
    let module = bridge
        .load_module(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    println!("module: {}", module.name());
    println!("exported functions:");
    for name in module.exports() {
        println!("  {name}");
    }

    Ok(())
}
