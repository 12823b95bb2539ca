//! Head tracking demo: runs the tracking engine over a simulated scene.

use anyhow::Result;
use clap::Parser;
use head_tracking::app::{AppConfig, DeliveryMode, TrackingApp};
use head_tracking::config::{Config, EXAMPLE_CONFIG};
use head_tracking::simulation::SimulatedHead;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Scene frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Number of simulated heads, spread across the scene
    #[arg(short, long)]
    faces: Option<usize>,

    /// Stop after this many seconds
    #[arg(long, default_value = "5")]
    duration: f64,

    /// Track a single face
    #[arg(short, long)]
    single_face: bool,

    /// Poll frames instead of receiving callbacks
    #[arg(short, long)]
    poll: bool,

    /// Detection noise amplitude in pixels
    #[arg(short, long)]
    noise: Option<f64>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn simulated_heads(count: usize) -> Vec<SimulatedHead> {
    (0..count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f32;
            SimulatedHead {
                position: [-150.0 + 150.0 * offset, 0.0, 550.0 + 100.0 * offset],
                velocity: [if i % 2 == 0 { 30.0 } else { -30.0 }, 10.0, 0.0],
                ..SimulatedHead::default()
            }
        })
        .collect()
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Head Tracking - simulated scene");

    // Load configuration if provided
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path);
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Failed to load config file: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    // Command line overrides
    if let Some(fps) = args.fps {
        config.simulation.fps = fps;
        config.engine.camera.fps = fps;
    }
    if let Some(count) = args.faces {
        config.simulation.heads = simulated_heads(count);
    }
    if let Some(noise) = args.noise {
        config.simulation.noise_px = noise;
    }
    if args.single_face {
        config.engine.face_tracker.single_face.enable = true;
    }

    let app_config = AppConfig {
        config,
        delivery: if args.poll { DeliveryMode::Polling } else { DeliveryMode::Callback },
        duration: Some(Duration::from_secs_f64(args.duration.max(0.0))),
    };

    // Create and run application
    let mut app = TrackingApp::new(app_config)?;
    let summary = app.run()?;

    if let Some(frame) = summary.last_frame {
        for (i, face) in frame.faces.iter().enumerate() {
            let pos = face.point.pos;
            info!("Face {i}: ({:.1}, {:.1}, {:.1}) mm", pos.x, pos.y, pos.z);
        }
    }

    Ok(())
}
