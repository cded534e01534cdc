use std::path::{Path, PathBuf};

use anyhow::Result;
use cadence_demo::config::DemoConfig;
use cadence_demo::headless::{self, HeadlessOptions};
use cadence_demo::scene;
use cadence_engine::logging::init_logging;
use cadence_engine::window::Runtime;
use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(about = "Raymarched hexagon grid on the cadence fixed-step loop", long_about = None)]
struct CliArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run on the recording device instead of opening a window.
    #[arg(long)]
    headless: bool,

    /// Frames to render before a headless run stops.
    #[arg(long, default_value_t = 120)]
    frames: u64,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    init_logging(config.engine.logging_config());

    let base_dir = args
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut scene_config = config.scene_config(&base_dir)?;

    if args.headless {
        let options = HeadlessOptions {
            frames: args.frames,
            clock: config.engine.clock_config()?,
            ..HeadlessOptions::default()
        };
        let report = headless::run(&scene_config, options)?;
        log::info!(
            "{} frames rendered, {} skipped, {} resources released",
            report.stats.frames_rendered,
            report.stats.frames_skipped,
            report.resources_destroyed
        );
        return Ok(());
    }

    let engine = &config.engine;
    let stats = Runtime::run(
        engine.runtime_config(),
        engine.gpu_init(),
        engine.clock_config()?,
        move |device, graph| {
            // Render at the swap image size so the present covers the window.
            let size = device.surface_size();
            scene_config.width = size.width.max(1);
            scene_config.height = size.height.max(1);
            scene::build(device, graph, &scene_config)
        },
    )?;
    log::info!("{} updates, {} frames", stats.updates, stats.frames_rendered);
    Ok(())
}
