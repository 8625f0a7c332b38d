use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod demo;

use demo::DemoConfig;

#[derive(Parser)]
#[command(name = "trellis-cli", about = "Drive trellis scenes headlessly")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Build the demo scene and render frames on the recording backend
    Demo {
        /// Number of frames to run
        #[arg(short, long, default_value = "3")]
        frames: u32,
        /// Use an orthographic camera instead of a perspective one
        #[arg(long)]
        orthographic: bool,
        /// JSON file with demo and scene settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("trellis-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", trellis_common::crate_info());
            println!("store: {}", trellis_store::crate_info());
            println!("spatial: {}", trellis_spatial::crate_info());
            println!("render: {}", trellis_render::crate_info());
            println!("scene: {}", trellis_scene::crate_info());
        }
        Commands::Demo {
            frames,
            orthographic,
            config,
        } => {
            let config = match config {
                Some(path) => DemoConfig::load(path)?,
                None => DemoConfig::default(),
            };
            println!(
                "Demo: frames={frames}, camera={}",
                if orthographic { "orthographic" } else { "perspective" }
            );
            demo::run(frames, orthographic, &config)?;
        }
    }

    Ok(())
}
