// CLI application
use clap::Parser;
use gcvideo_core::BackendKind;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

mod commands;

use commands::{AspectArg, ShaderApi};

#[derive(Parser)]
#[command(name = "gcvideo")]
#[command(about = "Headless driver for the GameCube/Wii video renderer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Write the utility shaders and a sample TEV shader for one API
    Shaders {
        /// Shading language to generate
        #[arg(long, value_enum)]
        api: ShaderApi,

        /// Output directory (default: ./shaders/<api>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Drive the renderer with synthetic frames
    Replay {
        /// Number of frames to present
        #[arg(short, long, default_value_t = 60)]
        frames: u32,

        /// Backend to render with (null or wgpu)
        #[arg(short, long, default_value = "null")]
        backend: BackendKind,

        /// Dump every frame into this directory
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Save a screenshot of the first frame
        #[arg(long)]
        screenshot: Option<PathBuf>,

        /// Backbuffer width
        #[arg(long, default_value_t = 640)]
        width: u32,

        /// Backbuffer height
        #[arg(long, default_value_t = 480)]
        height: u32,

        /// Video settings (JSON); defaults when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the presentation rectangle for a window size
    Rect {
        /// Window width
        #[arg(long)]
        width: u32,

        /// Window height
        #[arg(long)]
        height: u32,

        /// Aspect ratio mode
        #[arg(long, value_enum, default_value = "auto")]
        aspect: AspectArg,

        /// Treat the game picture as 16:9 in auto mode
        #[arg(long)]
        wide: bool,

        /// Crop the picture to its expected aspect ratio
        #[arg(long)]
        crop: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Shaders { api, out } => {
            let out = out.unwrap_or_else(|| PathBuf::from("shaders").join(api.dir_name()));
            let pb = create_progress_bar("Generating shaders...");
            let written = commands::write_shaders(api, &out)?;
            pb.finish_with_message(format!("Wrote {written} shaders to {}", out.display()));
        }
        Commands::Replay {
            frames,
            backend,
            dump,
            screenshot,
            width,
            height,
            config,
        } => {
            let options = commands::ReplayOptions {
                frames,
                backend,
                dump,
                screenshot,
                size: (width, height),
                config,
            };
            let pb = ProgressBar::new(frames as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} frames {msg}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            let report = commands::replay(&options, |frame| pb.set_position(frame as u64))?;
            pb.finish_with_message("Replay complete");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Rect {
            width,
            height,
            aspect,
            wide,
            crop,
        } => {
            let report = commands::rect(width, height, aspect, wide, crop);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}
