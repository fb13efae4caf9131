//! rendermon CLI - render progress monitor

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// rendermon - Live progress for image-sequence renders
#[derive(Parser)]
#[command(name = "rendermon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a render directory and serve progress to viewers
    Serve {
        /// Directory the render writes frames into
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Port to listen on (default: 3000, or $PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,
        /// Expected total frames until a viewer sets one
        #[arg(short, long)]
        total: Option<u64>,
        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also write daily rolling logs here
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Show live progress from a running server
    View {
        /// WebSocket endpoint of the server
        #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
        url: String,
    },
    /// Write test frames into a directory on a timer
    Generate {
        /// Output directory
        #[arg(short, long, default_value = "render_output")]
        dir: PathBuf,
        /// Number of frames to write
        #[arg(short, long, default_value = "100")]
        frames: u64,
        /// Delay between frames in milliseconds
        #[arg(long, default_value = "30000")]
        interval_ms: u64,
        /// Random extra delay per frame, up to this many milliseconds
        #[arg(long, default_value = "0")]
        jitter_ms: u64,
        /// Frame file extension
        #[arg(long, default_value = "exr")]
        ext: String,
        /// Delete existing frames first
        #[arg(long)]
        clean: bool,
    },
    /// Show configuration
    Config {
        /// Print only the config file path
        #[arg(long, conflicts_with = "example")]
        path: bool,
        /// Print an annotated example config file
        #[arg(long)]
        example: bool,
        /// Config file to read (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            dir,
            port,
            host,
            total,
            config,
            log_dir,
        } => {
            cmd::serve::run(cmd::serve::ServeArgs {
                dir,
                port,
                host,
                total,
                config,
                log_dir,
            })
            .await
        }
        Commands::View { url } => cmd::view::run(&url).await,
        Commands::Generate {
            dir,
            frames,
            interval_ms,
            jitter_ms,
            ext,
            clean,
        } => cmd::generate::run(dir, frames, interval_ms, jitter_ms, ext, clean).await,
        Commands::Config {
            path,
            example,
            config,
        } => cmd::config::run(path, example, config.as_deref()).await,
    }
}
