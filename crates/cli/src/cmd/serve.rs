//! Run the monitor server

use anyhow::Result;
use owo_colors::OwoColorize;
use rendermon_lib::server::{self, ServeOptions};
use rendermon_lib::{logging, system_config};
use std::path::PathBuf;

/// Command-line overrides for `rendermon serve`
pub struct ServeArgs {
    pub dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub total: Option<u64>,
    pub config: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = system_config::load(args.config.as_deref())?;

    if let Some(dir) = args.dir {
        config.watch.directory = dir;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(total) = args.total {
        config.watch.default_total_frames = total;
    }
    if let Some(log_dir) = args.log_dir {
        config.logging.directory = Some(log_dir);
    }
    config.validate()?;

    let _guard = logging::init(config.logging.directory.as_deref())?;

    println!("{}", "rendermon".bold());
    println!(
        "  {} {}",
        "Watching:".dimmed(),
        config.watch.directory.display().cyan()
    );
    println!(
        "  {} http://{}:{}",
        "Server:  ".dimmed(),
        config.server.host,
        config.server.port
    );

    server::serve(ServeOptions {
        host: config.server.host.clone(),
        port: config.server.port,
        engine: config.engine_config(),
    })
    .await
}
