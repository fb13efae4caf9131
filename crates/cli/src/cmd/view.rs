//! Terminal progress viewer

use anyhow::Result;
use owo_colors::OwoColorize;
use rendermon_lib::{logging, viewer};

pub async fn run(url: &str) -> Result<()> {
    logging::init_quiet();

    println!("{} {}", "Watching".bold(), url.cyan());
    println!("{}", "Press Ctrl-C to exit".dimmed());

    viewer::run(url).await
}
