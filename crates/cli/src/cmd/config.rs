//! Configuration display command
//!
//! Prints the effective configuration, its location, or an example file.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use rendermon_lib::system_config;
use std::path::Path;

pub async fn run(path_only: bool, example: bool, config_path: Option<&Path>) -> Result<()> {
    if example {
        print!("{}", system_config::example_config());
        return Ok(());
    }

    let location = match config_path {
        Some(p) => p.to_path_buf(),
        None => system_config::config_file_path().context("Could not determine config file path")?,
    };

    if path_only {
        println!("{}", location.display());
        return Ok(());
    }

    let config = system_config::load(Some(&location))?;
    let exists = location.exists();

    println!("{}", "System Configuration".bold());
    println!(
        "{}: {} {}\n",
        "Location".dimmed(),
        location.display().dimmed(),
        if exists { "" } else { "(not found, using defaults)" }.dimmed()
    );

    println!("{}", "[server]".yellow());
    println!("  {} = {}", "host".cyan(), config.server.host);
    println!("  {} = {}", "port".cyan(), config.server.port);

    let w = &config.watch;
    println!("\n{}", "[watch]".yellow());
    println!("  {} = {}", "directory".cyan(), w.directory.display());
    println!("  {} = {}", "default_total_frames".cyan(), w.default_total_frames);
    println!(
        "  {} = {} {}",
        "stability_threshold_ms".cyan(),
        w.stability_threshold_ms,
        format!("({:.1}s)", w.stability_threshold_ms as f64 / 1000.0).dimmed()
    );
    println!("  {} = {}", "poll_interval_ms".cyan(), w.poll_interval_ms);
    println!(
        "  {} = {} {}",
        "reconcile_interval_secs".cyan(),
        w.reconcile_interval_secs,
        format!("({}s)", w.reconcile_interval_secs).dimmed()
    );
    println!("  {} = {}", "frame_time_epsilon_ms".cyan(), w.frame_time_epsilon_ms);

    println!("\n{}", "[detector]".yellow());
    println!("  {} = {:?}", "strategy".cyan(), config.detector.strategy);
    println!("  {} = {:?}", "timestamp".cyan(), config.detector.timestamp);

    println!("\n{}", "[logging]".yellow());
    match &config.logging.directory {
        Some(dir) => println!("  {} = {}", "directory".cyan(), dir.display()),
        None => println!("  {} = {}", "directory".cyan(), "(stderr only)".dimmed()),
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  default_total_frames: 1-10,000,000");
    println!("  stability_threshold_ms: 50-60000");
    println!("  poll_interval_ms: 10-10000 (below stability_threshold_ms)");
    println!("  reconcile_interval_secs: 1-3600");
    println!("  frame_time_epsilon_ms: 0-60000");

    Ok(())
}
