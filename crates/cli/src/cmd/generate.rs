//! Test frame generator

use anyhow::Result;
use owo_colors::OwoColorize;
use rendermon_lib::generator::{self, GenerateOptions};
use rendermon_lib::logging;
use std::path::PathBuf;
use std::time::Duration;

pub async fn run(
    dir: PathBuf,
    frames: u64,
    interval_ms: u64,
    jitter_ms: u64,
    ext: String,
    clean: bool,
) -> Result<()> {
    logging::init_quiet();

    let options = GenerateOptions {
        dir,
        frames,
        interval: Duration::from_millis(interval_ms),
        jitter: Duration::from_millis(jitter_ms),
        extension: ext,
        clean,
    };
    options.validate()?;

    println!(
        "{} {} frames into {} every {}ms",
        "Generating".bold(),
        options.frames,
        options.dir.display().cyan(),
        interval_ms
    );

    generator::run(options, true).await?;

    println!("{}", "Done".green());
    Ok(())
}
