//! Test frame generator
//!
//! Simulates a render by writing numbered frame files into a directory on a
//! timer. Useful for trying the server without a renderer.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, RngCore};
use rendermon_core::detect::FRAME_EXTENSIONS;
use rendermon_core::FrameDetector;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Payload size of each generated frame
pub const FRAME_BYTES: usize = 1024;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub dir: PathBuf,
    pub frames: u64,
    pub interval: Duration,
    /// Random extra delay added to each interval, up to this much
    pub jitter: Duration,
    pub extension: String,
    /// Delete existing frame files before starting
    pub clean: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("render_output"),
            frames: 100,
            interval: Duration::from_secs(30),
            jitter: Duration::ZERO,
            extension: "exr".to_string(),
            clean: false,
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<()> {
        let ext = self.extension.trim_start_matches('.').to_ascii_lowercase();
        if !FRAME_EXTENSIONS.contains(&ext.as_str()) {
            anyhow::bail!(
                "Unsupported extension '{}'; expected one of: {}",
                self.extension,
                FRAME_EXTENSIONS.join(", ")
            );
        }
        if self.frames == 0 {
            anyhow::bail!("--frames must be at least 1");
        }
        Ok(())
    }
}

/// Filename for frame `number`
pub fn frame_name(number: u64, extension: &str) -> String {
    format!("render_frame_{:04}.{}", number, extension.trim_start_matches('.'))
}

/// Remove files that look like frames; returns how many were deleted
pub fn clean_frames(dir: &Path) -> Result<usize> {
    let detector = FrameDetector::default();
    let mut removed = 0;

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if detector.classify(name).is_ok() {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Write one frame with random contents
pub fn write_frame(dir: &Path, number: u64, extension: &str) -> Result<PathBuf> {
    let mut payload = vec![0u8; FRAME_BYTES];
    rand::thread_rng().fill_bytes(&mut payload);

    let path = dir.join(frame_name(number, extension));
    fs::write(&path, &payload).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Generate `options.frames` frames, one per interval
pub async fn run(options: GenerateOptions, show_progress: bool) -> Result<()> {
    options.validate()?;
    let extension = options.extension.trim_start_matches('.').to_ascii_lowercase();

    fs::create_dir_all(&options.dir)
        .with_context(|| format!("Failed to create {}", options.dir.display()))?;

    if options.clean {
        let removed = clean_frames(&options.dir)?;
        info!(removed, dir = %options.dir.display(), "Removed existing frames");
    }

    let bar = if show_progress {
        let bar = ProgressBar::new(options.frames);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {pos}/{len} frames {msg}")
                .context("Invalid progress template")?,
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    info!(
        frames = options.frames,
        interval_ms = options.interval.as_millis() as u64,
        dir = %options.dir.display(),
        "Generating frames"
    );

    for number in 1..=options.frames {
        let path = write_frame(&options.dir, number, &extension)?;
        debug!(file = %path.display(), "Wrote frame");
        bar.set_message(frame_name(number, &extension));
        bar.inc(1);

        if number < options.frames {
            tokio::time::sleep(options.interval + jitter(options.jitter)).await;
        }
    }

    bar.finish_with_message("done");
    info!(frames = options.frames, "Generation complete");
    Ok(())
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(ms)
}
