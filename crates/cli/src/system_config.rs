//! System configuration
//!
//! Loaded from `<config dir>/rendermon/config.toml`. Every key has a
//! default, so a missing file or a partial file is fine. Command-line flags
//! are applied on top by the caller.

use crate::engine::EngineConfig;
use anyhow::{Context, Result};
use rendermon_core::{ExtractionStrategy, FrameDetector, TimestampSource};
use rendermon_watcher::WatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub watch: WatchSettings,
    pub detector: DetectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Initial watch directory, relative to the working directory
    pub directory: PathBuf,
    /// Total used until a viewer sets one
    pub default_total_frames: u64,
    pub stability_threshold_ms: u64,
    pub poll_interval_ms: u64,
    pub reconcile_interval_secs: u64,
    /// Smallest last-frame-time drift worth a broadcast after a rescan
    pub frame_time_epsilon_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("render_output"),
            default_total_frames: 120,
            stability_threshold_ms: 2000,
            poll_interval_ms: 100,
            reconcile_interval_secs: 5,
            frame_time_epsilon_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetectorConfig {
    pub strategy: ExtractionStrategy,
    pub timestamp: TimestampSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Daily rolling log files are written here when set
    pub directory: Option<PathBuf>,
}

impl SystemConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let w = &self.watch;

        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if w.directory.as_os_str().is_empty() {
            anyhow::bail!("watch.directory must not be empty");
        }
        if w.default_total_frames == 0 || w.default_total_frames > 10_000_000 {
            anyhow::bail!(
                "watch.default_total_frames must be between 1 and 10,000,000 (got {})",
                w.default_total_frames
            );
        }
        if !(50..=60_000).contains(&w.stability_threshold_ms) {
            anyhow::bail!(
                "watch.stability_threshold_ms must be between 50 and 60000 (got {})",
                w.stability_threshold_ms
            );
        }
        if !(10..=10_000).contains(&w.poll_interval_ms) {
            anyhow::bail!(
                "watch.poll_interval_ms must be between 10 and 10000 (got {})",
                w.poll_interval_ms
            );
        }
        if w.poll_interval_ms >= w.stability_threshold_ms {
            anyhow::bail!("watch.poll_interval_ms must be smaller than watch.stability_threshold_ms");
        }
        if !(1..=3600).contains(&w.reconcile_interval_secs) {
            anyhow::bail!(
                "watch.reconcile_interval_secs must be between 1 and 3600 (got {})",
                w.reconcile_interval_secs
            );
        }
        if w.frame_time_epsilon_ms > 60_000 {
            anyhow::bail!(
                "watch.frame_time_epsilon_ms must be at most 60000 (got {})",
                w.frame_time_epsilon_ms
            );
        }

        Ok(())
    }

    /// Apply environment overrides (`PORT`)
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT environment variable: {port}"))?;
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            watch_dir: self.watch.directory.clone(),
            default_total_frames: self.watch.default_total_frames,
            watch: WatchConfig {
                stability_threshold: Duration::from_millis(self.watch.stability_threshold_ms),
                poll_interval: Duration::from_millis(self.watch.poll_interval_ms),
            },
            reconcile_interval: Duration::from_secs(self.watch.reconcile_interval_secs),
            frame_time_epsilon: Duration::from_millis(self.watch.frame_time_epsilon_ms),
            detector: FrameDetector::new(self.detector.strategy),
            timestamp_source: self.detector.timestamp,
        }
    }
}

/// Default location of the config file
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rendermon").join("config.toml"))
}

/// Load from `path`, or from the default location when `None`
///
/// A missing file yields defaults. Environment overrides are applied and
/// the result is validated.
pub fn load(path: Option<&Path>) -> Result<SystemConfig> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => config_file_path(),
    };

    let mut config = match path {
        Some(ref p) if p.exists() => load_file(p)?,
        _ => SystemConfig::default(),
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Parse one TOML file without env overrides or validation
pub fn load_file(path: &Path) -> Result<SystemConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Annotated example file
pub fn example_config() -> String {
    r#"# rendermon configuration
# Location: ~/.config/rendermon/config.toml (platform config directory)

[server]
# Interface and port for the viewer WebSocket and HTTP API.
# The PORT environment variable overrides `port`.
host = "0.0.0.0"
port = 3000

[watch]
# Directory the render writes frames into (created if missing)
directory = "render_output"
# Expected total until a viewer sets one
default_total_frames = 120
# A frame counts once its size has held still this long
stability_threshold_ms = 2000
poll_interval_ms = 100
# Full rescan interval, catches missed notifications
reconcile_interval_secs = 5
frame_time_epsilon_ms = 100

[detector]
# Which digit run is the frame number: "first" or "last"
strategy = "first"
# Frame ordering timestamp: "created" (birth time, falls back to mtime) or "modified"
timestamp = "created"

[logging]
# Uncomment to also write daily rolling log files
# directory = "/var/log/rendermon"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        config.validate().unwrap();

        let engine = config.engine_config();
        assert_eq!(engine.default_total_frames, 120);
        assert_eq!(engine.watch.stability_threshold, Duration::from_millis(2000));
        assert_eq!(engine.reconcile_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_example_parses_to_defaults() {
        let parsed: SystemConfig = toml::from_str(&example_config()).unwrap();
        assert_eq!(parsed, SystemConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[watch]\ndefault_total_frames = 240\n\n[detector]\nstrategy = \"last\"\n",
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.watch.default_total_frames, 240);
        assert_eq!(config.detector.strategy, ExtractionStrategy::Last);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.watch.poll_interval_ms, 100);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = SystemConfig::default();
        config.watch.default_total_frames = 0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.watch.poll_interval_ms = 5_000;
        config.watch.stability_threshold_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.watch.reconcile_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[watch\n").unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
