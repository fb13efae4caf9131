//! Common utilities for integration tests

#![allow(dead_code)]

use filetime::{set_file_mtime, FileTime};
use rendermon_core::{ProgressSnapshot, ServerMessage, TimestampMs, TimestampSource};
use rendermon_lib::engine::EngineConfig;
use rendermon_lib::hub::Outbound;
use rendermon_watcher::WatchConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Fixed base time for frame timestamps
pub const T0: TimestampMs = 1_700_000_000_000;

/// How long to wait for an expected message
pub const WAIT: Duration = Duration::from_secs(10);

/// A throwaway render output directory
pub struct TestRender {
    dir: TempDir,
    root: PathBuf,
}

impl TestRender {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        Self { dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Subdirectory path (not created)
    pub fn child(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write a frame and pin its mtime
    pub fn write_frame(&self, name: &str, mtime_ms: TimestampMs) -> PathBuf {
        write_frame_in(&self.root, name, mtime_ms)
    }

    /// Engine settings tuned for tests: fast debounce, mtime ordering,
    /// reconciliation effectively off
    pub fn engine_config(&self, default_total: u64) -> EngineConfig {
        EngineConfig {
            watch_dir: self.root.clone(),
            default_total_frames: default_total,
            watch: WatchConfig {
                stability_threshold: Duration::from_millis(150),
                poll_interval: Duration::from_millis(20),
            },
            reconcile_interval: Duration::from_secs(3600),
            frame_time_epsilon: Duration::from_millis(100),
            timestamp_source: TimestampSource::Modified,
            ..EngineConfig::default()
        }
    }
}

pub fn write_frame_in(dir: &Path, name: &str, mtime_ms: TimestampMs) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, vec![7u8; 512]).unwrap();
    let secs = (mtime_ms / 1000) as i64;
    let nanos = ((mtime_ms % 1000) * 1_000_000) as u32;
    set_file_mtime(&path, FileTime::from_unix_time(secs, nanos)).unwrap();
    path
}

/// Next decoded message, skipping pings
pub async fn next_message(rx: &mut mpsc::Receiver<Outbound>) -> ServerMessage {
    loop {
        let out = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for viewer message")
            .expect("viewer queue closed");
        match out {
            Outbound::Text(text) => return serde_json::from_str(&text).unwrap(),
            Outbound::Ping => continue,
            Outbound::Close => panic!("viewer queue closed by server"),
        }
    }
}

/// Skip messages until an `update` snapshot satisfies `pred`
pub async fn wait_for_update<F>(rx: &mut mpsc::Receiver<Outbound>, pred: F) -> ProgressSnapshot
where
    F: Fn(&ProgressSnapshot) -> bool,
{
    loop {
        if let ServerMessage::Update(snapshot) = next_message(rx).await {
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }
}

/// Assert nothing is queued after waiting `quiet`
pub async fn assert_quiet(rx: &mut mpsc::Receiver<Outbound>, quiet: Duration) {
    tokio::time::sleep(quiet).await;
    while let Ok(out) = rx.try_recv() {
        if let Outbound::Text(text) = out {
            panic!("unexpected viewer message: {text}");
        }
    }
}
