//! Terminal viewer
//!
//! Connects to a running server over WebSocket and renders a live progress
//! bar. Elapsed and time-on-current-frame keep ticking between pushes using
//! the clock offset observed on each snapshot.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use rendermon_core::format::{format_duration, format_timestamp};
use rendermon_core::{now_ms, FrameHealth, LiveProgress, ServerMessage, TimestampMs};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Delay before reconnecting after the server goes away
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Redraw interval for the ticking fields
const TICK: Duration = Duration::from_millis(500);

/// One status line for the current view
pub fn status_line(live: &LiveProgress, local_now: TimestampMs) -> String {
    let snapshot = live.snapshot();
    let stats = live.stats();

    let current = format_duration(live.since_last_frame(local_now));
    let current = match live.health(local_now) {
        FrameHealth::Normal => current,
        FrameHealth::Warning => format!("{} (slow)", current),
        FrameHealth::Alert => format!("{} (stalled?)", current),
    };

    format!(
        "{:.1}% | last {} | avg {} | eta {} | elapsed {} | current {}",
        snapshot.percentage,
        format_duration(stats.last_frame_time),
        format_duration(stats.avg_frame_time),
        format_duration(stats.eta),
        format_duration(live.elapsed(local_now)),
        current,
    )
}

/// Header printed when a viewer first receives state
pub fn started_line(live: &LiveProgress) -> String {
    let snapshot = live.snapshot();
    format!(
        "{} of {} frames | first frame {}",
        snapshot.completed_frames,
        snapshot.total_frames,
        format_timestamp(snapshot.first_frame_timestamp),
    )
}

/// Run until Ctrl-C, reconnecting as needed
pub async fn run(url: &str) -> Result<()> {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bar.abandon();
                return Ok(());
            }
            outcome = session(url, &bar) => {
                match outcome {
                    Ok(()) => bar.println(format!("{}", "Server closed the connection".yellow())),
                    Err(e) => bar.println(format!("{} {:#}", "Connection failed:".red(), e)),
                }
            }
        }

        bar.set_message(format!("reconnecting to {url}"));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bar.abandon();
                return Ok(());
            }
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn session(url: &str, bar: &ProgressBar) -> Result<()> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    tracing::info!(url, "Viewer connected");
    bar.println(format!("{} {}", "Connected to".green(), url));

    let (mut sink, mut stream) = ws_stream.split();
    let mut live: Option<LiveProgress> = None;
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(live) = &live {
                    bar.set_message(status_line(live, now_ms()));
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Error { message }) => {
                            bar.println(format!("{} {}", "Server:".red(), message));
                        }
                        Ok(message) => {
                            if let Some(snapshot) = message.snapshot() {
                                let received = now_ms();
                                match live.as_mut() {
                                    Some(current) => current.apply(snapshot.clone(), received),
                                    None => live = Some(LiveProgress::new(snapshot.clone(), received)),
                                }
                                if let Some(current) = live.as_ref() {
                                    if matches!(message, ServerMessage::InitialState(_)) {
                                        bar.println(started_line(current));
                                    }
                                    bar.set_length(current.snapshot().total_frames.max(1));
                                    bar.set_position(current.snapshot().completed_frames);
                                    bar.set_message(status_line(current, received));
                                }
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "Ignoring unrecognised message"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    sink.send(Message::Pong(payload)).await.context("Failed to answer ping")?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("WebSocket receive error"),
            }
        }
    }
}
