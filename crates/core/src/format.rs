//! Human-readable formatting for durations and timestamps

use crate::TimestampMs;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Format as `1h 2m 3s`; absent values render as `N/A`
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "N/A".to_string();
    };

    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h ", hours));
    }
    if minutes > 0 || hours > 0 {
        out.push_str(&format!("{}m ", minutes));
    }
    out.push_str(&format!("{}s", seconds));
    out
}

/// Format as an RFC 3339 UTC timestamp; absent values render as `N/A`
pub fn format_timestamp(ts: Option<TimestampMs>) -> String {
    ts.and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(None), "N/A");
        assert_eq!(format_duration(Some(Duration::ZERO)), "0s");
        assert_eq!(format_duration(Some(Duration::from_millis(9_900))), "9s");
        assert_eq!(format_duration(Some(Duration::from_secs(980))), "16m 20s");
        assert_eq!(format_duration(Some(Duration::from_secs(3_600))), "1h 0m 0s");
        assert_eq!(format_duration(Some(Duration::from_secs(3_725))), "1h 2m 5s");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(None), "N/A");
        assert_eq!(
            format_timestamp(Some(1_710_806_400_123)),
            "2024-03-19T00:00:00.123Z"
        );
    }
}
