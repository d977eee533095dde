use chrono::{DateTime, TimeZone};

/// Minutes as shown next to targets, e.g. `2h 5m`.
pub fn format_minutes(minutes: i64) -> String {
    format!("{}h {}m", minutes.div_euclid(60), minutes.rem_euclid(60))
}

/// Length of a finished session, e.g. `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Elapsed time of a running session as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Start of a session in the history list, e.g. `Apr 5, 9:03 AM`.
pub fn format_session_start<Tz: TimeZone>(start: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    start.format("%b %-d, %-I:%M %p").to_string()
}
