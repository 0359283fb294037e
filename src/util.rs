use std::time::Duration;

/// Formats `duration` as minutes and seconds, like `3:07`.
///
/// Fractions of a second are truncated.
#[must_use]
pub fn format_time(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
