//! Human-readable time formatting for diagnostics
//!
//! Conflict messages are read by an operator during manual review, so time
//! differences and UTC offsets are rendered in a compact, unambiguous form.

use chrono::Duration;

/// Thresholds (seconds) for selecting the delta format
const SECONDS_FORMAT_MAX: i64 = 100; // < 100s → Xs
const MINUTES_FORMAT_MAX: i64 = 6000; // < 100m → XmYYs
const HOURS_FORMAT_MAX: i64 = 90000; // < 25h → XhYYm
// >= 25h → Xd YYh

/// Format a signed time difference.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use pmx_common::human_time::format_delta;
///
/// assert_eq!(format_delta(Duration::seconds(45)), "+45s");
/// assert_eq!(format_delta(Duration::seconds(-330)), "-5m30s");
/// assert_eq!(format_delta(Duration::seconds(7260)), "+2h01m");
/// assert_eq!(format_delta(Duration::seconds(4 * 86400 + 3 * 3600)), "+4d 03h");
/// ```
pub fn format_delta(delta: Duration) -> String {
    let seconds = delta.num_seconds();
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs_seconds = seconds.abs();

    let body = if abs_seconds < SECONDS_FORMAT_MAX {
        format!("{}s", abs_seconds)
    } else if abs_seconds < MINUTES_FORMAT_MAX {
        format!("{}m{:02}s", abs_seconds / 60, abs_seconds % 60)
    } else if abs_seconds < HOURS_FORMAT_MAX {
        format!("{}h{:02}m", abs_seconds / 3600, (abs_seconds % 3600) / 60)
    } else {
        format!("{}d {:02}h", abs_seconds / 86400, (abs_seconds % 86400) / 3600)
    };

    format!("{}{}", sign, body)
}

/// Format a UTC offset given in seconds as `±HH:MM`.
///
/// # Examples
///
/// ```
/// use pmx_common::human_time::format_offset;
///
/// assert_eq!(format_offset(7200), "+02:00");
/// assert_eq!(format_offset(-19800), "-05:30");
/// assert_eq!(format_offset(0), "+00:00");
/// ```
pub fn format_offset(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_zero() {
        assert_eq!(format_delta(Duration::zero()), "+0s");
    }

    #[test]
    fn test_delta_boundaries() {
        assert_eq!(format_delta(Duration::seconds(99)), "+99s");
        assert_eq!(format_delta(Duration::seconds(100)), "+1m40s");
        assert_eq!(format_delta(Duration::seconds(6000)), "+1h40m");
        assert_eq!(format_delta(Duration::seconds(90000)), "+1d 01h");
    }

    #[test]
    fn test_delta_negative_hours() {
        assert_eq!(format_delta(Duration::seconds(-3 * 3600)), "-3h00m");
    }

    #[test]
    fn test_offset_half_hour() {
        assert_eq!(format_offset(5 * 3600 + 1800), "+05:30");
        assert_eq!(format_offset(-(9 * 3600 + 1800)), "-09:30");
    }
}
