//! Session clock helpers.

/// Current wall-clock time as epoch milliseconds, the unit gossip
/// timestamps are exchanged in.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a millisecond duration as `HH:MM:SS`, rounding partial seconds
/// up so the clock never appears to stall at zero.
#[must_use]
pub fn format_elapsed(ms: i64) -> String {
    let total_seconds = (ms.max(0) + 999) / 1000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(1), "00:00:01");
        assert_eq!(format_elapsed(999), "00:00:01");
        assert_eq!(format_elapsed(59_000), "00:00:59");
        assert_eq!(format_elapsed(60_000), "00:01:00");
        assert_eq!(format_elapsed(3_600_000), "01:00:00");
        assert_eq!(format_elapsed(3_661_001), "01:01:02");
    }

    #[test]
    fn test_negative_clamped_to_zero() {
        assert_eq!(format_elapsed(-500), "00:00:00");
    }
}
