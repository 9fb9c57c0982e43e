//! GTFS time-of-day parsing.
//!
//! `HH:MM:SS` is an offset from the start of the service day, not a wall-clock
//! time: hours past 23 continue the same service day into the next calendar day.

use chrono::TimeDelta;

/// Parses `H:MM:SS` / `HH:MM:SS` (hours unbounded) into an offset.
/// Returns `None` for anything malformed.
pub fn parse_gtfs_time(text: &str) -> Option<TimeDelta> {
    let mut parts = text.trim().split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    TimeDelta::try_seconds(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regular_time() {
        assert_eq!(parse_gtfs_time("08:05:30"), Some(TimeDelta::seconds(8 * 3600 + 5 * 60 + 30)));
        assert_eq!(parse_gtfs_time("8:05:30"), Some(TimeDelta::seconds(8 * 3600 + 5 * 60 + 30)));
    }

    #[test]
    fn test_parse_overnight_time() {
        assert_eq!(parse_gtfs_time("25:30:00"), Some(TimeDelta::seconds(25 * 3600 + 30 * 60)));
    }

    #[test]
    fn test_parse_malformed_time() {
        assert_eq!(parse_gtfs_time(""), None);
        assert_eq!(parse_gtfs_time("08:60:00"), None);
        assert_eq!(parse_gtfs_time("08:00"), None);
        assert_eq!(parse_gtfs_time("08:00:00:00"), None);
        assert_eq!(parse_gtfs_time("ab:cd:ef"), None);
        assert_eq!(parse_gtfs_time("-1:00:00"), None);
    }

    #[test]
    fn test_parse_out_of_range_hours_is_none() {
        assert_eq!(parse_gtfs_time("9999999999999:00:00"), None);
        assert_eq!(parse_gtfs_time("9223372036854775807:00:00"), None);
    }
}
