//! Fixed-interval time buckets and carry-forward gap filling.
//!
//! Buckets are anchored at the Unix epoch, not at the query window, so two
//! overlapping windows always agree on bucket boundaries.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::model::TimeWindow;

/// Start of the bucket holding `instant`.
pub fn bucket_start(instant: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
    let interval = interval_secs.max(1);
    let start = instant.timestamp().div_euclid(interval) * interval;
    DateTime::from_timestamp(start, 0).unwrap_or(instant)
}

/// Every bucket start that overlaps `window`, in order.
pub fn bucket_spine(window: &TimeWindow, interval_secs: i64) -> Vec<DateTime<Utc>> {
    let step = TimeDelta::seconds(interval_secs.max(1));
    let mut spine = Vec::new();
    let mut current = bucket_start(window.start, interval_secs);
    while current < window.end {
        spine.push(current);
        current += step;
    }
    spine
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilledPoint<T> {
    pub bucket_start: DateTime<Utc>,
    pub value: Option<T>,
    /// True when `value` was carried from an earlier bucket.
    pub carried: bool,
}

/// Walks `spine` carrying the last observed value into empty buckets.
///
/// The carried state starts from the latest observation before the spine, so
/// a window opening in a quiet period still shows the last known value.
/// Buckets before any observation stay `None`.
pub fn forward_fill<T: Clone>(
    spine: &[DateTime<Utc>],
    observed: &BTreeMap<DateTime<Utc>, T>,
) -> Vec<FilledPoint<T>> {
    let mut last: Option<T> = spine
        .first()
        .and_then(|first| observed.range(..*first).next_back())
        .map(|(_, value)| value.clone());

    spine
        .iter()
        .map(|bucket| match observed.get(bucket) {
            Some(value) => {
                last = Some(value.clone());
                FilledPoint {
                    bucket_start: *bucket,
                    value: Some(value.clone()),
                    carried: false,
                }
            }
            None => FilledPoint {
                bucket_start: *bucket,
                value: last.clone(),
                carried: last.is_some(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_bucket_start_is_epoch_aligned() {
        assert_eq!(bucket_start(at(8, 3, 59), 300), at(8, 0, 0));
        assert_eq!(bucket_start(at(8, 5, 0), 300), at(8, 5, 0));
        assert_eq!(bucket_start(at(8, 0, 59), 60), at(8, 0, 0));
    }

    #[test]
    fn test_shifted_window_keeps_boundaries() {
        let spine = bucket_spine(&TimeWindow::new(at(8, 2, 0), at(8, 16, 0)), 300);
        assert_eq!(spine, vec![at(8, 0, 0), at(8, 5, 0), at(8, 10, 0), at(8, 15, 0)]);
    }

    #[test]
    fn test_forward_fill_carries_last_value() {
        let spine = vec![at(8, 0, 0), at(8, 1, 0), at(8, 2, 0)];
        let observed = BTreeMap::from([(at(8, 0, 0), 5usize), (at(8, 2, 0), 8usize)]);

        let filled = forward_fill(&spine, &observed);
        let values: Vec<_> = filled.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(5), Some(5), Some(8)]);
        assert!(filled[1].carried);
        assert!(!filled[2].carried);
    }

    #[test]
    fn test_forward_fill_leading_gap_is_none() {
        let spine = vec![at(8, 0, 0), at(8, 1, 0)];
        let observed = BTreeMap::from([(at(8, 1, 0), 3usize)]);
        let values: Vec<_> = forward_fill(&spine, &observed).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![None, Some(3)]);
    }

    #[test]
    fn test_forward_fill_seeds_from_before_window() {
        let spine = vec![at(8, 5, 0), at(8, 6, 0)];
        let observed = BTreeMap::from([(at(8, 0, 0), 4usize)]);
        let values: Vec<_> = forward_fill(&spine, &observed).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(4), Some(4)]);
    }
}
