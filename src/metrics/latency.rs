use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Partition;
use super::bucket::bucket_start;
use super::utility::mean;
use crate::model::TripRollup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedLatencyRow {
    pub route_id: String,
    pub direction_id: String,
    pub bucket_start: DateTime<Utc>,
    pub trips: usize,
    pub mean_latency_secs: Option<f64>,
}

/// Mean of first ingestion minus first feed instant per `(route, direction,
/// bucket)`, bucketed by the first feed instant. Trips the feed never
/// stamped carry no latency and are left out.
pub fn feed_latency(rollups: &[TripRollup], interval_secs: i64) -> Vec<FeedLatencyRow> {
    let mut samples: BTreeMap<(Partition, DateTime<Utc>), Vec<f64>> = BTreeMap::new();
    for rollup in rollups {
        let Some(first_feed) = rollup.first_feed_timestamp else {
            continue;
        };
        let latency = (rollup.first_as_of - first_feed).num_milliseconds() as f64 / 1000.0;
        samples
            .entry((rollup.partition(), bucket_start(first_feed, interval_secs)))
            .or_default()
            .push(latency);
    }

    samples
        .into_iter()
        .map(|(((route_id, direction_id), bucket_start), values)| FeedLatencyRow {
            route_id,
            direction_id,
            bucket_start,
            trips: values.len(),
            mean_latency_secs: mean(&values),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::service_delivered::test_support::rollup;
    use crate::versions::test_support::at;

    #[test]
    fn test_mean_latency_per_bucket() {
        let mut a = rollup("a", None);
        a.first_feed_timestamp = Some(at(8, 0, 0));
        a.first_as_of = at(8, 0, 10);
        let mut b = rollup("b", None);
        b.first_feed_timestamp = Some(at(8, 0, 30));
        b.first_as_of = at(8, 0, 50);
        let mut c = rollup("c", None);
        c.first_feed_timestamp = Some(at(8, 1, 0));
        c.first_as_of = at(8, 1, 4);
        let unstamped = rollup("d", None);

        let rows = feed_latency(&[a, b, c, unstamped], 60);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trips, 2);
        assert_eq!(rows[0].mean_latency_secs, Some(15.0));
        assert_eq!(rows[1].bucket_start, at(8, 1, 0));
        assert_eq!(rows[1].mean_latency_secs, Some(4.0));
    }
}
