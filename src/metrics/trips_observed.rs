use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Partition;
use super::bucket::{bucket_spine, bucket_start, forward_fill};
use crate::model::{StopEvent, TimeWindow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripsObservedRow {
    pub route_id: String,
    pub direction_id: String,
    pub bucket_start: DateTime<Utc>,
    pub trips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilledTripsObservedRow {
    pub route_id: String,
    pub direction_id: String,
    pub bucket_start: DateTime<Utc>,
    pub trips: Option<usize>,
    pub carried: bool,
}

/// An event is observed at its feed instant, or its ingestion instant when
/// the feed did not stamp it.
fn observed_at(event: &StopEvent) -> DateTime<Utc> {
    event.feed_timestamp.unwrap_or(event.as_of)
}

fn counts(
    events: &[StopEvent],
    window: &TimeWindow,
    interval_secs: i64,
) -> BTreeMap<Partition, BTreeMap<DateTime<Utc>, usize>> {
    let mut trips: BTreeMap<(Partition, DateTime<Utc>), HashSet<&str>> = BTreeMap::new();
    for event in events {
        let instant = observed_at(event);
        if !window.contains(instant) {
            continue;
        }
        trips
            .entry((event.partition(), bucket_start(instant, interval_secs)))
            .or_default()
            .insert(event.trip_uid.as_str());
    }

    let mut by_partition: BTreeMap<Partition, BTreeMap<DateTime<Utc>, usize>> = BTreeMap::new();
    for ((partition, bucket), uids) in trips {
        by_partition.entry(partition).or_default().insert(bucket, uids.len());
    }
    by_partition
}

/// Distinct trips per `(route, direction, bucket)`; only buckets with
/// observations appear.
pub fn trips_observed(
    events: &[StopEvent],
    window: &TimeWindow,
    interval_secs: i64,
) -> Vec<TripsObservedRow> {
    counts(events, window, interval_secs)
        .into_iter()
        .flat_map(|((route_id, direction_id), buckets)| {
            buckets.into_iter().map(move |(bucket_start, trips)| TripsObservedRow {
                route_id: route_id.clone(),
                direction_id: direction_id.clone(),
                bucket_start,
                trips,
            })
        })
        .collect()
}

/// Same counts laid on a uniform bucket spine over `window`, each partition
/// carrying its last known count into buckets without observations.
pub fn trips_observed_filled(
    events: &[StopEvent],
    window: &TimeWindow,
    interval_secs: i64,
) -> Vec<FilledTripsObservedRow> {
    let spine = bucket_spine(window, interval_secs);
    counts(events, window, interval_secs)
        .into_iter()
        .flat_map(|((route_id, direction_id), buckets)| {
            forward_fill(&spine, &buckets)
                .into_iter()
                .map(|point| FilledTripsObservedRow {
                    route_id: route_id.clone(),
                    direction_id: direction_id.clone(),
                    bucket_start: point.bucket_start,
                    trips: point.value,
                    carried: point.carried,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
