//! Headways, average wait and wait assessment at a reference stop.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Partition;
use super::utility::{mean, pct, stddev};
use crate::model::{ScheduledDeparture, StopEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadwayRow {
    pub route_id: String,
    pub direction_id: String,
    pub stop_id: String,
    pub trip_uid: String,
    pub instant: DateTime<Utc>,
    pub headway_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadwaySummaryRow {
    pub route_id: String,
    pub direction_id: String,
    pub stop_id: String,
    pub samples: usize,
    pub mean_headway_secs: Option<f64>,
    pub headway_stddev_secs: Option<f64>,
    /// Mean headway over two, assuming riders arrive uniformly.
    pub average_wait_secs: Option<f64>,
    /// Headways that had a scheduled headway to compare against.
    pub assessed: usize,
    pub within_standard: usize,
    pub wait_assessment_pct: Option<f64>,
}

/// Passages at `stop_id` per partition, at most one per trip per second,
/// ordered by instant then trip.
fn passages<'a>(events: &'a [StopEvent], stop_id: &str) -> BTreeMap<Partition, Vec<(DateTime<Utc>, &'a str)>> {
    let mut seen: HashSet<(&str, i64)> = HashSet::new();
    let mut by_partition: BTreeMap<Partition, Vec<(DateTime<Utc>, &str)>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.is_at(stop_id)) {
        let Some(instant) = event.passage_instant() else {
            continue;
        };
        if seen.insert((event.trip_uid.as_str(), instant.timestamp())) {
            by_partition
                .entry(event.partition())
                .or_default()
                .push((instant, event.trip_uid.as_str()));
        }
    }
    for list in by_partition.values_mut() {
        list.sort();
    }
    by_partition
}

/// Gap to the preceding passage in the same partition. The first passage of
/// each partition has no predecessor and produces no row.
pub fn headways(events: &[StopEvent], stop_id: &str) -> Vec<HeadwayRow> {
    passages(events, stop_id)
        .into_iter()
        .flat_map(|((route_id, direction_id), list)| {
            list.windows(2)
                .map(|pair| HeadwayRow {
                    route_id: route_id.clone(),
                    direction_id: direction_id.clone(),
                    stop_id: stop_id.to_string(),
                    trip_uid: pair[1].1.to_string(),
                    instant: pair[1].0,
                    headway_secs: (pair[1].0 - pair[0].0).num_seconds(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Distinct scheduled departure instants at `stop_id` per partition, sorted.
fn scheduled_instants(
    departures: &[ScheduledDeparture],
    stop_id: &str,
) -> BTreeMap<Partition, Vec<DateTime<Utc>>> {
    let mut by_partition: BTreeMap<Partition, BTreeSet<DateTime<Utc>>> = BTreeMap::new();
    for departure in departures.iter().filter(|d| d.is_at(stop_id)) {
        by_partition
            .entry(departure.partition())
            .or_default()
            .insert(departure.scheduled);
    }
    by_partition
        .into_iter()
        .map(|(partition, instants)| (partition, instants.into_iter().collect()))
        .collect()
}

/// Scheduled headway in effect at `instant`: the gap ending at the latest
/// scheduled departure at or before it, or the first gap when the passage
/// precedes every scheduled departure.
pub fn scheduled_headway_at(schedule: &[DateTime<Utc>], instant: DateTime<Utc>) -> Option<i64> {
    if schedule.len() < 2 {
        return None;
    }
    let idx = schedule.partition_point(|s| *s <= instant).max(2) - 1;
    Some((schedule[idx] - schedule[idx - 1]).num_seconds())
}

pub fn headway_summary(
    events: &[StopEvent],
    departures: &[ScheduledDeparture],
    stop_id: &str,
    multiple: f64,
) -> Vec<HeadwaySummaryRow> {
    let schedule = scheduled_instants(departures, stop_id);
    let mut grouped: BTreeMap<Partition, Vec<HeadwayRow>> = BTreeMap::new();
    for row in headways(events, stop_id) {
        grouped
            .entry((row.route_id.clone(), row.direction_id.clone()))
            .or_default()
            .push(row);
    }

    grouped
        .into_iter()
        .map(|(partition, rows)| {
            let values: Vec<f64> = rows.iter().map(|r| r.headway_secs as f64).collect();
            let mean_headway = mean(&values);
            let scheduled = schedule.get(&partition).map(Vec::as_slice).unwrap_or_default();

            let mut assessed = 0;
            let mut within_standard = 0;
            for row in &rows {
                if let Some(expected) = scheduled_headway_at(scheduled, row.instant) {
                    assessed += 1;
                    if row.headway_secs as f64 <= multiple * expected as f64 {
                        within_standard += 1;
                    }
                }
            }

            let (route_id, direction_id) = partition;
            HeadwaySummaryRow {
                route_id,
                direction_id,
                stop_id: stop_id.to_string(),
                samples: rows.len(),
                mean_headway_secs: mean_headway,
                headway_stddev_secs: mean_headway.and_then(|m| stddev(&values, m)),
                average_wait_secs: mean_headway.map(|m| m / 2.0),
                assessed,
                within_standard,
                wait_assessment_pct: pct(within_standard, assessed),
            }
        })
        .collect()
}
