use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::Partition;
use super::utility::ratio;
use crate::model::StopEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessRow {
    pub route_id: String,
    pub direction_id: String,
    pub trips: usize,
    pub complete_trips: usize,
    pub completeness: Option<f64>,
}

/// Share of observed trips with an event instant at two or more distinct
/// stop sequence positions, i.e. both a start and an end were seen.
pub fn trip_completeness(events: &[StopEvent]) -> Vec<CompletenessRow> {
    let mut trips: HashMap<&str, (Partition, HashSet<i64>)> = HashMap::new();
    for event in events {
        let entry = trips
            .entry(event.trip_uid.as_str())
            .or_insert_with(|| (event.partition(), HashSet::new()));
        if event.event_instant().is_some() {
            entry.1.insert(event.stop_sequence);
        }
    }

    let mut tallies: BTreeMap<Partition, (usize, usize)> = BTreeMap::new();
    for (partition, positions) in trips.into_values() {
        let tally = tallies.entry(partition).or_default();
        tally.0 += 1;
        if positions.len() >= 2 {
            tally.1 += 1;
        }
    }

    tallies
        .into_iter()
        .map(|((route_id, direction_id), (trips, complete_trips))| CompletenessRow {
            route_id,
            direction_id,
            trips,
            complete_trips,
            completeness: ratio(complete_trips, trips),
        })
        .collect()
}
