use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::model::StopEvent;
use crate::versions::recency;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTimeRow {
    pub trip_uid: String,
    pub route_id: String,
    pub direction_id: String,
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub departed_from: DateTime<Utc>,
    pub arrived_to: DateTime<Utc>,
    pub run_time_secs: i64,
}

/// `to - from` in seconds, or `None` when `to` precedes `from`: a vehicle
/// cannot reach the later stop before leaving the earlier one.
pub fn run_time(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<i64> {
    (to >= from).then(|| (to - from).num_seconds())
}

fn most_recent<'a>(current: Option<&'a StopEvent>, candidate: &'a StopEvent) -> Option<&'a StopEvent> {
    match current {
        Some(existing) if recency(candidate, existing).is_lt() => Some(existing),
        _ => Some(candidate),
    }
}

/// Run time from stop A to stop B for every trip observed at both. The most
/// recent observation at each stop is used; non-physical pairs are excluded.
pub fn run_times(events: &[StopEvent], from_stop_id: &str, to_stop_id: &str) -> Vec<RunTimeRow> {
    let mut legs: BTreeMap<&str, (Option<&StopEvent>, Option<&StopEvent>)> = BTreeMap::new();
    for event in events {
        if event.is_at(from_stop_id) {
            let leg = legs.entry(event.trip_uid.as_str()).or_default();
            leg.0 = most_recent(leg.0, event);
        } else if event.is_at(to_stop_id) {
            let leg = legs.entry(event.trip_uid.as_str()).or_default();
            leg.1 = most_recent(leg.1, event);
        }
    }

    let mut excluded = 0usize;
    let rows: Vec<RunTimeRow> = legs
        .into_values()
        .filter_map(|leg| {
            let (Some(from), Some(to)) = leg else {
                return None;
            };
            let departed_from = from.passage_instant()?;
            let arrived_to = to.event_instant()?;
            let Some(run_time_secs) = run_time(departed_from, arrived_to) else {
                excluded += 1;
                return None;
            };
            Some(RunTimeRow {
                trip_uid: from.trip_uid.clone(),
                route_id: from.route_id.clone(),
                direction_id: from.direction_id.clone(),
                from_stop_id: from_stop_id.to_string(),
                to_stop_id: to_stop_id.to_string(),
                departed_from,
                arrived_to,
                run_time_secs,
            })
        })
        .collect();

    if excluded > 0 {
        debug!(excluded, from_stop_id, to_stop_id, "Non-physical run time pairs excluded");
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::test_support::{at, event};

    fn leg(uid: &str, stop: &str, seq: i64, when: DateTime<Utc>) -> StopEvent {
        let mut e = event(uid, stop, seq);
        e.arrival = Some(when);
        e.departure = Some(when);
        e
    }

    #[test]
    fn test_run_time_between_stops() {
        let events = vec![leg("t1", "A02N", 1, at(8, 0, 0)), leg("t1", "A15N", 9, at(8, 14, 30))];
        let rows = run_times(&events, "A02N", "A15N");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_time_secs, 870);
    }

    #[test]
    fn test_reversed_pair_is_excluded() {
        assert_eq!(run_time(at(8, 10, 0), at(8, 9, 50)), None);
        let events = vec![leg("t1", "A02N", 1, at(8, 10, 0)), leg("t1", "A15N", 9, at(8, 9, 50))];
        assert!(run_times(&events, "A02N", "A15N").is_empty());
    }

    #[test]
    fn test_trip_seen_at_one_stop_only_is_skipped() {
        let events = vec![leg("t1", "A02N", 1, at(8, 0, 0)), leg("t2", "A15N", 9, at(8, 14, 0))];
        assert!(run_times(&events, "A02N", "A15N").is_empty());
    }

    #[test]
    fn test_most_recent_observation_is_used() {
        let mut stale = leg("t1", "A15N", 9, at(8, 20, 0));
        stale.as_of = at(8, 0, 0);
        let mut fresh = leg("t1", "A15N", 9, at(8, 15, 0));
        fresh.as_of = at(8, 10, 0);
        let events = vec![leg("t1", "A02N", 1, at(8, 0, 0)), fresh, stale];

        let rows = run_times(&events, "A02N", "A15N");
        assert_eq!(rows[0].run_time_secs, 900);
    }
}
