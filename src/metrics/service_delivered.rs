use std::collections::{BTreeMap, HashSet};

use chrono_tz::Tz;
use serde::Serialize;

use super::Partition;
use super::utility::ratio;
use crate::model::{LocalWindow, ScheduledDeparture, TripRollup};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDeliveredRow {
    pub route_id: String,
    pub direction_id: String,
    pub scheduled_trips: usize,
    /// Every trip observed departing in the window, added trips included.
    pub observed_trips: usize,
    /// Scheduled trips whose identity was also observed departing in the window.
    pub matched_trips: usize,
    /// `matched_trips / scheduled_trips`; `None` when nothing was scheduled.
    pub delivered_ratio: Option<f64>,
}

#[derive(Default)]
struct Sides<'a> {
    scheduled: HashSet<&'a str>,
    observed: HashSet<&'a str>,
}

/// Scheduled trips also observed leaving their first stop inside `window`
/// over distinct trips scheduled to leave the terminal inside it, per
/// `(route, direction)`. Unscheduled trips are counted but never delivered.
pub fn service_delivered(
    rollups: &[TripRollup],
    terminals: &[ScheduledDeparture],
    window: &LocalWindow,
    tz: Tz,
) -> Vec<ServiceDeliveredRow> {
    let mut partitions: BTreeMap<Partition, Sides> = BTreeMap::new();

    for terminal in terminals.iter().filter(|t| window.contains(t.scheduled_local)) {
        partitions
            .entry(terminal.partition())
            .or_default()
            .scheduled
            .insert(terminal.trip_uid.as_str());
    }

    for rollup in rollups {
        let Some(first_event) = rollup.first_event else {
            continue;
        };
        if window.contains(first_event.with_timezone(&tz).naive_local()) {
            partitions
                .entry(rollup.partition())
                .or_default()
                .observed
                .insert(rollup.trip_uid.as_str());
        }
    }

    partitions
        .into_iter()
        .map(|((route_id, direction_id), sides)| {
            let matched = sides.scheduled.intersection(&sides.observed).count();
            ServiceDeliveredRow {
                route_id,
                direction_id,
                scheduled_trips: sides.scheduled.len(),
                observed_trips: sides.observed.len(),
                matched_trips: matched,
                delivered_ratio: ratio(matched, sides.scheduled.len()),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, NaiveDate, Utc};

    use crate::model::{ScheduledDeparture, TripRollup};

    pub fn terminal(uid: &str, scheduled: DateTime<Utc>) -> ScheduledDeparture {
        ScheduledDeparture {
            trip_uid: uid.into(),
            trip_key: uid.into(),
            route_id: "A".into(),
            direction_id: "0".into(),
            trip_id: uid.into(),
            service_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            stop_id: "A02N".into(),
            parent_station: Some("A02".into()),
            stop_sequence: 1,
            scheduled,
            scheduled_local: scheduled.with_timezone(&chrono_tz::America::New_York).naive_local(),
        }
    }

    pub fn rollup(uid: &str, first_event: Option<DateTime<Utc>>) -> TripRollup {
        TripRollup {
            trip_uid: uid.into(),
            trip_key: uid.into(),
            route_id: "A".into(),
            direction_id: "0".into(),
            service_date: "2025-09-01".into(),
            raw_trip_id: uid.into(),
            first_feed_timestamp: None,
            last_feed_timestamp: None,
            first_as_of: first_event.unwrap_or_default(),
            last_as_of: first_event.unwrap_or_default(),
            first_stop_id: Some("A02N".into()),
            first_stop_sequence: 1,
            last_stop_id: Some("A02N".into()),
            last_stop_sequence: 1,
            first_event,
            last_event: first_event,
            schedule_relationship: Some("SCHEDULED".into()),
            observations: 1,
        }
    }
}
