//! Flattens raw trip updates into per-stop [`StopEvent`] rows.
//!
//! Every stop-time update becomes one row carrying the resolved trip
//! identity, stop metadata and UTC plus local instants. A bad field only
//! nulls that field: an unknown stop id leaves the metadata empty, an
//! unparsable epoch leaves the instant empty.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::identity;
use crate::model::{LooseInt, RawTripUpdate, StopEvent, StopTimeEvent};
use crate::schedule::Stop;

/// Converts an epoch-seconds field into an instant; malformed or out of
/// range values become `None`.
pub fn epoch_to_utc(value: Option<&LooseInt>) -> Option<DateTime<Utc>> {
    value
        .and_then(LooseInt::safe_cast)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn event_time(event: Option<&StopTimeEvent>) -> Option<DateTime<Utc>> {
    epoch_to_utc(event.and_then(|e| e.time.as_ref()))
}

/// Updates whose trip descriptor carries no direction. Their events resolve
/// under an empty direction and never match a scheduled trip.
pub fn missing_direction(updates: &[RawTripUpdate]) -> usize {
    updates
        .iter()
        .filter(|u| u.trip_update.trip.direction_id.is_none())
        .count()
}

pub struct Normalizer<'a> {
    stops: &'a HashMap<String, Stop>,
    tz: Tz,
}

impl<'a> Normalizer<'a> {
    pub fn new(stops: &'a HashMap<String, Stop>, tz: Tz) -> Self {
        Self { stops, tz }
    }

    fn local(&self, instant: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
        instant.map(|i| i.with_timezone(&self.tz).naive_local())
    }

    /// Normalizes one raw update. The output depends only on the update, so
    /// reprocessing the same input yields the same rows.
    pub fn normalize_update(&self, update: &RawTripUpdate) -> Vec<StopEvent> {
        let body = &update.trip_update;
        let trip = &body.trip;
        let feed_timestamp = epoch_to_utc(body.timestamp.as_ref());

        let service_date = match trip.start_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => identity::normalize_service_date(raw),
            _ => feed_timestamp
                .unwrap_or(update.as_of)
                .with_timezone(&self.tz)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string(),
        };
        let route_id = trip.route_id.clone().unwrap_or_default();
        let direction_id = trip
            .direction_id
            .as_ref()
            .map(LooseInt::as_text)
            .unwrap_or_default();
        let raw_trip_id = trip.trip_id.clone().unwrap_or_default();
        let identity = identity::resolve(&service_date, &route_id, &direction_id, &raw_trip_id);

        body.stop_time_update
            .iter()
            .enumerate()
            .map(|(position, stu)| {
                let stop = stu.stop_id.as_deref().and_then(|id| self.stops.get(id));
                let arrival = event_time(stu.arrival.as_ref());
                let departure = event_time(stu.departure.as_ref());
                StopEvent {
                    trip_uid: identity.trip_uid.clone(),
                    trip_key: identity.trip_key.clone(),
                    feed: update.feed.clone(),
                    entity_id: update.entity_id.clone(),
                    route_id: route_id.clone(),
                    direction_id: direction_id.clone(),
                    service_date: service_date.clone(),
                    raw_trip_id: raw_trip_id.clone(),
                    schedule_relationship: trip.schedule_relationship.clone(),
                    stop_id: stu.stop_id.clone(),
                    stop_sequence: stu
                        .stop_sequence
                        .as_ref()
                        .and_then(LooseInt::safe_cast)
                        .unwrap_or(position as i64 + 1),
                    stop_name: stop.and_then(|s| s.stop_name.clone()),
                    parent_station: stop.and_then(|s| s.parent_station.clone()),
                    stop_lat: stop.and_then(|s| s.stop_lat),
                    stop_lon: stop.and_then(|s| s.stop_lon),
                    arrival,
                    departure,
                    arrival_local: self.local(arrival),
                    departure_local: self.local(departure),
                    feed_timestamp,
                    as_of: update.as_of,
                }
            })
            .collect()
    }

    /// Normalizes a batch in parallel. Output order follows input order.
    #[tracing::instrument(skip_all, fields(updates = updates.len()))]
    pub fn normalize(&self, updates: &[RawTripUpdate]) -> Vec<StopEvent> {
        let events: Vec<StopEvent> = updates
            .par_iter()
            .flat_map_iter(|update| self.normalize_update(update))
            .collect();

        let unknown_stops = events
            .iter()
            .filter(|e| {
                e.stop_id
                    .as_deref()
                    .is_none_or(|id| !self.stops.contains_key(id))
            })
            .count();
        if unknown_stops > 0 {
            debug!(unknown_stops, "Stop events without stop metadata");
        }
        let updates_without_direction = missing_direction(updates);
        if updates_without_direction > 0 {
            warn!(
                updates_without_direction,
                "Trip updates without direction_id cannot match scheduled trips"
            );
        }
        info!(events = events.len(), "Stop events normalized");
        events
    }
}
