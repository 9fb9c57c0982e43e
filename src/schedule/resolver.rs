use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use super::calendar::ServiceCalendar;
use super::tables::{StaticSchedule, Trip};
use super::time::parse_gtfs_time;
use crate::identity;
use crate::model::ScheduledDeparture;

/// Start of the service day in `tz`, as an instant.
///
/// When local midnight does not exist (a DST gap at midnight), the first
/// instant of the following hour is used.
pub fn service_day_midnight(service_date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight = service_date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + TimeDelta::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Maps a static trip id to the raw id a realtime feed would report: the text
/// after the first `delimiter`, or the id unchanged when no delimiter is set
/// or present.
pub fn realtime_trip_id<'a>(static_trip_id: &'a str, delimiter: Option<&str>) -> &'a str {
    delimiter
        .filter(|d| !d.is_empty())
        .and_then(|d| static_trip_id.split_once(d))
        .map(|(_, rest)| rest)
        .unwrap_or(static_trip_id)
}

/// Resolves every scheduled departure of `service_date`.
///
/// Trips whose service has no active calendar row on that day are excluded
/// silently, as are stop times with no parseable time. The instant is service
/// day midnight plus the literal offset, so `25:10:00` lands on the next
/// calendar day and DST changes during the night do not shift it.
#[tracing::instrument(skip(schedule), fields(trips = schedule.trips.len()))]
pub fn resolve_departures(
    schedule: &StaticSchedule,
    service_date: NaiveDate,
    tz: Tz,
    static_trip_id_delimiter: Option<&str>,
) -> Vec<ScheduledDeparture> {
    let Some(midnight) = service_day_midnight(service_date, tz) else {
        return Vec::new();
    };
    let local_midnight = service_date.and_time(NaiveTime::MIN);
    let date_key = service_date.format("%Y-%m-%d").to_string();

    let active_services: HashSet<String> = schedule
        .calendar
        .iter()
        .filter_map(ServiceCalendar::from_row)
        .filter(|calendar| calendar.is_active(service_date))
        .map(|calendar| calendar.service_id)
        .collect();

    let active_trips: HashMap<&str, &Trip> = schedule
        .trips
        .iter()
        .filter(|trip| active_services.contains(trip.service_id.as_str()))
        .map(|trip| (trip.trip_id.as_str(), trip))
        .collect();

    let stops = schedule.stop_index();
    let mut unparsed = 0usize;

    let mut departures: Vec<ScheduledDeparture> = schedule
        .stop_times
        .iter()
        .filter_map(|stop_time| {
            let trip = active_trips.get(stop_time.trip_id.as_str())?;
            let instants = stop_time
                .departure_time
                .as_deref()
                .or(stop_time.arrival_time.as_deref())
                .and_then(parse_gtfs_time)
                .and_then(|offset| {
                    Some((
                        midnight.checked_add_signed(offset)?,
                        local_midnight.checked_add_signed(offset)?,
                    ))
                });
            let Some((scheduled, scheduled_local)) = instants else {
                unparsed += 1;
                return None;
            };
            let direction_id = trip.direction_id.clone().unwrap_or_default();
            let identity = identity::resolve(
                &date_key,
                &trip.route_id,
                &direction_id,
                realtime_trip_id(&trip.trip_id, static_trip_id_delimiter),
            );
            Some(ScheduledDeparture {
                trip_uid: identity.trip_uid,
                trip_key: identity.trip_key,
                route_id: trip.route_id.clone(),
                direction_id,
                trip_id: trip.trip_id.clone(),
                service_date,
                stop_id: stop_time.stop_id.clone(),
                parent_station: stops
                    .get(&stop_time.stop_id)
                    .and_then(|stop| stop.parent_station.clone()),
                stop_sequence: stop_time.stop_sequence.unwrap_or_default(),
                scheduled,
                scheduled_local,
            })
        })
        .collect();

    departures.sort_by(|a, b| {
        (&a.route_id, &a.direction_id, &a.trip_id, a.stop_sequence)
            .cmp(&(&b.route_id, &b.direction_id, &b.trip_id, b.stop_sequence))
    });

    if unparsed > 0 {
        debug!(unparsed, "Stop times without a parseable time were skipped");
    }
    info!(
        active_services = active_services.len(),
        active_trips = active_trips.len(),
        departures = departures.len(),
        "Scheduled departures resolved"
    );
    departures
}

/// Keeps the first-stop departure (minimum stop sequence) of each trip.
pub fn terminal_departures(departures: &[ScheduledDeparture]) -> Vec<ScheduledDeparture> {
    let mut terminals: HashMap<&str, &ScheduledDeparture> = HashMap::new();
    for departure in departures {
        terminals
            .entry(departure.trip_id.as_str())
            .and_modify(|current| {
                if departure.stop_sequence < current.stop_sequence {
                    *current = departure;
                }
            })
            .or_insert(departure);
    }
    let mut terminals: Vec<ScheduledDeparture> = terminals.into_values().cloned().collect();
    terminals.sort_by(|a, b| a.scheduled.cmp(&b.scheduled).then_with(|| a.trip_id.cmp(&b.trip_id)));
    terminals
}
