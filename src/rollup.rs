//! Folds stop events into one [`TripRollup`] per resolved trip.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::info;

use crate::model::{StopEvent, TimeWindow, TripRollup};
use crate::versions::recency;

/// Picks the representative of a group: most recent observation first, then
/// the lexicographically smallest stop id and relationship label. Replaces
/// an unordered pick so identical inputs always give identical rollups.
fn representative<'a, I>(candidates: I) -> Option<&'a StopEvent>
where
    I: IntoIterator<Item = &'a StopEvent>,
{
    candidates.into_iter().max_by(|a, b| {
        recency(a, b)
            .then_with(|| b.stop_id.cmp(&a.stop_id))
            .then_with(|| b.schedule_relationship.cmp(&a.schedule_relationship))
    })
}

fn fold_trip(events: &[&StopEvent]) -> Option<TripRollup> {
    let any = *events.first()?;

    let min_seq = events.iter().map(|e| e.stop_sequence).min()?;
    let max_seq = events.iter().map(|e| e.stop_sequence).max()?;
    let first = representative(events.iter().copied().filter(|e| e.stop_sequence == min_seq))?;
    let last = representative(events.iter().copied().filter(|e| e.stop_sequence == max_seq))?;
    let label_source = representative(events.iter().copied())?;

    Some(TripRollup {
        trip_uid: any.trip_uid.clone(),
        trip_key: any.trip_key.clone(),
        route_id: any.route_id.clone(),
        direction_id: any.direction_id.clone(),
        service_date: any.service_date.clone(),
        raw_trip_id: label_source.raw_trip_id.clone(),
        first_feed_timestamp: events.iter().filter_map(|e| e.feed_timestamp).min(),
        last_feed_timestamp: events.iter().filter_map(|e| e.feed_timestamp).max(),
        first_as_of: events.iter().map(|e| e.as_of).min()?,
        last_as_of: events.iter().map(|e| e.as_of).max()?,
        first_stop_id: first.stop_id.clone(),
        first_stop_sequence: min_seq,
        last_stop_id: last.stop_id.clone(),
        last_stop_sequence: max_seq,
        first_event: first.event_instant(),
        last_event: last.event_instant(),
        schedule_relationship: label_source.schedule_relationship.clone(),
        observations: events.len(),
    })
}

/// Builds rollups for every trip observed within `window` (by ingestion
/// instant; `None` takes everything). Output is ordered by `trip_uid`.
#[tracing::instrument(skip_all, fields(events = events.len()))]
pub fn rollup(events: &[StopEvent], window: Option<&TimeWindow>) -> Vec<TripRollup> {
    let mut groups: BTreeMap<&str, Vec<&StopEvent>> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| window.is_none_or(|w| w.contains(e.as_of)))
    {
        groups.entry(event.trip_uid.as_str()).or_default().push(event);
    }

    let rollups: Vec<TripRollup> = groups.values().filter_map(|group| fold_trip(group)).collect();
    info!(trips = rollups.len(), "Trip rollups built");
    rollups
}

/// Orders rollups by first observed event, used when presenting a service day.
pub fn by_first_event(a: &TripRollup, b: &TripRollup) -> Ordering {
    a.first_event
        .cmp(&b.first_event)
        .then_with(|| a.trip_uid.cmp(&b.trip_uid))
}
