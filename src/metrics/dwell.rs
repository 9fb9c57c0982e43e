use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::StopEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellRow {
    pub trip_uid: String,
    pub route_id: String,
    pub direction_id: String,
    pub stop_id: Option<String>,
    pub stop_sequence: i64,
    pub arrival: Option<DateTime<Utc>>,
    pub departure: Option<DateTime<Utc>>,
    pub dwell_secs: Option<i64>,
    /// Departure before arrival. Kept as reported for review.
    pub negative: bool,
}

/// Departure minus arrival, defined only when both are present. Negative
/// results from feed noise pass through unchanged.
pub fn dwell_time(arrival: Option<DateTime<Utc>>, departure: Option<DateTime<Utc>>) -> Option<i64> {
    Some((departure? - arrival?).num_seconds())
}

pub fn dwell_times(events: &[StopEvent]) -> Vec<DwellRow> {
    events
        .iter()
        .map(|event| {
            let dwell_secs = dwell_time(event.arrival, event.departure);
            DwellRow {
                trip_uid: event.trip_uid.clone(),
                route_id: event.route_id.clone(),
                direction_id: event.direction_id.clone(),
                stop_id: event.stop_id.clone(),
                stop_sequence: event.stop_sequence,
                arrival: event.arrival,
                departure: event.departure,
                dwell_secs,
                negative: dwell_secs.is_some_and(|d| d < 0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::test_support::{at, event};

    #[test]
    fn test_dwell_requires_both_instants() {
        assert_eq!(dwell_time(Some(at(8, 0, 5)), Some(at(8, 0, 40))), Some(35));
        assert_eq!(dwell_time(None, Some(at(8, 0, 40))), None);
        assert_eq!(dwell_time(Some(at(8, 0, 5)), None), None);
    }

    #[test]
    fn test_negative_dwell_is_flagged_not_dropped() {
        let mut noisy = event("t1", "A02N", 1);
        noisy.arrival = Some(at(8, 1, 0));
        noisy.departure = Some(at(8, 0, 50));
        let rows = dwell_times(&[noisy, event("t1", "A03N", 2)]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dwell_secs, Some(-10));
        assert!(rows[0].negative);
        assert_eq!(rows[1].dwell_secs, None);
        assert!(!rows[1].negative);
    }
}
