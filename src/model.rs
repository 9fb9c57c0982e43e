//! Record types flowing through the pipeline.
//!
//! Raw trip updates are deserialized in the shape the ingestion job appends
//! them to the observation store. Everything downstream of the normalizer
//! works on [`StopEvent`], [`TripRollup`] and [`ScheduledDeparture`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A numeric field as stored by the ingestion job: a JSON number, or the
/// decimal text protobuf int64 values are rendered as.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LooseInt {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LooseInt {
    /// Safe cast to an integer. Malformed values yield `None` instead of an error.
    pub fn safe_cast(&self) -> Option<i64> {
        match self {
            LooseInt::Int(v) => Some(*v),
            LooseInt::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            LooseInt::Float(_) => None,
            LooseInt::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Textual form used when the value takes part in an identity key.
    pub fn as_text(&self) -> String {
        match self {
            LooseInt::Int(v) => v.to_string(),
            LooseInt::Float(f) => f.to_string(),
            LooseInt::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<i64> for LooseInt {
    fn from(value: i64) -> Self {
        LooseInt::Int(value)
    }
}

/// One realtime trip update snapshot, as appended to the observation store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTripUpdate {
    #[serde(default)]
    pub feed: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Ingestion instant.
    #[serde(deserialize_with = "lenient_utc")]
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub trip_update: TripUpdateBody,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripUpdateBody {
    #[serde(default)]
    pub trip: TripDescriptor,
    #[serde(default)]
    pub stop_time_update: Vec<StopTimeUpdate>,
    /// Feed timestamp, seconds since epoch.
    #[serde(default)]
    pub timestamp: Option<LooseInt>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripDescriptor {
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub direction_id: Option<LooseInt>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StopTimeUpdate {
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<LooseInt>,
    #[serde(default)]
    pub arrival: Option<StopTimeEvent>,
    #[serde(default)]
    pub departure: Option<StopTimeEvent>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StopTimeEvent {
    #[serde(default)]
    pub time: Option<LooseInt>,
    #[serde(default)]
    pub delay: Option<LooseInt>,
}

/// One observation of one stop on one resolved trip.
///
/// Never mutated. A later poll carrying new values for the same stop produces
/// a new row with a later `as_of`; see [`crate::versions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub trip_uid: String,
    pub trip_key: String,
    pub feed: Option<String>,
    pub entity_id: Option<String>,
    pub route_id: String,
    pub direction_id: String,
    pub service_date: String,
    pub raw_trip_id: String,
    pub schedule_relationship: Option<String>,
    pub stop_id: Option<String>,
    pub stop_sequence: i64,
    pub stop_name: Option<String>,
    pub parent_station: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub arrival: Option<DateTime<Utc>>,
    pub departure: Option<DateTime<Utc>>,
    pub arrival_local: Option<NaiveDateTime>,
    pub departure_local: Option<NaiveDateTime>,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub as_of: DateTime<Utc>,
}

impl StopEvent {
    /// Arrival, falling back to departure.
    pub fn event_instant(&self) -> Option<DateTime<Utc>> {
        self.arrival.or(self.departure)
    }

    /// Departure, falling back to arrival. Used where a vehicle leaving a
    /// stop is what counts.
    pub fn passage_instant(&self) -> Option<DateTime<Utc>> {
        self.departure.or(self.arrival)
    }

    /// True when the event was observed at `stop_id` or at a platform whose
    /// parent station is `stop_id`.
    pub fn is_at(&self, stop_id: &str) -> bool {
        self.stop_id.as_deref() == Some(stop_id) || self.parent_station.as_deref() == Some(stop_id)
    }

    pub fn partition(&self) -> (String, String) {
        (self.route_id.clone(), self.direction_id.clone())
    }
}

/// Trip-level summary of all stop events sharing one `trip_uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRollup {
    pub trip_uid: String,
    pub trip_key: String,
    pub route_id: String,
    pub direction_id: String,
    pub service_date: String,
    pub raw_trip_id: String,
    pub first_feed_timestamp: Option<DateTime<Utc>>,
    pub last_feed_timestamp: Option<DateTime<Utc>>,
    pub first_as_of: DateTime<Utc>,
    pub last_as_of: DateTime<Utc>,
    pub first_stop_id: Option<String>,
    pub first_stop_sequence: i64,
    pub last_stop_id: Option<String>,
    pub last_stop_sequence: i64,
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
    pub schedule_relationship: Option<String>,
    pub observations: usize,
}

impl TripRollup {
    pub fn partition(&self) -> (String, String) {
        (self.route_id.clone(), self.direction_id.clone())
    }
}

/// Absolute scheduled departure of one trip at one stop on one service day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDeparture {
    pub trip_uid: String,
    pub trip_key: String,
    pub route_id: String,
    pub direction_id: String,
    pub trip_id: String,
    pub service_date: NaiveDate,
    pub stop_id: String,
    pub parent_station: Option<String>,
    pub stop_sequence: i64,
    pub scheduled: DateTime<Utc>,
    pub scheduled_local: NaiveDateTime,
}

impl ScheduledDeparture {
    pub fn is_at(&self, stop_id: &str) -> bool {
        self.stop_id == stop_id || self.parent_station.as_deref() == Some(stop_id)
    }

    pub fn partition(&self) -> (String, String) {
        (self.route_id.clone(), self.direction_id.clone())
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Half-open wall-clock interval `[start, end)` in the configured timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LocalWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, local: NaiveDateTime) -> bool {
        self.start <= local && local < self.end
    }
}

/// Parses an instant written either as RFC 3339 or as a naive ISO timestamp,
/// which is taken to be UTC.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_instant(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("unparsable instant '{text}'")))
}
