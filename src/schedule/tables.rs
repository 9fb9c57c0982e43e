//! Rows of the GTFS static tables, as read from the text files.
//!
//! Blank cells become `None`. Numeric cells that fail to parse are coerced to
//! `None` with [`csv::invalid_option`] rather than failing the file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Route {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Stop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default)]
    pub parent_station: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub stop_lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub direction_id: Option<String>,
    #[serde(default)]
    pub trip_headsign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StopTime {
    pub trip_id: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    pub stop_id: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub stop_sequence: Option<i64>,
}

/// A `calendar.txt` row. Weekday flags and dates stay textual here and are
/// validated by [`super::calendar::ServiceCalendar::from_row`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalendarRow {
    pub service_id: String,
    pub monday: String,
    pub tuesday: String,
    pub wednesday: String,
    pub thursday: String,
    pub friday: String,
    pub saturday: String,
    pub sunday: String,
    pub start_date: String,
    pub end_date: String,
}

/// The static tables consumed by the schedule resolver and the normalizer.
#[derive(Debug, Clone, Default)]
pub struct StaticSchedule {
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendar: Vec<CalendarRow>,
}

impl StaticSchedule {
    /// Stop metadata keyed by stop id.
    pub fn stop_index(&self) -> HashMap<String, Stop> {
        self.stops
            .iter()
            .map(|stop| (stop.stop_id.clone(), stop.clone()))
            .collect()
    }

    pub fn route_names(&self) -> HashMap<String, String> {
        self.routes
            .iter()
            .filter_map(|route| {
                route
                    .route_short_name
                    .clone()
                    .or_else(|| route.route_long_name.clone())
                    .map(|name| (route.route_id.clone(), name))
            })
            .collect()
    }
}
