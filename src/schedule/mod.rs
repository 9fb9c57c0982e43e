//! Static schedule handling.
//!
//! Loads the GTFS tables the metrics need and turns textual stop times plus
//! weekday calendars into absolute scheduled departures for one service day.

pub mod calendar;
pub mod resolver;
pub mod tables;
pub mod time;

pub use resolver::{resolve_departures, service_day_midnight, terminal_departures};
pub use tables::{Route, StaticSchedule, Stop, StopTime, Trip};
