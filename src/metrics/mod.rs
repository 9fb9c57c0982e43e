//! Service-quality metrics.
//!
//! Each metric is a pure function over stop events, rollups and scheduled
//! departures. Missing instants drop out of a computation instead of failing
//! it, and every ratio over an empty denominator is `None`.

pub mod bucket;
pub mod completeness;
pub mod dwell;
pub mod excess_delay;
pub mod headway;
pub mod latency;
pub mod otp;
pub mod relationship_share;
pub mod run_time;
pub mod service_delivered;
pub mod trips_observed;
pub mod utility;

/// `(route_id, direction_id)`, the partition every metric groups by.
pub type Partition = (String, String);
