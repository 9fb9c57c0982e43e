//! Adapters for the collaborators the pipeline reads from.
//!
//! [`ObservationStore`] serves the append-only raw trip update history.
//! [`ScheduleSource`] serves the static schedule tables.
//! [`JsonLinesStore`] and [`GtfsDirectory`] implement them over local files.

mod gtfs_dir;
mod jsonl;

pub use gtfs_dir::GtfsDirectory;
pub use jsonl::JsonLinesStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{LooseInt, RawTripUpdate};
use crate::schedule::StaticSchedule;

/// Filter applied when reading observations: ingestion time range
/// `[since, until)` and optional route / direction.
#[derive(Debug, Clone, Default)]
pub struct ObservationQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub route_id: Option<String>,
    pub direction_id: Option<String>,
}

impl ObservationQuery {
    pub fn matches(&self, update: &RawTripUpdate) -> bool {
        let trip = &update.trip_update.trip;
        self.since.is_none_or(|since| update.as_of >= since)
            && self.until.is_none_or(|until| update.as_of < until)
            && self
                .route_id
                .as_deref()
                .is_none_or(|route| trip.route_id.as_deref() == Some(route))
            && self.direction_id.as_deref().is_none_or(|direction| {
                trip.direction_id.as_ref().map(LooseInt::as_text).as_deref() == Some(direction)
            })
    }
}

/// Read access to the append-only observation history.
#[async_trait::async_trait]
pub trait ObservationStore: Send + Sync {
    async fn trip_updates(&self, query: &ObservationQuery) -> Result<Vec<RawTripUpdate>>;
}

/// Read access to the static schedule.
#[async_trait::async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn schedule(&self) -> Result<StaticSchedule>;
}
