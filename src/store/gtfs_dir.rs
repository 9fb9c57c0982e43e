use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::ScheduleSource;
use crate::schedule::StaticSchedule;

/// An unpacked GTFS static bundle on disk.
///
/// `stops.txt`, `trips.txt`, `stop_times.txt` and `calendar.txt` are required;
/// `routes.txt` is optional.
pub struct GtfsDirectory {
    dir: PathBuf,
}

impl GtfsDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading GTFS table '{}'", path.display()))?;
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.deserialize() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    warn!(table = name, error = %e, "Skipping unreadable GTFS row");
                }
            }
        }
        if skipped > 0 {
            warn!(table = name, skipped, "GTFS rows skipped");
        }
        Ok(rows)
    }

    async fn read_optional_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        if tokio::fs::try_exists(self.dir.join(name)).await? {
            self.read_table(name).await
        } else {
            Ok(Vec::new())
        }
    }
}

#[async_trait::async_trait]
impl ScheduleSource for GtfsDirectory {
    #[tracing::instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn schedule(&self) -> Result<StaticSchedule> {
        let schedule = StaticSchedule {
            routes: self.read_optional_table("routes.txt").await?,
            stops: self.read_table("stops.txt").await?,
            trips: self.read_table("trips.txt").await?,
            stop_times: self.read_table("stop_times.txt").await?,
            calendar: self.read_table("calendar.txt").await?,
        };
        info!(
            routes = schedule.routes.len(),
            stops = schedule.stops.len(),
            trips = schedule.trips.len(),
            stop_times = schedule.stop_times.len(),
            calendar = schedule.calendar.len(),
            "Static schedule loaded"
        );
        Ok(schedule)
    }
}
