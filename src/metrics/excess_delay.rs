use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use rayon::prelude::*;
use serde::Serialize;

use super::Partition;
use crate::model::{ScheduledDeparture, StopEvent};
use crate::versions::recency;

const CHUNK: usize = 4096;
const SIGNIFICANT_FIGURES: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcessDelayRow {
    pub route_id: String,
    pub direction_id: String,
    pub stop_id: String,
    pub samples: u64,
    pub p50_delay_secs: Option<i64>,
    pub p90_delay_secs: Option<i64>,
}

/// Delay distribution in whole seconds. Histograms only hold unsigned
/// values, so early departures are recorded by magnitude on their own side.
#[derive(Debug, Clone)]
pub struct DelayHistogram {
    early: Histogram<u64>,
    late: Histogram<u64>,
}

impl DelayHistogram {
    pub fn new() -> Result<Self> {
        Ok(Self {
            early: Histogram::new(SIGNIFICANT_FIGURES)?,
            late: Histogram::new(SIGNIFICANT_FIGURES)?,
        })
    }

    pub fn from_values(values: &[i64]) -> Result<Self> {
        let mut histogram = Self::new()?;
        for &value in values {
            histogram.record(value);
        }
        Ok(histogram)
    }

    pub fn record(&mut self, delay_secs: i64) {
        if delay_secs < 0 {
            self.early.saturating_record(delay_secs.unsigned_abs());
        } else {
            self.late.saturating_record(delay_secs.unsigned_abs());
        }
    }

    pub fn merged(mut self, other: Self) -> Result<Self> {
        self.early.add(&other.early)?;
        self.late.add(&other.late)?;
        Ok(self)
    }

    pub fn count(&self) -> u64 {
        self.early.len() + self.late.len()
    }

    /// Nearest-rank quantile: the smallest recorded delay with at least
    /// `q` of the samples at or below it.
    pub fn quantile(&self, q: f64) -> Option<i64> {
        let total = self.count();
        if total == 0 || q.is_nan() {
            return None;
        }
        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).clamp(1, total);
        let early = self.early.len();
        if rank <= early {
            // Ascending delay is descending magnitude on the early side.
            let magnitude = self.early.value_at_quantile(rank_quantile(early - rank + 1, early));
            Some(-i64::try_from(magnitude).unwrap_or(i64::MAX))
        } else {
            let late = self.late.len();
            let value = self.late.value_at_quantile(rank_quantile(rank - early, late));
            Some(i64::try_from(value).unwrap_or(i64::MAX))
        }
    }
}

/// The quantile that lands on the `rank`-th of `len` recorded values.
fn rank_quantile(rank: u64, len: u64) -> f64 {
    (rank as f64 - 0.5) / len as f64
}
/// Actual minus scheduled seconds per partition, for trips with both an
/// observation and a scheduled departure at the reference stop.
pub fn delay_samples(
    events: &[StopEvent],
    departures: &[ScheduledDeparture],
    stop_id: &str,
) -> BTreeMap<Partition, Vec<i64>> {
    let scheduled: HashMap<(&str, &str), DateTime<Utc>> = departures
        .iter()
        .filter(|d| d.is_at(stop_id))
        .map(|d| ((d.trip_uid.as_str(), d.stop_id.as_str()), d.scheduled))
        .collect();

    let mut latest: HashMap<(&str, &str), &StopEvent> = HashMap::new();
    for event in events.iter().filter(|e| e.is_at(stop_id)) {
        let Some(stop) = event.stop_id.as_deref() else {
            continue;
        };
        latest
            .entry((event.trip_uid.as_str(), stop))
            .and_modify(|current| {
                if recency(event, current).is_ge() {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    let mut samples: BTreeMap<Partition, Vec<i64>> = BTreeMap::new();
    for (key, event) in latest {
        let (Some(planned), Some(actual)) = (scheduled.get(&key), event.passage_instant()) else {
            continue;
        };
        samples
            .entry(event.partition())
            .or_default()
            .push((actual - *planned).num_seconds());
    }
    samples
}

/// Builds the delay histogram from per-chunk histograms recorded in
/// parallel and merged.
pub fn summarize(values: &[i64]) -> Result<DelayHistogram> {
    values
        .par_chunks(CHUNK)
        .map(DelayHistogram::from_values)
        .reduce(DelayHistogram::new, |a, b| a?.merged(b?))
}

/// Median and 90th percentile delay at `stop_id` per `(route, direction)`.
pub fn excess_delay(
    events: &[StopEvent],
    departures: &[ScheduledDeparture],
    stop_id: &str,
) -> Result<Vec<ExcessDelayRow>> {
    delay_samples(events, departures, stop_id)
        .into_iter()
        .map(|((route_id, direction_id), values)| {
            let histogram = summarize(&values)?;
            Ok(ExcessDelayRow {
                route_id,
                direction_id,
                stop_id: stop_id.to_string(),
                samples: histogram.count(),
                p50_delay_secs: histogram.quantile(0.5),
                p90_delay_secs: histogram.quantile(0.9),
            })
        })
        .collect()
}
