//! Version selection over the append-only stop event history.
//!
//! Each poll adds a new version of a stop's prediction rather than
//! overwriting the previous one. Consumers pick explicitly: the latest
//! version of each `(trip_uid, stop_id, stop_sequence)`, or all of them.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::StopEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    #[default]
    Latest,
    All,
}

/// Orders two observations by recency: ingestion instant, then feed instant.
pub fn recency(a: &StopEvent, b: &StopEvent) -> Ordering {
    a.as_of
        .cmp(&b.as_of)
        .then_with(|| a.feed_timestamp.cmp(&b.feed_timestamp))
}

/// Applies `policy`. With [`VersionPolicy::Latest`] the most recent version of
/// each physical key survives; on a full tie the later input row wins. Output
/// keeps input order.
pub fn select_versions(events: &[StopEvent], policy: VersionPolicy) -> Vec<StopEvent> {
    match policy {
        VersionPolicy::All => events.to_vec(),
        VersionPolicy::Latest => {
            let mut latest: HashMap<(&str, Option<&str>, i64), usize> = HashMap::new();
            for (idx, event) in events.iter().enumerate() {
                let key = (event.trip_uid.as_str(), event.stop_id.as_deref(), event.stop_sequence);
                latest
                    .entry(key)
                    .and_modify(|current| {
                        if recency(event, &events[*current]) != Ordering::Less {
                            *current = idx;
                        }
                    })
                    .or_insert(idx);
            }
            let mut kept: Vec<usize> = latest.into_values().collect();
            kept.sort_unstable();
            kept.into_iter().map(|idx| events[idx].clone()).collect()
        }
    }
}
