use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Partition;
use super::utility::pct;
use crate::model::{ScheduledDeparture, TimeWindow, TripRollup};

/// Closed interval, in whole minutes of actual minus scheduled, counted as on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct OtpPolicy {
    pub min_minutes: i64,
    pub max_minutes: i64,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            min_minutes: 0,
            max_minutes: 5,
        }
    }
}

impl OtpPolicy {
    /// Minutes are truncated toward zero before the check, so a departure
    /// 30 seconds early counts as 0 minutes.
    pub fn is_on_time(&self, actual: DateTime<Utc>, scheduled: DateTime<Utc>) -> bool {
        let minutes = (actual - scheduled).num_minutes();
        (self.min_minutes..=self.max_minutes).contains(&minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalOtpRow {
    pub route_id: String,
    pub direction_id: String,
    pub scheduled_trips: usize,
    pub matched_trips: usize,
    pub on_time_trips: usize,
    pub on_time_pct: Option<f64>,
}

#[derive(Default)]
struct Tally {
    scheduled: usize,
    matched: usize,
    on_time: usize,
}

/// Terminal on-time performance. The scheduled side is authoritative: every
/// scheduled trip is in the denominator, and one with no observed first
/// event counts as not on time.
pub fn terminal_otp(
    terminals: &[ScheduledDeparture],
    rollups: &[TripRollup],
    window: Option<&TimeWindow>,
    policy: OtpPolicy,
) -> Vec<TerminalOtpRow> {
    let observed: HashMap<&str, DateTime<Utc>> = rollups
        .iter()
        .filter_map(|r| r.first_event.map(|instant| (r.trip_uid.as_str(), instant)))
        .collect();

    // One scheduled departure per identity, the earliest if several map to it.
    let mut scheduled: HashMap<&str, &ScheduledDeparture> = HashMap::new();
    for terminal in terminals
        .iter()
        .filter(|t| window.is_none_or(|w| w.contains(t.scheduled)))
    {
        scheduled
            .entry(terminal.trip_uid.as_str())
            .and_modify(|current| {
                if terminal.scheduled < current.scheduled {
                    *current = terminal;
                }
            })
            .or_insert(terminal);
    }

    let mut tallies: BTreeMap<Partition, Tally> = BTreeMap::new();
    for (uid, terminal) in scheduled {
        let tally = tallies.entry(terminal.partition()).or_default();
        tally.scheduled += 1;
        if let Some(actual) = observed.get(uid) {
            tally.matched += 1;
            if policy.is_on_time(*actual, terminal.scheduled) {
                tally.on_time += 1;
            }
        }
    }

    tallies
        .into_iter()
        .map(|((route_id, direction_id), tally)| TerminalOtpRow {
            route_id,
            direction_id,
            scheduled_trips: tally.scheduled,
            matched_trips: tally.matched,
            on_time_trips: tally.on_time,
            on_time_pct: pct(tally.on_time, tally.scheduled),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::service_delivered::test_support::{rollup, terminal};
    use crate::versions::test_support::at;

    #[test]
    fn test_default_policy_window() {
        let policy = OtpPolicy::default();
        let scheduled = at(8, 0, 0);
        assert!(policy.is_on_time(at(8, 3, 0), scheduled));
        assert!(!policy.is_on_time(at(8, 7, 0), scheduled));
        assert!(!policy.is_on_time(at(7, 58, 0), scheduled));
        assert!(policy.is_on_time(at(8, 5, 59), scheduled));
        assert!(policy.is_on_time(at(7, 59, 30), scheduled));
    }

    #[test]
    fn test_unmatched_scheduled_trips_count_against() {
        let terminals = vec![
            terminal("on_time", at(8, 0, 0)),
            terminal("late", at(8, 10, 0)),
            terminal("early", at(8, 20, 0)),
            terminal("missing", at(8, 30, 0)),
        ];
        let rollups = vec![
            rollup("on_time", Some(at(8, 3, 0))),
            rollup("late", Some(at(8, 17, 0))),
            rollup("early", Some(at(8, 18, 0))),
            rollup("unscheduled", Some(at(8, 40, 0))),
        ];

        let rows = terminal_otp(&terminals, &rollups, None, OtpPolicy::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scheduled_trips, 4);
        assert_eq!(rows[0].matched_trips, 3);
        assert_eq!(rows[0].on_time_trips, 1);
        assert_eq!(rows[0].on_time_pct, Some(25.0));
    }

    #[test]
    fn test_window_restricts_scheduled_side() {
        let terminals = vec![terminal("a", at(8, 0, 0)), terminal("b", at(9, 0, 0))];
        let rollups = vec![rollup("a", Some(at(8, 1, 0))), rollup("b", Some(at(9, 1, 0)))];
        let window = TimeWindow::new(at(7, 0, 0), at(8, 30, 0));

        let rows = terminal_otp(&terminals, &rollups, Some(&window), OtpPolicy::default());
        assert_eq!(rows[0].scheduled_trips, 1);
        assert_eq!(rows[0].on_time_pct, Some(100.0));
    }

    #[test]
    fn test_nothing_scheduled_yields_no_rows() {
        let rollups = vec![rollup("a", Some(at(8, 1, 0)))];
        assert!(terminal_otp(&[], &rollups, None, OtpPolicy::default()).is_empty());
    }
}
