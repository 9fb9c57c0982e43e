//! Metric parameters.
//!
//! Stored as a JSON object on disk; every field is optional:
//! ```json
//! {
//!   "timezone": "America/New_York",
//!   "bucket_secs": 300,
//!   "headway_stop_id": "A27",
//!   "static_trip_id_delimiter": "_"
//! }
//! ```

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::metrics::otp::OtpPolicy;
use crate::schedule::time::parse_gtfs_time;
use crate::versions::VersionPolicy;

/// Longest overnight tail a service day may carry.
pub const MAX_TAIL_HOURS: i64 = 24;

/// A span of the service day in GTFS `HH:MM:SS` times, so the end may run
/// past midnight (`"25:00:00"`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DayPart {
    pub start: String,
    pub end: String,
}

impl DayPart {
    /// Start and end as offsets from local midnight, when both parse and the
    /// span is not empty.
    pub fn offsets(&self) -> Option<(TimeDelta, TimeDelta)> {
        let start = parse_gtfs_time(&self.start)?;
        let end = parse_gtfs_time(&self.end)?;
        (start < end).then_some((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Timezone of the service day and of every local rendering.
    pub timezone: Tz,
    /// Width of time buckets, anchored at the Unix epoch.
    pub bucket_secs: i64,
    /// Hours past the next midnight still belonging to the service day.
    pub service_day_tail_hours: i64,
    pub otp: OtpPolicy,
    /// A headway within `headway_multiple` times the scheduled one passes.
    pub headway_multiple: f64,
    pub version_policy: VersionPolicy,
    pub added_marker: String,
    pub canceled_marker: String,
    pub headway_stop_id: Option<String>,
    pub run_time_from_stop_id: Option<String>,
    pub run_time_to_stop_id: Option<String>,
    pub delay_stop_id: Option<String>,
    /// Static trip ids keep only the text after this delimiter when matched
    /// against realtime trips.
    pub static_trip_id_delimiter: Option<String>,
    /// Narrows Service Delivered to part of the day. The whole service day
    /// is used when unset.
    pub service_delivered_window: Option<DayPart>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            bucket_secs: 60,
            service_day_tail_hours: 4,
            otp: OtpPolicy::default(),
            headway_multiple: 2.0,
            version_policy: VersionPolicy::Latest,
            added_marker: "ADDED".to_string(),
            canceled_marker: "CANCELED".to_string(),
            headway_stop_id: None,
            run_time_from_stop_id: None,
            run_time_to_stop_id: None,
            delay_stop_id: None,
            static_trip_id_delimiter: None,
            service_delivered_window: None,
        }
    }
}

impl MetricsConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading metrics config '{path}'"))?;
        let config: MetricsConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing metrics config '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_secs <= 0 {
            bail!("bucket_secs must be positive, got {}", self.bucket_secs);
        }
        if !(0..=MAX_TAIL_HOURS).contains(&self.service_day_tail_hours) {
            bail!(
                "service_day_tail_hours must be between 0 and {MAX_TAIL_HOURS}, got {}",
                self.service_day_tail_hours
            );
        }
        if let Some(part) = &self.service_delivered_window {
            if part.offsets().is_none() {
                bail!(
                    "service_delivered_window is not a valid span: {} to {}",
                    part.start,
                    part.end
                );
            }
        }
        if self.otp.min_minutes > self.otp.max_minutes {
            bail!(
                "otp window is empty: [{}, {}]",
                self.otp.min_minutes,
                self.otp.max_minutes
            );
        }
        if !(self.headway_multiple.is_finite() && self.headway_multiple > 0.0) {
            bail!("headway_multiple must be a positive number");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = temp_path("gtfs_rt_metrics_test_config.json");
        fs::write(
            &path,
            r#"{"timezone": "America/Chicago", "bucket_secs": 300, "headway_stop_id": "A27",
                "otp": {"min_minutes": -1, "max_minutes": 4}, "version_policy": "all"}"#,
        )
        .unwrap();

        let config = MetricsConfig::load(&path).unwrap();
        assert_eq!(config.timezone, chrono_tz::America::Chicago);
        assert_eq!(config.bucket_secs, 300);
        assert_eq!(config.headway_stop_id.as_deref(), Some("A27"));
        assert_eq!(config.otp, OtpPolicy { min_minutes: -1, max_minutes: 4 });
        assert_eq!(config.version_policy, VersionPolicy::All);
        assert_eq!(config.headway_multiple, 2.0);
        assert_eq!(config.added_marker, "ADDED");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = MetricsConfig {
            bucket_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MetricsConfig {
            otp: OtpPolicy { min_minutes: 5, max_minutes: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tail_hours_are_bounded() {
        let config = MetricsConfig {
            service_day_tail_hours: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MetricsConfig {
            service_day_tail_hours: MAX_TAIL_HOURS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_delivered_window() {
        let path = temp_path("gtfs_rt_metrics_test_window.json");
        fs::write(
            &path,
            r#"{"service_delivered_window": {"start": "07:00:00", "end": "25:00:00"}}"#,
        )
        .unwrap();
        let config = MetricsConfig::load(&path).unwrap();
        let (start, end) = config.service_delivered_window.unwrap().offsets().unwrap();
        assert_eq!(start, TimeDelta::hours(7));
        assert_eq!(end, TimeDelta::hours(25));
        fs::remove_file(&path).unwrap();

        for (start, end) in [("10:00:00", "07:00:00"), ("07:00", "10:00:00")] {
            let config = MetricsConfig {
                service_delivered_window: Some(DayPart {
                    start: start.into(),
                    end: end.into(),
                }),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{start} to {end}");
        }
    }

    #[test]
    fn test_unknown_timezone_fails_to_load() {
        let path = temp_path("gtfs_rt_metrics_test_bad_tz.json");
        fs::write(&path, r#"{"timezone": "Mars/Olympus_Mons"}"#).unwrap();
        assert!(MetricsConfig::load(&path).is_err());
        fs::remove_file(&path).unwrap();
    }
}
