use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use gtfs_rt_metrics::config::MetricsConfig;
use gtfs_rt_metrics::identity;
use gtfs_rt_metrics::normalize::Normalizer;
use gtfs_rt_metrics::pipeline::{PipelineOutput, run_from_stores};
use gtfs_rt_metrics::schedule::{resolve_departures, terminal_departures};
use gtfs_rt_metrics::store::{
    GtfsDirectory, JsonLinesStore, ObservationQuery, ObservationStore, ScheduleSource,
};
use gtfs_rt_metrics::versions::VersionPolicy;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
}

fn config() -> MetricsConfig {
    MetricsConfig::load(fixture("metrics_config.json").to_str().unwrap()).unwrap()
}

async fn run_fixture_day(config: &MetricsConfig) -> PipelineOutput {
    let store = JsonLinesStore::new(fixture("observations.jsonl"));
    let schedule = GtfsDirectory::new(fixture("gtfs"));
    run_from_stores(&store, &schedule, config, service_date(), None, None)
        .await
        .expect("pipeline run failed")
}

#[tokio::test]
async fn test_store_skips_malformed_and_blank_lines() {
    let store = JsonLinesStore::new(fixture("observations.jsonl"));
    let updates = store
        .trip_updates(&ObservationQuery::default())
        .await
        .unwrap();
    assert_eq!(updates.len(), 7);
}

#[tokio::test]
async fn test_full_pipeline() {
    let output = run_fixture_day(&config()).await;
    let report = &output.report;

    // The previous service day's trip is read but filtered out.
    assert_eq!(report.stop_events, 11);
    assert_eq!(report.rollups.len(), 4);
    assert_eq!(report.route_names.get("A").map(String::as_str), Some("A"));

    // Sunday service is not active on a Monday.
    assert_eq!(report.scheduled_departures, 12);

    let delivered = &report.service_delivered[0];
    assert_eq!(delivered.scheduled_trips, 4);
    assert_eq!(delivered.observed_trips, 4);
    assert_eq!(delivered.matched_trips, 3);
    assert_eq!(delivered.delivered_ratio, Some(0.75));

    let otp = &report.terminal_otp[0];
    assert_eq!(otp.scheduled_trips, 4);
    assert_eq!(otp.matched_trips, 3);
    assert_eq!(otp.on_time_trips, 2);
    assert_eq!(otp.on_time_pct, Some(50.0));

    let gaps: Vec<i64> = report.headways.iter().map(|h| h.headway_secs).collect();
    assert_eq!(gaps, vec![450, 1070, 240]);
    let summary = &report.headway_summary[0];
    assert_eq!(summary.assessed, 3);
    assert_eq!(summary.within_standard, 2);

    let mut run_times: Vec<i64> = report.run_times.iter().map(|r| r.run_time_secs).collect();
    run_times.sort();
    assert_eq!(run_times, vec![710, 770]);

    let delay = &report.excess_delay[0];
    assert_eq!(delay.samples, 2);
    assert_eq!(delay.p50_delay_secs, Some(90));
    assert_eq!(delay.p90_delay_secs, Some(120));

    let completeness = &report.completeness[0];
    assert_eq!(completeness.trips, 4);
    assert_eq!(completeness.complete_trips, 2);
    assert_eq!(completeness.completeness, Some(0.5));

    let share = &report.relationship_share[0];
    assert_eq!(share.added, 1);
    assert_eq!(share.added_pct, Some(25.0));
    assert_eq!(share.canceled, 0);

    let defined_dwells = report.dwell.iter().filter(|d| d.dwell_secs == Some(30)).count();
    assert_eq!(defined_dwells, 3);

    // 28 hours of 5 minute buckets for the one partition.
    assert_eq!(report.trips_observed_filled.len(), 336);
    assert!(report.trips_observed.iter().all(|r| r.trips >= 1));
    assert!(!report.feed_latency.is_empty());
}

#[tokio::test]
async fn test_suffix_drift_keeps_one_trip() {
    let output = run_fixture_day(&config()).await;
    let uid = identity::resolve("2025-09-01", "A", "0", "036600_A..N55R").trip_uid;

    let rollup = output
        .report
        .rollups
        .iter()
        .find(|r| r.trip_uid == uid)
        .expect("trip rollup missing");
    assert_eq!(rollup.observations, 3);
    assert_eq!(rollup.first_stop_sequence, 1);
    assert_eq!(rollup.last_stop_sequence, 3);
    assert_eq!(rollup.raw_trip_id, "036600_A..N58R");
    assert_eq!(
        rollup.last_event,
        Some(Utc.with_ymd_and_hms(2025, 9, 1, 10, 20, 0).unwrap())
    );
}

#[tokio::test]
async fn test_all_versions_policy_keeps_superseded_rows() {
    let mut config = config();
    config.version_policy = VersionPolicy::All;
    let output = run_fixture_day(&config).await;

    assert_eq!(output.report.dwell.len(), 11);
    // Run time still reads the most recent observation at each stop.
    let mut run_times: Vec<i64> = output.report.run_times.iter().map(|r| r.run_time_secs).collect();
    run_times.sort();
    assert_eq!(run_times, vec![710, 770]);
}

#[tokio::test]
async fn test_schedule_identities_match_realtime() {
    let schedule = GtfsDirectory::new(fixture("gtfs")).schedule().await.unwrap();
    let departures = resolve_departures(
        &schedule,
        service_date(),
        chrono_tz::America::New_York,
        Some("_"),
    );
    let terminals = terminal_departures(&departures);
    assert_eq!(terminals.len(), 4);
    assert_eq!(
        terminals[0].scheduled,
        Utc.with_ymd_and_hms(2025, 9, 1, 10, 0, 0).unwrap()
    );

    let realtime_uid = identity::resolve("2025-09-01", "A", "0", "036000_A..N55R").trip_uid;
    assert_eq!(terminals[0].trip_uid, realtime_uid);
}

#[tokio::test]
async fn test_normalize_is_idempotent() {
    let updates = JsonLinesStore::new(fixture("observations.jsonl"))
        .trip_updates(&ObservationQuery::default())
        .await
        .unwrap();
    let schedule = GtfsDirectory::new(fixture("gtfs")).schedule().await.unwrap();
    let stops = schedule.stop_index();
    let normalizer = Normalizer::new(&stops, chrono_tz::America::New_York);

    let first = normalizer.normalize(&updates);
    let second = normalizer.normalize(&updates);
    assert_eq!(first, second);

    let unknown = first
        .iter()
        .find(|e| e.stop_id.as_deref() == Some("Z99N"))
        .expect("event for unknown stop kept");
    assert_eq!(unknown.stop_name, None);
    assert_eq!(unknown.parent_station, None);
}

#[tokio::test]
async fn test_write_to_creates_every_relation() {
    let output = run_fixture_day(&config()).await;
    let dir = env::temp_dir().join("gtfs_rt_metrics_test_report");
    let _ = fs::remove_dir_all(&dir);

    output.write_to(&dir).unwrap();

    let files: HashSet<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    for name in [
        "stop_events.csv",
        "trip_rollups.csv",
        "service_delivered.csv",
        "terminal_otp.csv",
        "headways.csv",
        "excess_delay.csv",
        "feed_latency.csv",
        "report.json",
    ] {
        assert!(files.contains(name), "{name} missing");
    }

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["service_date"], "2025-09-01");
    assert_eq!(report["timezone"], "America/New_York");
    assert_eq!(report["rollups"].as_array().unwrap().len(), 4);

    fs::remove_dir_all(&dir).unwrap();
}
