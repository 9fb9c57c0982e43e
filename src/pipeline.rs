//! End-to-end run for one service day: normalize, roll up, resolve the
//! schedule and compute every metric.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MetricsConfig;
use crate::metrics::completeness::{CompletenessRow, trip_completeness};
use crate::metrics::dwell::{DwellRow, dwell_times};
use crate::metrics::excess_delay::{ExcessDelayRow, excess_delay};
use crate::metrics::headway::{HeadwayRow, HeadwaySummaryRow, headway_summary, headways};
use crate::metrics::latency::{FeedLatencyRow, feed_latency};
use crate::metrics::otp::{TerminalOtpRow, terminal_otp};
use crate::metrics::relationship_share::{RelationshipShareRow, relationship_share};
use crate::metrics::run_time::{RunTimeRow, run_times};
use crate::metrics::service_delivered::{ServiceDeliveredRow, service_delivered};
use crate::metrics::trips_observed::{
    FilledTripsObservedRow, TripsObservedRow, trips_observed, trips_observed_filled,
};
use crate::model::{LocalWindow, RawTripUpdate, ScheduledDeparture, StopEvent, TimeWindow, TripRollup};
use crate::normalize::Normalizer;
use crate::output::{write_json, write_records};
use crate::rollup::{by_first_event, rollup};
use crate::schedule::{StaticSchedule, resolve_departures, service_day_midnight, terminal_departures};
use crate::store::{ObservationQuery, ObservationStore, ScheduleSource};
use crate::versions::select_versions;

/// The service day as a UTC interval: local midnight up to the next local
/// midnight plus the configured overnight tail.
pub fn service_day_window(service_date: NaiveDate, config: &MetricsConfig) -> Option<TimeWindow> {
    let next = service_date.checked_add_days(Days::new(1))?;
    let start = service_day_midnight(service_date, config.timezone)?;
    let end = service_day_midnight(next, config.timezone)?
        .checked_add_signed(TimeDelta::try_hours(config.service_day_tail_hours)?)?;
    Some(TimeWindow::new(start, end))
}

/// The same span as wall-clock time in the configured timezone.
pub fn service_day_local_window(service_date: NaiveDate, config: &MetricsConfig) -> Option<LocalWindow> {
    let next = service_date.checked_add_days(Days::new(1))?;
    let tail = TimeDelta::try_hours(config.service_day_tail_hours)?;
    Some(LocalWindow::new(
        service_date.and_time(NaiveTime::MIN),
        next.and_time(NaiveTime::MIN).checked_add_signed(tail)?,
    ))
}

/// The local span Service Delivered counts over: the configured part of the
/// day measured from local midnight, or the whole service day.
pub fn service_delivered_window(service_date: NaiveDate, config: &MetricsConfig) -> Option<LocalWindow> {
    let Some(part) = &config.service_delivered_window else {
        return service_day_local_window(service_date, config);
    };
    let (start, end) = part.offsets()?;
    let midnight = service_date.and_time(NaiveTime::MIN);
    Some(LocalWindow::new(
        midnight.checked_add_signed(start)?,
        midnight.checked_add_signed(end)?,
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub generated_at: DateTime<Utc>,
    pub service_date: NaiveDate,
    pub timezone: String,
    pub window: TimeWindow,
    pub route_names: HashMap<String, String>,
    pub stop_events: usize,
    pub scheduled_departures: usize,
    pub rollups: Vec<TripRollup>,
    pub trips_observed: Vec<TripsObservedRow>,
    pub trips_observed_filled: Vec<FilledTripsObservedRow>,
    pub service_delivered: Vec<ServiceDeliveredRow>,
    pub terminal_otp: Vec<TerminalOtpRow>,
    pub headways: Vec<HeadwayRow>,
    pub headway_summary: Vec<HeadwaySummaryRow>,
    pub dwell: Vec<DwellRow>,
    pub run_times: Vec<RunTimeRow>,
    pub excess_delay: Vec<ExcessDelayRow>,
    pub completeness: Vec<CompletenessRow>,
    pub relationship_share: Vec<RelationshipShareRow>,
    pub feed_latency: Vec<FeedLatencyRow>,
}

pub struct PipelineOutput {
    pub stop_events: Vec<StopEvent>,
    pub scheduled: Vec<ScheduledDeparture>,
    pub report: MetricsReport,
}

/// Runs every stage over already-loaded inputs.
#[tracing::instrument(skip(updates, schedule, config), fields(updates = updates.len()))]
pub fn run(
    updates: &[RawTripUpdate],
    schedule: &StaticSchedule,
    config: &MetricsConfig,
    service_date: NaiveDate,
) -> Result<PipelineOutput> {
    let window = service_day_window(service_date, config)
        .with_context(|| format!("no service day window for {service_date}"))?;
    let delivered_window = service_delivered_window(service_date, config)
        .with_context(|| format!("no service delivered window for {service_date}"))?;
    let date_key = service_date.format("%Y-%m-%d").to_string();
    let tz = config.timezone;

    let stops = schedule.stop_index();
    let stop_events: Vec<StopEvent> = Normalizer::new(&stops, tz)
        .normalize(updates)
        .into_iter()
        .filter(|e| e.service_date == date_key)
        .collect();
    let current = select_versions(&stop_events, config.version_policy);

    let mut rollups = rollup(&stop_events, Some(&window));
    rollups.sort_by(by_first_event);

    let scheduled = resolve_departures(
        schedule,
        service_date,
        tz,
        config.static_trip_id_delimiter.as_deref(),
    );
    let terminals = terminal_departures(&scheduled);

    let (headway_rows, headway_summary_rows) = match config.headway_stop_id.as_deref() {
        Some(stop_id) => (
            headways(&current, stop_id),
            headway_summary(&current, &scheduled, stop_id, config.headway_multiple),
        ),
        None => {
            info!("No headway stop configured, skipping headways");
            (Vec::new(), Vec::new())
        }
    };

    let run_time_rows = match (
        config.run_time_from_stop_id.as_deref(),
        config.run_time_to_stop_id.as_deref(),
    ) {
        (Some(from), Some(to)) => run_times(&current, from, to),
        (None, None) => {
            info!("No run time stops configured, skipping run times");
            Vec::new()
        }
        _ => {
            warn!("Run time needs both a from and a to stop, skipping run times");
            Vec::new()
        }
    };

    let excess_delay_rows = match config.delay_stop_id.as_deref() {
        Some(stop_id) => excess_delay(&current, &scheduled, stop_id)?,
        None => {
            info!("No delay stop configured, skipping excess delay");
            Vec::new()
        }
    };

    let report = MetricsReport {
        generated_at: Utc::now(),
        service_date,
        timezone: tz.name().to_string(),
        window,
        route_names: schedule.route_names(),
        stop_events: stop_events.len(),
        scheduled_departures: scheduled.len(),
        trips_observed: trips_observed(&stop_events, &window, config.bucket_secs),
        trips_observed_filled: trips_observed_filled(&stop_events, &window, config.bucket_secs),
        service_delivered: service_delivered(&rollups, &terminals, &delivered_window, tz),
        terminal_otp: terminal_otp(&terminals, &rollups, None, config.otp),
        headways: headway_rows,
        headway_summary: headway_summary_rows,
        dwell: dwell_times(&current),
        run_times: run_time_rows,
        excess_delay: excess_delay_rows,
        completeness: trip_completeness(&current),
        relationship_share: relationship_share(
            &rollups,
            &config.added_marker,
            &config.canceled_marker,
        ),
        feed_latency: feed_latency(&rollups, config.bucket_secs),
        rollups,
    };

    info!(
        stop_events = report.stop_events,
        trips = report.rollups.len(),
        scheduled = report.scheduled_departures,
        "Metrics computed"
    );

    Ok(PipelineOutput {
        stop_events,
        scheduled,
        report,
    })
}

/// Loads inputs from the collaborators and runs the pipeline.
pub async fn run_from_stores(
    observations: &dyn ObservationStore,
    schedule_source: &dyn ScheduleSource,
    config: &MetricsConfig,
    service_date: NaiveDate,
    route_id: Option<String>,
    direction_id: Option<String>,
) -> Result<PipelineOutput> {
    let window = service_day_window(service_date, config)
        .with_context(|| format!("no service day window for {service_date}"))?;
    let query = ObservationQuery {
        since: Some(window.start),
        until: Some(window.end),
        route_id,
        direction_id,
    };

    let updates = observations.trip_updates(&query).await?;
    let schedule = schedule_source.schedule().await?;
    run(&updates, &schedule, config, service_date)
}

impl PipelineOutput {
    /// Writes every relation as CSV plus the whole report as `report.json`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let report = &self.report;

        write_records(&dir.join("stop_events.csv"), &self.stop_events)?;
        write_records(&dir.join("scheduled_departures.csv"), &self.scheduled)?;
        write_records(&dir.join("trip_rollups.csv"), &report.rollups)?;
        write_records(&dir.join("trips_observed.csv"), &report.trips_observed)?;
        write_records(&dir.join("trips_observed_filled.csv"), &report.trips_observed_filled)?;
        write_records(&dir.join("service_delivered.csv"), &report.service_delivered)?;
        write_records(&dir.join("terminal_otp.csv"), &report.terminal_otp)?;
        write_records(&dir.join("headways.csv"), &report.headways)?;
        write_records(&dir.join("headway_summary.csv"), &report.headway_summary)?;
        write_records(&dir.join("dwell.csv"), &report.dwell)?;
        write_records(&dir.join("run_times.csv"), &report.run_times)?;
        write_records(&dir.join("excess_delay.csv"), &report.excess_delay)?;
        write_records(&dir.join("completeness.csv"), &report.completeness)?;
        write_records(&dir.join("relationship_share.csv"), &report.relationship_share)?;
        write_records(&dir.join("feed_latency.csv"), &report.feed_latency)?;
        write_json(&dir.join("report.json"), report)?;

        info!(dir = %dir.display(), "Metrics written");
        Ok(())
    }
}
