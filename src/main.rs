//! CLI entry point for the GTFS-RT service metrics tool.
//!
//! Provides subcommands for resolving trip identities, normalizing stored
//! trip updates, rolling them up per trip, resolving a schedule day and
//! computing the full metrics report.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use gtfs_rt_metrics::{
    config::MetricsConfig,
    identity,
    normalize::Normalizer,
    output::{append_record, print_json, write_records},
    pipeline::run_from_stores,
    publish::publish_dir,
    rollup::rollup,
    schedule::{resolve_departures, terminal_departures},
    store::{GtfsDirectory, JsonLinesStore, ObservationQuery, ObservationStore, ScheduleSource},
    versions::VersionPolicy,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_metrics")]
#[command(about = "Service quality metrics over stored GTFS-RT trip updates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical key and trip_uid of a realtime trip
    Identity {
        /// Service date, YYYYMMDD or YYYY-MM-DD
        service_date: String,
        route_id: String,
        direction_id: String,
        /// Raw realtime trip id, e.g. "036000_A..N55R"
        raw_trip_id: String,
    },
    /// Normalize stored trip updates into stop events
    Normalize {
        /// JSON lines file or directory of stored trip updates
        #[arg(long)]
        observations: PathBuf,

        /// Directory holding the GTFS static tables
        #[arg(long)]
        gtfs: PathBuf,

        /// Metrics config JSON file
        #[arg(short, long)]
        config: Option<String>,

        /// CSV file to write stop events to
        #[arg(short, long, default_value = "stop_events.csv")]
        output: String,

        /// Append to the output file instead of replacing it
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Build one rollup row per observed trip
    Rollup {
        #[arg(long)]
        observations: PathBuf,

        #[arg(long)]
        gtfs: PathBuf,

        #[arg(short, long)]
        config: Option<String>,

        /// CSV file to write trip rollups to
        #[arg(short, long, default_value = "trip_rollups.csv")]
        output: String,
    },
    /// Resolve scheduled stop departures for one service date
    Schedule {
        #[arg(long)]
        gtfs: PathBuf,

        /// Service date, YYYY-MM-DD
        #[arg(long)]
        service_date: NaiveDate,

        #[arg(short, long)]
        config: Option<String>,

        /// CSV file to write scheduled departures to
        #[arg(short, long, default_value = "scheduled_departures.csv")]
        output: String,

        /// Only keep each trip's terminal departure
        #[arg(long, default_value_t = false)]
        terminals: bool,
    },
    /// Compute every metric for one service date
    Metrics {
        #[arg(long)]
        observations: PathBuf,

        #[arg(long)]
        gtfs: PathBuf,

        /// Service date, YYYY-MM-DD
        #[arg(long)]
        service_date: NaiveDate,

        #[arg(short, long)]
        config: Option<String>,

        /// Directory to write result relations to
        #[arg(short = 'd', long, default_value = "metrics")]
        output_dir: PathBuf,

        /// Only read observations for this route
        #[arg(long)]
        route_id: Option<String>,

        /// Only read observations for this direction
        #[arg(long)]
        direction_id: Option<String>,

        /// Override the configured version policy
        #[arg(long, value_enum)]
        version_policy: Option<VersionPolicy>,

        /// Optional: S3 bucket name to upload results to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix for uploaded results; defaults to "service_date=<date>"
        #[arg(long)]
        s3_prefix: Option<String>,

        /// Optional: Gzip compress files before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_metrics.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_metrics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Identity {
            service_date,
            route_id,
            direction_id,
            raw_trip_id,
        } => {
            let service_date = identity::normalize_service_date(&service_date);
            let resolved = identity::resolve(&service_date, &route_id, &direction_id, &raw_trip_id);
            print_json(&resolved)?;
        }
        Commands::Normalize {
            observations,
            gtfs,
            config,
            output,
            append,
        } => {
            let config = load_config(config.as_deref())?;
            let updates = JsonLinesStore::new(observations)
                .trip_updates(&ObservationQuery::default())
                .await?;
            let schedule = GtfsDirectory::new(gtfs).schedule().await?;
            let stops = schedule.stop_index();
            let events = Normalizer::new(&stops, config.timezone).normalize(&updates);

            if append {
                for event in &events {
                    append_record(&output, event)?;
                }
            } else {
                write_records(Path::new(&output), &events)?;
            }
            info!(events = events.len(), output = %output, "Stop events written");
        }
        Commands::Rollup {
            observations,
            gtfs,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let updates = JsonLinesStore::new(observations)
                .trip_updates(&ObservationQuery::default())
                .await?;
            let schedule = GtfsDirectory::new(gtfs).schedule().await?;
            let stops = schedule.stop_index();
            let events = Normalizer::new(&stops, config.timezone).normalize(&updates);

            let rollups = rollup(&events, None);
            write_records(Path::new(&output), &rollups)?;
            info!(trips = rollups.len(), output = %output, "Trip rollups written");
        }
        Commands::Schedule {
            gtfs,
            service_date,
            config,
            output,
            terminals,
        } => {
            let config = load_config(config.as_deref())?;
            let schedule = GtfsDirectory::new(gtfs).schedule().await?;
            let mut departures = resolve_departures(
                &schedule,
                service_date,
                config.timezone,
                config.static_trip_id_delimiter.as_deref(),
            );
            if terminals {
                departures = terminal_departures(&departures);
            }
            write_records(Path::new(&output), &departures)?;
            info!(departures = departures.len(), output = %output, "Scheduled departures written");
        }
        Commands::Metrics {
            observations,
            gtfs,
            service_date,
            config,
            output_dir,
            route_id,
            direction_id,
            version_policy,
            s3_bucket,
            s3_prefix,
            gzip,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(policy) = version_policy {
                config.version_policy = policy;
            }

            let store = JsonLinesStore::new(observations);
            let schedule_source = GtfsDirectory::new(gtfs);
            let output = run_from_stores(
                &store,
                &schedule_source,
                &config,
                service_date,
                route_id,
                direction_id,
            )
            .await?;
            output.write_to(&output_dir)?;

            match s3_bucket {
                Some(bucket) => {
                    let aws = aws_config::load_from_env().await;
                    let client = aws_sdk_s3::Client::new(&aws);
                    let prefix =
                        s3_prefix.unwrap_or_else(|| format!("service_date={service_date}"));
                    info!(bucket = %bucket, prefix = %prefix, gzip, "S3 upload enabled");
                    publish_dir(&client, &bucket, &prefix, &output_dir, gzip).await?;
                }
                None => info!("S3 bucket not specified, skipping upload"),
            }
        }
    }

    Ok(())
}

/// Loads the metrics config from `path`, or the defaults when none is given.
fn load_config(path: Option<&str>) -> Result<MetricsConfig> {
    match path {
        Some(path) => MetricsConfig::load(path),
        None => Ok(MetricsConfig::default()),
    }
}
