//! CLI entry point for the station resampler.
//!
//! Loads one station dataset per run and offers subcommands to inspect it,
//! export resampled CSVs, summarize channels, build wind roses, and compare
//! two periods side by side.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use station_resampler::analyzers::aggregate::native_interval;
use station_resampler::analyzers::analyzer::DateRange;
use station_resampler::analyzers::types::{Frame, Resolution};
use station_resampler::catalog::display_label;
use station_resampler::output::{log_summaries, log_wind_rose, print_json, write_frame, write_records};
use station_resampler::session::{Session, SessionConfig, station_wind_rose};
use station_resampler::stats::{describe, pct};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "station_resampler")]
#[command(about = "Resample and summarize weather station observations", long_about = None)]
struct Cli {
    /// JSON session config; explicit flags override its fields
    #[arg(long, global = true, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Dataset to load (.csv.gz or .csv); defaults to $STATION_DATASET
    #[arg(long, global = true, value_name = "PATH")]
    source: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Selection options shared by the data subcommands.
#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Target resolution (raw, 15min, hourly, daily, monthly, quarterly)
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// First day to include (YYYY-MM-DD); defaults to the start of the data
    #[arg(long, value_name = "DATE")]
    from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD); defaults to the end of the data
    #[arg(long, value_name = "DATE")]
    to: Option<NaiveDate>,

    /// Channel to report; repeat for several
    #[arg(short, long = "channel", value_name = "NAME")]
    channels: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the station, the time span and every channel with its coverage
    Info,
    /// Export the resampled selection as CSV (gzip when the path ends in .gz)
    Aggregate {
        #[command(flatten)]
        query: QueryArgs,

        /// CSV file to write
        #[arg(short, long, default_value = "resampled.csv")]
        output: PathBuf,
    },
    /// Descriptive statistics of the selected channels
    Stats {
        #[command(flatten)]
        query: QueryArgs,

        /// Optional CSV file to write the table to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Wind direction/speed frequency table of the resampled selection
    WindRose {
        #[command(flatten)]
        query: QueryArgs,

        /// Optional JSON file to write the table to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare statistics and wind roses of two periods
    Compare {
        #[command(flatten)]
        query: QueryArgs,

        /// First day of the comparison period
        #[arg(long, value_name = "DATE")]
        compare_from: NaiveDate,

        /// Last day of the comparison period
        #[arg(long, value_name = "DATE")]
        compare_to: NaiveDate,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing()?;

    let cli = Cli::parse();
    let config = build_config(cli.config.as_deref(), cli.source)?;

    match cli.command {
        Commands::Info => {
            let session = Session::open(config)?;
            report_info(&session);
        }
        Commands::Aggregate { query, output } => {
            let mut session = open_with(config, &query)?;
            let frame = session.selected()?;
            let export = if query.channels.is_empty() {
                Frame::clone(&frame)
            } else {
                frame.select(&query.channels)
            };
            if export.is_empty() {
                warn!("No data in the selected range");
            }
            write_frame(&output, &export, &session.config().timestamp_column)?;
        }
        Commands::Stats { query, output } => {
            let mut session = open_with(config, &query)?;
            let frame = session.selected()?;
            let summaries = describe(&frame, &session.config().selected_channels());
            log_summaries(&period_title(&session, session.config().range), &summaries);
            if let Some(path) = output {
                write_records(&path, &summaries)?;
            }
        }
        Commands::WindRose { query, output } => {
            let mut session = open_with(config, &query)?;
            let rose = session.selected_wind_rose()?;
            log_wind_rose(&period_title(&session, session.config().range), rose.as_ref());
            if let (Some(path), Some(rose)) = (output, rose.as_ref()) {
                write_json(&path, rose)?;
            }
        }
        Commands::Compare {
            query,
            compare_from,
            compare_to,
        } => {
            let mut session = open_with(config, &query)?;
            let second = DateRange::new(compare_from, compare_to)?;
            session.set_comparison(Some(second));
            compare_periods(&mut session)?;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/station_resampler.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("station_resampler.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

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

    Ok(file_guard)
}

/// Config file (or defaults with `$STATION_DATASET`), then `--source`.
fn build_config(path: Option<&Path>, source: Option<PathBuf>) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => SessionConfig::load(path)?,
        None => {
            let mut config = SessionConfig::default();
            if let Ok(dataset) = std::env::var("STATION_DATASET") {
                config.source = PathBuf::from(dataset);
            }
            config
        }
    };
    if let Some(source) = source {
        config.source = source;
    }
    Ok(config)
}

/// Opens the session and applies the query flags on top of its config.
#[tracing::instrument(skip_all, fields(source = %config.source.display()))]
fn open_with(mut config: SessionConfig, query: &QueryArgs) -> Result<Session> {
    if let Some(resolution) = query.resolution {
        config.resolution = resolution;
    }
    if !query.channels.is_empty() {
        config.channels = query.channels.clone();
    }

    let mut session = Session::open(config)?;
    let range = resolve_range(&session, query.from, query.to)?;
    let resolution = session.config().resolution;
    session.select(range, resolution);

    info!(
        range = %range.map_or_else(|| "all".to_string(), |r| r.to_string()),
        resolution = %resolution,
        "Selection"
    );
    Ok(session)
}

/// Missing bounds fall back to the configured range, then to the dataset span.
fn resolve_range(
    session: &Session,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Option<DateRange>> {
    if from.is_none() && to.is_none() {
        return Ok(session.config().range);
    }
    let base = session.config().range.or_else(|| session.span());
    let start = from.or_else(|| base.map(|r| r.start()));
    let end = to.or_else(|| base.map(|r| r.end()));

    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(DateRange::new(start, end)?)),
        _ => Ok(None),
    }
}

fn period_title(session: &Session, range: Option<DateRange>) -> String {
    let range = range
        .or_else(|| session.span())
        .map_or_else(|| "empty dataset".to_string(), |r| r.to_string());
    format!(
        "{} {range} ({})",
        session.config().station.name,
        session.config().resolution.label()
    )
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("cannot write '{}'", path.display()))?;
    info!(path = %path.display(), "Table exported");
    Ok(())
}

#[tracing::instrument(skip_all)]
fn report_info(session: &Session) {
    let config = session.config();
    let frame = session.frame();

    info!(
        station = %config.station.name,
        latitude = config.station.latitude,
        longitude = config.station.longitude,
        "Station"
    );
    info!(
        source = %config.source.display(),
        fingerprint = %format!("{:08x}", session.fingerprint()),
        rows = frame.len(),
        span = %session.span().map_or_else(|| "empty".to_string(), |r| r.to_string()),
        native_interval_secs = native_interval(frame).map(|d| d.num_seconds()),
        "Dataset"
    );

    for name in frame.channels() {
        let count = frame.present_values(name).len();
        info!(
            channel = %name,
            label = %display_label(name),
            coverage = %format!("{:.1}%", pct(count, frame.len())),
            policy = %session.policies().policy(name),
            "Channel"
        );
    }
}

#[tracing::instrument(skip_all)]
fn compare_periods(session: &mut Session) -> Result<()> {
    let first_range = session.config().range;
    let second_range = session.config().comparison;
    let Some((first, second)) = session.comparison()? else {
        warn!("No comparison period configured");
        return Ok(());
    };

    let channels = session.config().selected_channels();
    for (label, range, frame) in [
        ("Period 1", first_range, &first),
        ("Period 2", second_range, &second),
    ] {
        let title = format!("{label}: {}", period_title(session, range));
        log_summaries(&title, &describe(frame, &channels));
        log_wind_rose(&title, station_wind_rose(frame).as_ref());
    }

    print_json(&session.cache_stats())?;
    Ok(())
}
