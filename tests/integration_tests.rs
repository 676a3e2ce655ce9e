use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use flate2::Compression;
use flate2::write::GzEncoder;
use station_resampler::analyzers::aggregate::aggregate;
use station_resampler::analyzers::analyzer::DateRange;
use station_resampler::analyzers::types::{AggregateError, Resolution};
use station_resampler::analyzers::wind::{WindRoseConfig, wind_rose};
use station_resampler::catalog::{self, WIND_DIRECTION, WIND_SPEED_KMH, WIND_SPEED_MS};
use station_resampler::output::write_frame;
use station_resampler::parser::load_dataset;
use station_resampler::session::{Session, SessionConfig};
use station_resampler::stats::describe;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Three days of 15-minute records. Rain falls only on the first day
/// (0.5 mm at 01:00 and 1.0 mm at 01:15); wind on day two alternates
/// between north and south at equal speed.
fn fixture_csv() -> String {
    let mut csv = String::from("TIMESTAMP,AirTC_Avg,WS_ms_Avg,WindDir_Avg,Rain_mm_Tot\n");
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    for i in 0..(3 * 96) {
        let ts: NaiveDateTime = start + TimeDelta::minutes(15 * i);
        let day = i / 96;
        let temp = 10.0 + day as f64;
        let rain = match i {
            4 => 0.5,
            5 => 1.0,
            _ => 0.0,
        };
        let (speed, dir) = match day {
            0 => (2.0, 90.0),
            1 if i % 2 == 0 => (4.0, 0.0),
            1 => (4.0, 180.0),
            _ => (3.0, 270.0),
        };
        csv.push_str(&format!(
            "{},{temp},{speed},{dir},{rain}\n",
            ts.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    csv
}

fn write_gz_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("station.csv.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(fixture_csv().as_bytes()).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();
    path
}

fn open_session(dir: &Path) -> Session {
    let config = SessionConfig {
        source: write_gz_fixture(dir),
        ..SessionConfig::default()
    };
    Session::open(config).expect("Failed to open session")
}

#[test]
fn test_full_pipeline_daily() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    assert_eq!(session.frame().len(), 288);

    let daily = session.query(None, Resolution::Daily).unwrap();
    assert_eq!(daily.len(), 3);
    assert_eq!(daily.value(0, "AirTC_Avg"), Some(10.0));
    assert_eq!(daily.value(2, "AirTC_Avg"), Some(12.0));

    // Precipitation is summed, not averaged.
    assert_eq!(daily.value(0, "Rain_mm_Tot"), Some(1.5));
    assert_eq!(daily.value(1, "Rain_mm_Tot"), Some(0.0));
}

#[test]
fn test_opposite_winds_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let daily = session.query(None, Resolution::Daily).unwrap();

    assert_eq!(daily.value(1, WIND_SPEED_MS), Some(0.0));
    assert_eq!(daily.value(1, WIND_SPEED_KMH), Some(0.0));
    assert_eq!(daily.value(1, WIND_DIRECTION), None);

    // Steady wind keeps its direction and speed, in both units.
    let steady_dir = daily.value(2, WIND_DIRECTION).unwrap();
    assert!((steady_dir - 270.0).abs() < 1e-9);
    assert!((daily.value(2, WIND_SPEED_MS).unwrap() - 3.0).abs() < 1e-9);
    assert!((daily.value(2, WIND_SPEED_KMH).unwrap() - 10.8).abs() < 1e-9);
}

#[test]
fn test_date_range_query() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
    )
    .unwrap();

    let hourly = session.query(Some(range), Resolution::Hourly).unwrap();
    assert_eq!(hourly.len(), 24);
    assert_eq!(hourly.first_timestamp().unwrap().date(), range.start());

    let outside = DateRange::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
    )
    .unwrap();
    assert!(session.query(Some(outside), Resolution::Daily).unwrap().is_empty());
}

#[test]
fn test_unsupported_resolution_is_rejected() {
    let err = "weekly".parse::<Resolution>().unwrap_err();
    assert_eq!(err, AggregateError::UnsupportedResolution("weekly".to_string()));
}

#[test]
fn test_daily_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let daily = session.query(None, Resolution::Daily).unwrap();

    let again = aggregate(&daily, Resolution::Daily, session.policies()).unwrap();
    assert_eq!(*daily, again);
}

#[test]
fn test_fifteen_minutes_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let same = session.query(None, Resolution::FifteenMinutes).unwrap();
    assert_eq!(*same, *session.frame());
}

#[test]
fn test_cache_shares_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());

    let a = session.query(None, Resolution::Monthly).unwrap();
    let b = session.query(None, Resolution::Monthly).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.len(), 1);

    let stats = session.cache_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn test_export_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let daily = session.query(None, Resolution::Daily).unwrap();

    let out = dir.path().join("export/daily.csv.gz");
    write_frame(&out, &daily, catalog::TIMESTAMP_COLUMN).unwrap();

    let reloaded = load_dataset(&out, catalog::TIMESTAMP_COLUMN).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.value(0, "Rain_mm_Tot"), Some(1.5));
}

#[test]
fn test_stats_and_wind_rose_on_raw_data() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_session(dir.path());

    let summaries = describe(session.frame(), &["AirTC_Avg".to_string()]);
    assert_eq!(summaries[0].count, 288);
    assert_eq!(summaries[0].mean, Some(11.0));
    assert_eq!(summaries[0].min, Some(10.0));
    assert_eq!(summaries[0].max, Some(12.0));

    let rose = wind_rose(
        session.frame(),
        WIND_SPEED_KMH,
        WIND_DIRECTION,
        &WindRoseConfig::default(),
    )
    .unwrap();
    assert_eq!(rose.samples, 288);
    let total: f64 = rose.sectors.iter().map(|s| s.percent).sum();
    assert!((total - 100.0).abs() < 1e-9);

    let east = rose.sectors.iter().find(|s| s.sector == "E").unwrap();
    assert!((east.percent - 100.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_missing_dataset_is_fatal() {
    let config = SessionConfig {
        source: PathBuf::from("/nonexistent/station.csv.gz"),
        ..SessionConfig::default()
    };
    let err = Session::open(config).err().expect("open should fail");
    assert!(format!("{err:#}").contains("/nonexistent/station.csv.gz"));
}
