//! CSV loader for station datalogger exports.
//!
//! Reads a gzip-compressed (or plain) CSV with one timestamp column and any
//! number of numeric channels into a [`Frame`].

use crate::analyzers::types::Frame;
use crate::catalog::{KMH_PER_MS, SNOW_DEPTH, SNOW_SENSOR_DISTANCE, WIND_SPEED_KMH, WIND_SPEED_MS};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use flate2::read::MultiGzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Errors that can arise when loading a dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read dataset '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("timestamp column '{0}' not found in header")]
    MissingTimestampColumn(String),

    #[error("line {line}: cannot parse timestamp '{value}'")]
    BadTimestamp { line: u64, value: String },
}

/// Reads and parses the dataset at `path`.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn load_dataset(path: &Path, timestamp_column: &str) -> Result<Frame, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dataset(&bytes, timestamp_column)
}

/// Parses dataset bytes, decompressing them first when they start with the
/// gzip magic number. Rows are sorted by timestamp and derived channels added.
pub fn parse_dataset(bytes: &[u8], timestamp_column: &str) -> Result<Frame, LoadError> {
    let compressed = bytes.starts_with(&GZIP_MAGIC);
    debug!(bytes = bytes.len(), compressed, "Parsing dataset");

    let mut frame = if compressed {
        read_frame(MultiGzDecoder::new(bytes), timestamp_column)?
    } else {
        read_frame(bytes, timestamp_column)?
    };

    frame.sort_by_timestamp();
    derive_channels(&mut frame);

    info!(
        rows = frame.len(),
        channels = frame.channels().len(),
        first = ?frame.first_timestamp(),
        last = ?frame.last_timestamp(),
        "Dataset loaded"
    );
    Ok(frame)
}

fn read_frame<R: Read>(reader: R, timestamp_column: &str) -> Result<Frame, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let ts_idx = headers
        .iter()
        .position(|h| h == timestamp_column)
        .ok_or_else(|| LoadError::MissingTimestampColumn(timestamp_column.to_string()))?;

    let channel_idx: Vec<usize> = (0..headers.len()).filter(|i| *i != ts_idx).collect();
    let mut frame = Frame::new(channel_idx.iter().map(|i| headers[*i].to_string()).collect());

    for result in rdr.records() {
        let record = result?;
        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
            line: record.position().map_or(0, |p| p.line()),
            value: raw_ts.to_string(),
        })?;

        let values = channel_idx
            .iter()
            .map(|i| record.get(*i).and_then(parse_value))
            .collect();
        frame.push(timestamp, values);
    }

    Ok(frame)
}

/// Parses the datalogger timestamp formats; a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Parses one cell. Empty cells, `NAN`/`NA` markers and non-finite numbers are missing.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Adds the computed channels: wind speed in km/h and snow depth from the
/// sensor-to-surface distance. Existing columns with those names are kept.
pub fn derive_channels(frame: &mut Frame) {
    if let Some(ms) = frame.channel_index(WIND_SPEED_MS) {
        if !frame.has_channel(WIND_SPEED_KMH) {
            frame.derive_channel(WIND_SPEED_KMH, |row| row.values[ms].map(|v| v * KMH_PER_MS));
        }
    }

    if let Some(dt) = frame.channel_index(SNOW_SENSOR_DISTANCE) {
        if !frame.has_channel(SNOW_DEPTH) {
            let max = frame
                .present_values(SNOW_SENSOR_DISTANCE)
                .into_iter()
                .reduce(f64::max);
            if let Some(max) = max {
                frame.derive_channel(SNOW_DEPTH, |row| {
                    row.values[dt].map(|v| (max - v).max(0.0))
                });
            }
        }
    }
}
