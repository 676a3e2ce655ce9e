//! Output formatting and export for resampled frames and summary tables.
//!
//! Supports JSON logging, log tables, and CSV export (gzip-compressed when
//! the target path ends in `.gz`).

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzers::types::Frame;
use crate::analyzers::wind::WindRose;
use crate::stats::ChannelSummary;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Creates `path` and hands a writer to `write`, gzip-compressing the
/// stream for `.gz` paths.
fn with_file_writer<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory '{}'", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;

    if is_gzip_path(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write(&mut encoder)?;
        encoder.finish()?;
    } else {
        write(&mut file)?;
        file.flush()?;
    }
    Ok(())
}

/// Writes `frame` as CSV: a `timestamp_column` column followed by one column
/// per channel. Missing values are empty cells.
pub fn write_frame_to<W: Write>(writer: W, frame: &Frame, timestamp_column: &str) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);

    let mut header = vec![timestamp_column.to_string()];
    header.extend(frame.channels().iter().cloned());
    wtr.write_record(&header)?;

    for row in frame.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.timestamp.format(TIMESTAMP_FORMAT).to_string());
        record.extend(
            row.values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports `frame` to `path`, replacing any existing file.
pub fn write_frame(path: &Path, frame: &Frame, timestamp_column: &str) -> Result<()> {
    debug!(path = %path.display(), rows = frame.len(), "Writing frame");
    with_file_writer(path, |w| write_frame_to(w, frame, timestamp_column))?;
    info!(path = %path.display(), rows = frame.len(), "Frame exported");
    Ok(())
}

/// Writes serializable rows as CSV with a header.
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    with_file_writer(path, |w| {
        let mut wtr = WriterBuilder::new().from_writer(w);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    })?;
    info!(path = %path.display(), rows = rows.len(), "Table exported");
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// Logs one line per channel summary.
pub fn log_summaries(title: &str, summaries: &[ChannelSummary]) {
    if summaries.is_empty() {
        info!(title, "No channels selected for statistics");
        return;
    }
    for s in summaries {
        info!(
            title,
            channel = %s.label,
            count = s.count,
            mean = %fmt_opt(s.mean),
            std = %fmt_opt(s.std),
            min = %fmt_opt(s.min),
            p25 = %fmt_opt(s.p25),
            median = %fmt_opt(s.median),
            p75 = %fmt_opt(s.p75),
            max = %fmt_opt(s.max),
            "Statistics"
        );
    }
}

/// Logs one line per non-empty wind-rose sector.
pub fn log_wind_rose(title: &str, rose: Option<&WindRose>) {
    let Some(rose) = rose else {
        info!(title, "No wind data for this period");
        return;
    };
    let labels = rose.speed_bin_labels();
    for sector in rose.sectors.iter().filter(|s| s.percent > 0.0) {
        let bins: Vec<String> = labels
            .iter()
            .zip(&sector.percent_by_speed)
            .filter(|(_, p)| **p > 0.0)
            .map(|(label, p)| format!("{label}:{p:.1}%"))
            .collect();
        info!(
            title,
            sector = sector.sector,
            percent = %format!("{:.1}", sector.percent),
            by_speed = %bins.join(" "),
            "Wind rose"
        );
    }
    info!(title, samples = rose.samples, "Wind rose complete");
}
