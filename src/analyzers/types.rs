//! Data types used by the resampling pipeline.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the aggregation core. All of them are caller errors:
/// the operations are pure, so retrying with the same input fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error(
        "unsupported resolution '{0}' (expected one of: raw, 15min, hourly, daily, monthly, quarterly)"
    )]
    UnsupportedResolution(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("timestamps must be non-decreasing: {next} follows {previous}")]
    UnorderedInput {
        previous: NaiveDateTime,
        next: NaiveDateTime,
    },
}

/// A single timestamped row. `values` is aligned with the channels of the
/// [`Frame`] that owns it; `None` marks a missing measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

impl Observation {
    /// Returns `true` when no channel carries a value.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// A time-indexed table of observations sharing one channel list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    channels: Vec<String>,
    rows: Vec<Observation>,
}

impl Frame {
    pub fn new(channels: Vec<String>) -> Self {
        Self {
            channels,
            rows: Vec::new(),
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel_index(name).is_some()
    }

    pub fn push(&mut self, timestamp: NaiveDateTime, mut values: Vec<Option<f64>>) {
        values.resize(self.channels.len(), None);
        self.rows.push(Observation { timestamp, values });
    }

    /// Value of `channel` in row `row`, if both exist and the value is present.
    pub fn value(&self, row: usize, channel: &str) -> Option<f64> {
        let idx = self.channel_index(channel)?;
        self.rows.get(row)?.values[idx]
    }

    /// Iterates one channel's column, including missing values.
    pub fn column(&self, channel: &str) -> Option<impl Iterator<Item = Option<f64>> + '_> {
        let idx = self.channel_index(channel)?;
        Some(self.rows.iter().map(move |r| r.values[idx]))
    }

    /// Present values of one channel. Empty when the channel does not exist.
    pub fn present_values(&self, channel: &str) -> Vec<f64> {
        self.column(channel)
            .map(|col| col.flatten().collect())
            .unwrap_or_default()
    }

    /// Appends a computed channel. An existing channel with the same name is
    /// overwritten in place.
    pub fn derive_channel<F>(&mut self, name: &str, compute: F)
    where
        F: Fn(&Observation) -> Option<f64>,
    {
        let idx = match self.channel_index(name) {
            Some(idx) => idx,
            None => {
                self.channels.push(name.to_string());
                for row in &mut self.rows {
                    row.values.push(None);
                }
                self.channels.len() - 1
            }
        };
        for row in &mut self.rows {
            row.values[idx] = compute(row);
        }
    }

    /// Projects the frame onto `channels`, in that order. Unknown names are skipped.
    pub fn select(&self, channels: &[String]) -> Frame {
        let picked: Vec<(usize, String)> = channels
            .iter()
            .filter_map(|name| self.channel_index(name).map(|idx| (idx, name.clone())))
            .collect();

        Frame {
            channels: picked.iter().map(|(_, name)| name.clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| Observation {
                    timestamp: row.timestamp,
                    values: picked.iter().map(|(idx, _)| row.values[*idx]).collect(),
                })
                .collect(),
        }
    }

    /// Copies the rows in `range` (by row position) into a new frame.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Frame {
        Frame {
            channels: self.channels.clone(),
            rows: self.rows[range].to_vec(),
        }
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|r| r.timestamp)
    }

    /// Stable sort by timestamp.
    pub fn sort_by_timestamp(&mut self) {
        self.rows.sort_by_key(|r| r.timestamp);
    }
}

/// Temporal resolution a frame can be resampled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    /// Pass-through: every input timestamp is its own bucket.
    Raw,
    FifteenMinutes,
    Hourly,
    Daily,
    Monthly,
    /// Calendar quarter (Jan-Mar, Apr-Jun, Jul-Sep, Oct-Dec).
    Quarterly,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Resolution::Raw,
        Resolution::FifteenMinutes,
        Resolution::Hourly,
        Resolution::Daily,
        Resolution::Monthly,
        Resolution::Quarterly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Raw => "raw",
            Resolution::FifteenMinutes => "15min",
            Resolution::Hourly => "hourly",
            Resolution::Daily => "daily",
            Resolution::Monthly => "monthly",
            Resolution::Quarterly => "quarterly",
        }
    }

    /// Human-readable name used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Raw => "Raw samples",
            Resolution::FifteenMinutes => "Every 15 minutes",
            Resolution::Hourly => "Hourly",
            Resolution::Daily => "Daily",
            Resolution::Monthly => "Monthly",
            Resolution::Quarterly => "Quarterly (3 months)",
        }
    }

    /// Shortest span a bucket of this resolution can cover. `None` for [`Resolution::Raw`].
    pub fn nominal_width(&self) -> Option<TimeDelta> {
        match self {
            Resolution::Raw => None,
            Resolution::FifteenMinutes => Some(TimeDelta::minutes(15)),
            Resolution::Hourly => Some(TimeDelta::hours(1)),
            Resolution::Daily => Some(TimeDelta::days(1)),
            Resolution::Monthly => Some(TimeDelta::days(28)),
            Resolution::Quarterly => Some(TimeDelta::days(90)),
        }
    }

    /// Truncates `ts` to the start of the bucket containing it.
    pub fn bucket_start(&self, ts: NaiveDateTime) -> NaiveDateTime {
        match self {
            Resolution::Raw => ts,
            Resolution::FifteenMinutes => floor_within_day(ts, 15 * 60),
            Resolution::Hourly => floor_within_day(ts, 60 * 60),
            Resolution::Daily => ts.date().and_time(NaiveTime::MIN),
            Resolution::Monthly => first_of_month(ts.date()).and_time(NaiveTime::MIN),
            Resolution::Quarterly => {
                let month_start = first_of_month(ts.date());
                (month_start - Months::new(ts.month0() % 3)).and_time(NaiveTime::MIN)
            }
        }
    }
}

fn floor_within_day(ts: NaiveDateTime, bucket_secs: u32) -> NaiveDateTime {
    let secs = ts.num_seconds_from_midnight();
    let start = secs - secs % bucket_secs;
    ts.date().and_time(NaiveTime::MIN) + TimeDelta::seconds(i64::from(start))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = AggregateError;

    /// Accepts the canonical names plus the pandas-style frequency aliases
    /// the station's data tooling uses (`15min`, `H`, `D`, `ME`, `Q`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "none" => Ok(Resolution::Raw),
            "15min" | "15t" => Ok(Resolution::FifteenMinutes),
            "h" | "1h" | "hour" | "hourly" => Ok(Resolution::Hourly),
            "d" | "1d" | "day" | "daily" => Ok(Resolution::Daily),
            "m" | "me" | "ms" | "month" | "monthly" => Ok(Resolution::Monthly),
            "q" | "qe" | "qs" | "quarter" | "quarterly" => Ok(Resolution::Quarterly),
            _ => Err(AggregateError::UnsupportedResolution(s.to_string())),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = AggregateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.as_str().to_string()
    }
}

/// Which half of the wind vector a channel carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindComponent {
    /// Direction the wind blows from, degrees clockwise from north.
    Direction,
    /// Speed expressed as `scale` times the base unit of the pair
    /// (e.g. `3.6` for km/h alongside a m/s primary channel).
    Speed { scale: f64 },
}

/// How a channel is reduced within one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationPolicy {
    Mean,
    Sum,
    /// Circular mean paired with a magnitude: recomposed from averaged u/v.
    Vector(WindComponent),
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationPolicy::Mean => f.write_str("mean"),
            AggregationPolicy::Sum => f.write_str("sum"),
            AggregationPolicy::Vector(WindComponent::Direction) => {
                f.write_str("vector-mean (direction)")
            }
            AggregationPolicy::Vector(WindComponent::Speed { scale }) if *scale == 1.0 => {
                f.write_str("vector-mean (speed)")
            }
            AggregationPolicy::Vector(WindComponent::Speed { scale }) => {
                write!(f, "vector-mean (speed x{scale})")
            }
        }
    }
}

/// Per-channel aggregation policies. Channels without an entry are averaged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyTable {
    policies: HashMap<String, AggregationPolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: impl Into<String>, policy: AggregationPolicy) -> Self {
        self.set(channel, policy);
        self
    }

    pub fn set(&mut self, channel: impl Into<String>, policy: AggregationPolicy) {
        self.policies.insert(channel.into(), policy);
    }

    pub fn policy(&self, channel: &str) -> AggregationPolicy {
        self.policies
            .get(channel)
            .copied()
            .unwrap_or(AggregationPolicy::Mean)
    }
}
