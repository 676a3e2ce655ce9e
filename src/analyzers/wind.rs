//! Wind vector math.
//!
//! Directions follow the meteorological convention: the direction the wind
//! blows *from*, in degrees clockwise from north. Speeds are averaged through
//! their orthogonal components so that opposing directions cancel instead of
//! averaging to a perpendicular heading.

use crate::analyzers::types::Frame;
use serde::Serialize;

/// Vector speeds at or below this are calm; their direction is undefined.
pub const CALM_TOLERANCE: f64 = 1e-9;

/// Eastward (`u`) and northward (`v`) wind components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindVector {
    pub u: f64,
    pub v: f64,
}

impl WindVector {
    /// Decomposes a speed/direction pair. Returns `None` for a negative or
    /// non-finite speed, or a non-finite direction.
    pub fn from_speed_direction(speed: f64, direction_deg: f64) -> Option<Self> {
        if !speed.is_finite() || !direction_deg.is_finite() || speed < 0.0 {
            return None;
        }
        let rad = direction_deg.to_radians();
        Some(Self {
            u: -speed * rad.sin(),
            v: -speed * rad.cos(),
        })
    }

    fn is_calm(&self) -> bool {
        self.u.hypot(self.v) <= CALM_TOLERANCE
    }

    /// Magnitude of the vector; exactly `0.0` when calm.
    pub fn speed(&self) -> f64 {
        if self.is_calm() {
            return 0.0;
        }
        self.u.hypot(self.v)
    }

    /// Direction in `[0, 360)`, or `None` when the vector is calm.
    pub fn direction(&self) -> Option<f64> {
        if self.is_calm() {
            return None;
        }
        Some(normalize_degrees((-self.u).atan2(-self.v).to_degrees()))
    }
}

/// Averages the components of `(speed, direction)` samples. Unusable pairs
/// are skipped; `None` when no usable pair remains.
pub fn vector_mean(samples: impl IntoIterator<Item = (f64, f64)>) -> Option<WindVector> {
    let (u, v, n) = samples
        .into_iter()
        .filter_map(|(speed, dir)| WindVector::from_speed_direction(speed, dir))
        .fold((0.0, 0.0, 0usize), |(u, v, n), w| (u + w.u, v + w.v, n + 1));

    (n > 0).then(|| WindVector {
        u: u / n as f64,
        v: v / n as f64,
    })
}

/// Turns one row's speed and direction into a `(speed, direction)` sample.
/// A calm speed without a direction still counts, as a zero vector; any other
/// incomplete pair is unusable.
pub fn wind_sample(speed: Option<f64>, direction: Option<f64>) -> Option<(f64, f64)> {
    match (speed?, direction) {
        (speed, Some(direction)) => Some((speed, direction)),
        (speed, None) if (0.0..=CALM_TOLERANCE).contains(&speed) => Some((0.0, 0.0)),
        _ => None,
    }
}

/// Folds any angle into `[0, 360)`.
pub fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}

/// Compass labels for the sixteen wind-rose sectors, starting at north.
pub const SECTOR_LABELS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const SECTOR_WIDTH: f64 = 360.0 / SECTOR_LABELS.len() as f64;

/// Speed-bin edges for a wind rose. The last edge opens an unbounded bin.
#[derive(Debug, Clone, PartialEq)]
pub struct WindRoseConfig {
    pub speed_edges: Vec<f64>,
}

impl Default for WindRoseConfig {
    /// 0, 3, 6, ... 30 (km/h).
    fn default() -> Self {
        Self {
            speed_edges: (0..=10).map(|i| f64::from(i) * 3.0).collect(),
        }
    }
}

/// Frequency of one direction sector, split by speed bin.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SectorFrequency {
    pub sector: &'static str,
    pub center_deg: f64,
    pub percent: f64,
    pub percent_by_speed: Vec<f64>,
}

/// Direction/speed frequency table, in percent of all counted samples.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WindRose {
    pub samples: usize,
    pub speed_edges: Vec<f64>,
    pub sectors: Vec<SectorFrequency>,
}

impl WindRose {
    /// Human-readable bin labels, e.g. `"3-6"` and `">=30"`.
    pub fn speed_bin_labels(&self) -> Vec<String> {
        self.speed_edges
            .iter()
            .enumerate()
            .map(|(i, lo)| match self.speed_edges.get(i + 1) {
                Some(hi) => format!("{lo}-{hi}"),
                None => format!(">={lo}"),
            })
            .collect()
    }
}

/// Index of the sector containing `direction_deg`; sector 0 is centred on north.
pub fn sector_index(direction_deg: f64) -> usize {
    let d = normalize_degrees(direction_deg);
    ((d + SECTOR_WIDTH / 2.0) / SECTOR_WIDTH).floor() as usize % SECTOR_LABELS.len()
}

fn speed_bin(edges: &[f64], speed: f64) -> Option<usize> {
    if edges.first().is_none_or(|lo| speed < *lo) {
        return None;
    }
    Some(edges.partition_point(|edge| *edge <= speed) - 1)
}

/// Builds a wind rose from the rows of `frame` that carry both channels.
/// Returns `None` when fewer than two rows are usable.
pub fn wind_rose(
    frame: &Frame,
    speed_channel: &str,
    direction_channel: &str,
    config: &WindRoseConfig,
) -> Option<WindRose> {
    let speed_idx = frame.channel_index(speed_channel)?;
    let dir_idx = frame.channel_index(direction_channel)?;
    let edges = &config.speed_edges;

    let mut counts = vec![vec![0usize; edges.len()]; SECTOR_LABELS.len()];
    let mut total = 0usize;

    for row in frame.rows() {
        let (Some(speed), Some(dir)) = (row.values[speed_idx], row.values[dir_idx]) else {
            continue;
        };
        if !dir.is_finite() {
            continue;
        }
        if let Some(bin) = speed_bin(edges, speed) {
            counts[sector_index(dir)][bin] += 1;
            total += 1;
        }
    }

    if total < 2 {
        return None;
    }

    let pct = |n: usize| n as f64 / total as f64 * 100.0;
    let sectors = counts
        .iter()
        .enumerate()
        .map(|(i, bins)| SectorFrequency {
            sector: SECTOR_LABELS[i],
            center_deg: i as f64 * SECTOR_WIDTH,
            percent: pct(bins.iter().sum()),
            percent_by_speed: bins.iter().map(|n| pct(*n)).collect(),
        })
        .collect();

    Some(WindRose {
        samples: total,
        speed_edges: edges.clone(),
        sectors,
    })
}
