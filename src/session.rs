//! Session adapter: owns the loaded dataset, the user's selection and a
//! bounded cache of resampled frames.
//!
//! Everything a presentation layer needs lives in one [`Session`] passed by
//! reference; there is no process-wide state. Cached frames are keyed by the
//! source fingerprint, date range and resolution, so they never need to be
//! invalidated explicitly.

use anyhow::{Context, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analyzers::analyzer::{DateRange, Query, run_query};
use crate::analyzers::types::{AggregationPolicy, Frame, PolicyTable, Resolution};
use crate::analyzers::wind::{WindRose, WindRoseConfig, wind_rose};
use crate::catalog::{self, Station, TIMESTAMP_COLUMN, WIND_DIRECTION, WIND_SPEED_KMH};
use crate::parser::parse_dataset;

pub const DEFAULT_CACHE_CAPACITY: usize = 16;
pub const DEFAULT_SOURCE: &str = "base_de_datos_3_hermanas.csv.gz";

/// Session-scoped settings, loadable from a JSON file.
///
/// ```json
/// {
///   "source": "data/station.csv.gz",
///   "channels": ["AirTC_Avg", "Rain_mm_Tot"],
///   "resolution": "daily",
///   "range": { "start": "2024-01-01", "end": "2024-03-31" },
///   "cache_capacity": 8
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub source: PathBuf,
    pub timestamp_column: String,
    /// Channels to report; empty means the catalog's default selection.
    pub channels: Vec<String>,
    pub resolution: Resolution,
    pub range: Option<DateRange>,
    /// Second period for comparison mode.
    pub comparison: Option<DateRange>,
    pub cache_capacity: usize,
    /// Extra channels aggregated by sum, on top of the catalog's.
    pub sum_channels: Vec<String>,
    pub station: Station,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from(DEFAULT_SOURCE),
            timestamp_column: TIMESTAMP_COLUMN.to_string(),
            channels: Vec::new(),
            resolution: Resolution::Daily,
            range: None,
            comparison: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            sum_channels: Vec::new(),
            station: Station::default(),
        }
    }
}

impl SessionConfig {
    /// Loads the config from a JSON file at `path`. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config '{}'", path.display()))?;
        Ok(config)
    }

    /// Catalog policies plus the configured sum channels.
    pub fn policies(&self) -> PolicyTable {
        self.sum_channels
            .iter()
            .fold(catalog::default_policies(), |table, name| {
                table.with(name.as_str(), AggregationPolicy::Sum)
            })
    }

    /// The configured channels, or the default selection when none are set.
    pub fn selected_channels(&self) -> Vec<String> {
        if self.channels.is_empty() {
            catalog::DEFAULT_SELECTION
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.channels.clone()
        }
    }
}

/// Key of one memoized query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: u32,
    pub range: Option<DateRange>,
    pub resolution: Resolution,
}

/// Hit/miss counters of a [`QueryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded LRU cache of resampled frames.
pub struct QueryCache {
    entries: LruCache<CacheKey, Arc<Frame>>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached frame for `key`, computing and inserting it on a miss.
    pub fn get_or_try_insert<E, F>(&mut self, key: CacheKey, compute: F) -> Result<Arc<Frame>, E>
    where
        F: FnOnce() -> Result<Frame, E>,
    {
        if let Some(frame) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(frame));
        }

        self.misses += 1;
        let frame = Arc::new(compute()?);
        self.entries.put(key, Arc::clone(&frame));
        Ok(frame)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// Wind rose of a resampled frame, from its km/h speed and direction channels.
pub fn station_wind_rose(frame: &Frame) -> Option<WindRose> {
    wind_rose(frame, WIND_SPEED_KMH, WIND_DIRECTION, &WindRoseConfig::default())
}

/// One interactive session over a single dataset.
pub struct Session {
    config: SessionConfig,
    frame: Frame,
    fingerprint: u32,
    policies: PolicyTable,
    cache: QueryCache,
}

impl Session {
    /// Reads the configured source once and builds the session.
    #[tracing::instrument(skip(config), fields(source = %config.source.display()))]
    pub fn open(config: SessionConfig) -> Result<Self> {
        let bytes = std::fs::read(&config.source)
            .with_context(|| format!("dataset '{}' not found", config.source.display()))?;
        Self::from_bytes(config, &bytes)
    }

    /// Builds a session from dataset bytes already in memory.
    pub fn from_bytes(config: SessionConfig, bytes: &[u8]) -> Result<Self> {
        let fingerprint = crc32fast::hash(bytes);
        let frame = parse_dataset(bytes, &config.timestamp_column)
            .with_context(|| format!("cannot load dataset '{}'", config.source.display()))?;

        info!(
            fingerprint = %format!("{fingerprint:08x}"),
            rows = frame.len(),
            "Session opened"
        );

        Ok(Self {
            policies: config.policies(),
            cache: QueryCache::new(config.cache_capacity),
            config,
            frame,
            fingerprint,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// CRC32 of the source bytes.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// First and last day of the dataset.
    pub fn span(&self) -> Option<DateRange> {
        DateRange::of_frame(&self.frame)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resampled frame for `range` (whole dataset when `None`) at `resolution`.
    /// Repeated calls with the same arguments share one computed frame.
    pub fn query(&mut self, range: Option<DateRange>, resolution: Resolution) -> Result<Arc<Frame>> {
        let key = CacheKey {
            source: self.fingerprint,
            range,
            resolution,
        };
        let (frame, policies) = (&self.frame, &self.policies);

        let result = self.cache.get_or_try_insert(key, || {
            debug!(range = ?range, resolution = %resolution, "Computing query");
            run_query(frame, &Query { range, resolution }, policies)
        })?;
        Ok(result)
    }

    /// Query for the configured range and resolution.
    pub fn selected(&mut self) -> Result<Arc<Frame>> {
        let (range, resolution) = (self.config.range, self.config.resolution);
        self.query(range, resolution)
    }

    /// Wind rose of the configured range at the configured resolution.
    pub fn selected_wind_rose(&mut self) -> Result<Option<WindRose>> {
        Ok(station_wind_rose(&*self.selected()?))
    }

    /// Both periods of comparison mode, or `None` when no comparison range is configured.
    pub fn comparison(&mut self) -> Result<Option<(Arc<Frame>, Arc<Frame>)>> {
        let Some(second) = self.config.comparison else {
            return Ok(None);
        };
        let first = self.selected()?;
        let second = self.query(Some(second), self.config.resolution)?;
        Ok(Some((first, second)))
    }

    /// Replaces the date range and resolution of the selection.
    pub fn select(&mut self, range: Option<DateRange>, resolution: Resolution) {
        self.config.range = range;
        self.config.resolution = resolution;
    }

    pub fn set_comparison(&mut self, range: Option<DateRange>) {
        self.config.comparison = range;
    }
}
