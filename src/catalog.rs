//! Channel catalog for the station's datalogger table.
//!
//! Single source of truth for column names, display labels and the
//! aggregation policy of every known channel. Other modules reference
//! channels through the constants here rather than hardcoding names.

use crate::analyzers::types::{AggregationPolicy, PolicyTable, WindComponent};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";

pub const AIR_TEMPERATURE: &str = "AirTC_Avg";
pub const RELATIVE_HUMIDITY: &str = "RH_Avg";
pub const WIND_SPEED_MS: &str = "WS_ms_Avg";
pub const WIND_SPEED_KMH: &str = "WS_kmh_Avg";
pub const WIND_DIRECTION: &str = "WindDir_Avg";
pub const PRESSURE: &str = "BP_mbar_Avg";
pub const SOLAR_RADIATION: &str = "incomingSW_Avg";
pub const ALBEDO: &str = "albedo_Avg";
pub const PRECIPITATION: &str = "Rain_mm_Tot";
pub const DEW_POINT: &str = "PtoRocio_Avg";
pub const SOIL_TEMPERATURE_50CM: &str = "T107_50cm_Avg";
pub const SOIL_TEMPERATURE_10CM: &str = "T107_10cm_Avg";
/// Distance from the ultrasonic sensor to the snow surface.
pub const SNOW_SENSOR_DISTANCE: &str = "DT_Avg";
pub const SNOW_DEPTH: &str = "SnowDepth_calc_cm";

/// m/s to km/h.
pub const KMH_PER_MS: f64 = 3.6;

// ---------------------------------------------------------------------------
// Channel metadata
// ---------------------------------------------------------------------------

/// Metadata for one known channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub policy: AggregationPolicy,
}

/// Known channels, in the order they are presented.
pub static CHANNEL_CATALOG: &[ChannelInfo] = &[
    ChannelInfo {
        name: AIR_TEMPERATURE,
        label: "Temperature",
        unit: "°C",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: RELATIVE_HUMIDITY,
        label: "Humidity",
        unit: "%",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: WIND_SPEED_KMH,
        label: "Wind speed",
        unit: "km/h",
        policy: AggregationPolicy::Vector(WindComponent::Speed { scale: KMH_PER_MS }),
    },
    ChannelInfo {
        name: WIND_SPEED_MS,
        label: "Wind speed",
        unit: "m/s",
        policy: AggregationPolicy::Vector(WindComponent::Speed { scale: 1.0 }),
    },
    ChannelInfo {
        name: WIND_DIRECTION,
        label: "Wind direction",
        unit: "°",
        policy: AggregationPolicy::Vector(WindComponent::Direction),
    },
    ChannelInfo {
        name: PRESSURE,
        label: "Atmospheric pressure",
        unit: "hPa",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: SOLAR_RADIATION,
        label: "Solar radiation",
        unit: "W/m²",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: ALBEDO,
        label: "Albedo",
        unit: "%",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: PRECIPITATION,
        label: "Precipitation",
        unit: "mm",
        policy: AggregationPolicy::Sum,
    },
    ChannelInfo {
        name: DEW_POINT,
        label: "Dew point",
        unit: "°C",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: SOIL_TEMPERATURE_50CM,
        label: "Soil temperature at 50 cm",
        unit: "°C",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: SOIL_TEMPERATURE_10CM,
        label: "Soil temperature at 10 cm",
        unit: "°C",
        policy: AggregationPolicy::Mean,
    },
    ChannelInfo {
        name: SNOW_DEPTH,
        label: "Snow depth",
        unit: "cm",
        policy: AggregationPolicy::Mean,
    },
];

/// Channels selected when the user does not pick any.
pub const DEFAULT_SELECTION: &[&str] = &[AIR_TEMPERATURE, SOLAR_RADIATION];

pub fn lookup(name: &str) -> Option<&'static ChannelInfo> {
    CHANNEL_CATALOG.iter().find(|c| c.name == name)
}

/// `"Temperature (°C)"` for known channels, the raw column name otherwise.
pub fn display_label(name: &str) -> String {
    match lookup(name) {
        Some(info) => format!("{} ({})", info.label, info.unit),
        None => name.to_string(),
    }
}

/// Policy table built from the catalog.
pub fn default_policies() -> PolicyTable {
    CHANNEL_CATALOG
        .iter()
        .filter(|c| c.policy != AggregationPolicy::Mean)
        .fold(PolicyTable::new(), |table, c| table.with(c.name, c.policy))
}

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Where the dataset was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

impl Default for Station {
    fn default() -> Self {
        Self {
            name: "Tres Hermanas".to_string(),
            latitude: -39.4167,
            longitude: -71.75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<_> = CHANNEL_CATALOG.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CHANNEL_CATALOG.len());
    }

    #[test]
    fn test_default_selection_is_catalogued() {
        for name in DEFAULT_SELECTION {
            assert!(lookup(name).is_some(), "{name} missing from catalog");
        }
    }

    #[test]
    fn test_display_label() {
        assert_eq!(display_label(AIR_TEMPERATURE), "Temperature (°C)");
        assert_eq!(display_label("RECORD"), "RECORD");
    }

    #[test]
    fn test_default_policies() {
        let table = default_policies();
        assert_eq!(table.policy(PRECIPITATION), AggregationPolicy::Sum);
        assert_eq!(
            table.policy(WIND_DIRECTION),
            AggregationPolicy::Vector(WindComponent::Direction)
        );
        assert_eq!(
            table.policy(WIND_SPEED_KMH),
            AggregationPolicy::Vector(WindComponent::Speed { scale: 3.6 })
        );
        assert_eq!(table.policy(AIR_TEMPERATURE), AggregationPolicy::Mean);
    }

    #[test]
    fn test_one_wind_direction_channel() {
        let directions = CHANNEL_CATALOG
            .iter()
            .filter(|c| c.policy == AggregationPolicy::Vector(WindComponent::Direction))
            .count();
        assert_eq!(directions, 1);
    }
}
