use serde::Serialize;

use crate::analyzers::types::Frame;
use crate::analyzers::utility::{mean, quantile, sample_stddev};
use crate::catalog::display_label;

/// Descriptive statistics for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub label: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl ChannelSummary {
    /// Summarizes `values`; non-finite entries are ignored.
    pub fn from_values(channel: &str, values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let avg = mean(&sorted);
        ChannelSummary {
            channel: channel.to_string(),
            label: display_label(channel),
            count: sorted.len(),
            mean: avg,
            std: avg.and_then(|m| sample_stddev(&sorted, m)),
            min: sorted.first().copied(),
            p25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            p75: quantile(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }

    /// Share of `total` rows that carried a value, in percent.
    pub fn coverage_pct(&self, total: usize) -> f64 {
        pct(self.count, total)
    }
}

pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Summaries for each of `channels` present in `frame`, in the requested order.
pub fn describe(frame: &Frame, channels: &[String]) -> Vec<ChannelSummary> {
    channels
        .iter()
        .filter(|name| frame.has_channel(name))
        .map(|name| ChannelSummary::from_values(name, &frame.present_values(name)))
        .collect()
}
