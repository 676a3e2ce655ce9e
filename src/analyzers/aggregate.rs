use crate::analyzers::types::{
    AggregateError, AggregationPolicy, Frame, Observation, PolicyTable, Resolution, WindComponent,
};
use crate::analyzers::utility::{mean_present, sum_present};
use crate::analyzers::wind::{CALM_TOLERANCE, WindVector, vector_mean, wind_sample};
use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, warn};

/// Resamples observation frames with a fixed policy table.
#[derive(Debug, Clone, Default)]
pub struct TemporalAggregator {
    policies: PolicyTable,
}

impl TemporalAggregator {
    pub fn new(policies: PolicyTable) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn aggregate(&self, frame: &Frame, resolution: Resolution) -> Result<Frame, AggregateError> {
        aggregate(frame, resolution, &self.policies)
    }
}

/// How one output column is produced from a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    Mean,
    Sum,
    Direction,
    Speed(f64),
    /// Half of a wind pair whose partner is absent: never fabricated.
    Unpaired,
}

/// Column rules resolved against one frame's channel list.
struct ChannelPlan {
    rules: Vec<Rule>,
    /// (speed index, speed scale, direction index)
    wind: Option<(usize, f64, usize)>,
}

impl ChannelPlan {
    fn new(frame: &Frame, policies: &PolicyTable) -> Self {
        let mut rules: Vec<Rule> = frame
            .channels()
            .iter()
            .map(|name| match policies.policy(name) {
                AggregationPolicy::Mean => Rule::Mean,
                AggregationPolicy::Sum => Rule::Sum,
                AggregationPolicy::Vector(WindComponent::Direction) => Rule::Direction,
                AggregationPolicy::Vector(WindComponent::Speed { scale }) => Rule::Speed(scale),
            })
            .collect();

        let direction = rules.iter().position(|r| *r == Rule::Direction);
        // Prefer the base-unit speed channel; fall back to any scaled one.
        let speed = rules
            .iter()
            .position(|r| *r == Rule::Speed(1.0))
            .or_else(|| rules.iter().position(|r| matches!(r, Rule::Speed(_))));

        let wind = match (speed, direction) {
            (Some(s), Some(d)) => match rules[s] {
                Rule::Speed(scale) if scale > 0.0 => Some((s, scale, d)),
                _ => None,
            },
            _ => None,
        };

        if wind.is_none() {
            let unpaired: Vec<&str> = rules
                .iter()
                .zip(frame.channels())
                .filter(|(r, _)| matches!(r, Rule::Direction | Rule::Speed(_)))
                .map(|(_, name)| name.as_str())
                .collect();
            if !unpaired.is_empty() {
                warn!(
                    channels = ?unpaired,
                    "Wind pair incomplete, vector recomposition skipped"
                );
            }
            for rule in &mut rules {
                if matches!(rule, Rule::Direction | Rule::Speed(_)) {
                    *rule = Rule::Unpaired;
                }
            }
        }

        Self { rules, wind }
    }

    fn reduce(&self, rows: &[Observation]) -> Vec<Option<f64>> {
        let wind: Option<WindVector> = self.wind.and_then(|(s, scale, d)| {
            vector_mean(
                rows.iter()
                    .filter_map(|r| wind_sample(r.values[s].map(|v| v / scale), r.values[d])),
            )
        });

        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| match rule {
                Rule::Mean => mean_present(rows.iter().map(|r| r.values[i])),
                Rule::Sum => sum_present(rows.iter().map(|r| r.values[i])),
                Rule::Direction => wind.and_then(|w| w.direction()),
                Rule::Speed(scale) => wind.map(|w| w.speed() * scale),
                Rule::Unpaired => None,
            })
            .collect()
    }

    /// Copies a lone row, clearing its direction when the wind is calm.
    fn copy_row(&self, row: &Observation) -> Vec<Option<f64>> {
        let mut values = row.values.clone();
        if let Some((s, scale, d)) = self.wind {
            if values[s].is_some_and(|v| v / scale <= CALM_TOLERANCE) {
                values[d] = None;
            }
        }
        values
    }
}

/// Smallest positive gap between consecutive timestamps.
pub fn native_interval(frame: &Frame) -> Option<TimeDelta> {
    frame
        .rows()
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|gap| *gap > TimeDelta::zero())
        .min()
}

fn check_ordered(frame: &Frame) -> Result<(), AggregateError> {
    match frame
        .rows()
        .windows(2)
        .find(|w| w[1].timestamp < w[0].timestamp)
    {
        Some(w) => Err(AggregateError::UnorderedInput {
            previous: w[0].timestamp,
            next: w[1].timestamp,
        }),
        None => Ok(()),
    }
}

/// Resamples `frame` to `resolution`.
///
/// Scalar channels are averaged (or summed, per `policies`) ignoring missing
/// values. Wind speed and direction are recomposed from the bucket means of
/// their u/v components; a bucket without a complete speed/direction pair
/// leaves both missing. Buckets are labelled by their start and returned in
/// ascending order; buckets without any value are dropped.
///
/// Resolutions no coarser than the frame's native sampling interval pass rows
/// through unchanged, merging only rows that share a timestamp. A frame with a
/// single timestamp passes through when that timestamp is a bucket start.
/// A passed-through calm row loses its direction.
pub fn aggregate(
    frame: &Frame,
    resolution: Resolution,
    policies: &PolicyTable,
) -> Result<Frame, AggregateError> {
    let mut out = Frame::new(frame.channels().to_vec());
    if frame.is_empty() {
        return Ok(out);
    }
    check_ordered(frame)?;

    let pass_through = match (resolution.nominal_width(), native_interval(frame)) {
        (None, _) => true,
        (Some(width), Some(native)) => width <= native,
        // One distinct timestamp: pass through when it already sits on a bucket start.
        (Some(_), None) => frame
            .first_timestamp()
            .is_some_and(|ts| resolution.bucket_start(ts) == ts),
    };
    let bucket_of = |ts: NaiveDateTime| {
        if pass_through {
            ts
        } else {
            resolution.bucket_start(ts)
        }
    };

    let plan = ChannelPlan::new(frame, policies);

    for bucket in frame
        .rows()
        .chunk_by(|a, b| bucket_of(a.timestamp) == bucket_of(b.timestamp))
    {
        let start = bucket_of(bucket[0].timestamp);

        if pass_through && bucket.len() == 1 {
            if !bucket[0].is_empty() {
                out.push(start, plan.copy_row(&bucket[0]));
            }
            continue;
        }

        let values = plan.reduce(bucket);
        if values.iter().any(Option::is_some) {
            out.push(start, values);
        }
    }

    debug!(
        resolution = %resolution,
        pass_through,
        input_rows = frame.len(),
        output_rows = out.len(),
        "Frame aggregated"
    );

    Ok(out)
}

/// Like [`aggregate`], taking the resolution as a frequency string (`"D"`,
/// `"monthly"`, ...). Unknown strings fail with
/// [`AggregateError::UnsupportedResolution`].
pub fn aggregate_with_frequency(
    frame: &Frame,
    frequency: &str,
    policies: &PolicyTable,
) -> Result<Frame, AggregateError> {
    let resolution: Resolution = frequency.parse()?;
    aggregate(frame, resolution, policies)
}
