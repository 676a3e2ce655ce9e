use crate::analyzers::aggregate::aggregate;
use crate::analyzers::types::{AggregateError, Frame, PolicyTable, Resolution};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar-date range; the whole `end` day is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = AggregateError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AggregateError> {
        if start > end {
            return Err(AggregateError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let day = ts.date();
        day >= self.start && day <= self.end
    }

    /// The first to the last day covered by `frame`.
    pub fn of_frame(frame: &Frame) -> Option<Self> {
        Some(Self {
            start: frame.first_timestamp()?.date(),
            end: frame.last_timestamp()?.date(),
        })
    }

    /// Intersection with the days covered by `frame`; `None` when disjoint.
    pub fn clamp_to(&self, frame: &Frame) -> Option<Self> {
        let span = Self::of_frame(frame)?;
        Self::new(self.start.max(span.start), self.end.min(span.end)).ok()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One selection: an optional date range plus a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query {
    pub range: Option<DateRange>,
    pub resolution: Resolution,
}

/// Keeps the rows of a time-ordered `frame` whose date lies within `range`.
pub fn filter_range(frame: &Frame, range: &DateRange) -> Frame {
    let from = range.start.and_time(NaiveTime::MIN);
    let rows = frame.rows();
    let lo = rows.partition_point(|r| r.timestamp < from);
    let hi = lo + rows[lo..].partition_point(|r| range.contains(r.timestamp));
    frame.slice(lo..hi)
}

/// Filters `frame` to the query's range (if any) and resamples it.
pub fn run_query(
    frame: &Frame,
    query: &Query,
    policies: &PolicyTable,
) -> Result<Frame, AggregateError> {
    match &query.range {
        Some(range) => aggregate(&filter_range(frame, range), query.resolution, policies),
        None => aggregate(frame, query.resolution, policies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn hourly_frame(days: u32) -> Frame {
        let mut frame = Frame::new(vec!["t".to_string()]);
        let start = day(1).and_time(NaiveTime::MIN);
        for h in 0..(24 * days) {
            frame.push(start + TimeDelta::hours(i64::from(h)), vec![Some(f64::from(h))]);
        }
        frame
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        assert_eq!(
            DateRange::new(day(5), day(4)),
            Err(AggregateError::InvalidDateRange {
                start: day(5),
                end: day(4)
            })
        );
        assert!(DateRange::new(day(4), day(4)).is_ok());
    }

    #[test]
    fn test_filter_range_includes_whole_end_day() {
        let frame = hourly_frame(5);
        let range = DateRange::new(day(2), day(3)).unwrap();
        let filtered = filter_range(&frame, &range);

        assert_eq!(filtered.len(), 48);
        assert_eq!(filtered.first_timestamp().unwrap().date(), day(2));
        assert_eq!(filtered.last_timestamp().unwrap(), day(3).and_hms_opt(23, 0, 0).unwrap());
    }

    #[test]
    fn test_filter_range_outside_data_is_empty() {
        let frame = hourly_frame(2);
        let range = DateRange::new(day(10), day(12)).unwrap();
        assert!(filter_range(&frame, &range).is_empty());
        assert_eq!(range.clamp_to(&frame), None);
    }

    #[test]
    fn test_clamp_to_frame_span() {
        let frame = hourly_frame(3);
        let wide = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), day(20)).unwrap();
        assert_eq!(wide.clamp_to(&frame), DateRange::new(day(1), day(3)).ok());
    }

    #[test]
    fn test_run_query_filters_then_aggregates() {
        let frame = hourly_frame(4);
        let query = Query {
            range: Some(DateRange::new(day(2), day(3)).unwrap()),
            resolution: Resolution::Daily,
        };
        let out = run_query(&frame, &query, &PolicyTable::new()).unwrap();

        assert_eq!(out.len(), 2);
        // Hours 24..=47 average to 35.5.
        assert_eq!(out.value(0, "t"), Some(35.5));
    }

    #[test]
    fn test_date_range_deserialize_validates() {
        let ok: DateRange =
            serde_json::from_str(r#"{"start":"2024-03-01","end":"2024-03-02"}"#).unwrap();
        assert_eq!(ok.start(), day(1));
        assert!(
            serde_json::from_str::<DateRange>(r#"{"start":"2024-03-03","end":"2024-03-02"}"#)
                .is_err()
        );
    }
}
