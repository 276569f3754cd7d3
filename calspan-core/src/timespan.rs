//! Half-open time intervals over millisecond timestamps.

use std::fmt;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{CalSpanError, CalSpanResult};

/// An immutable interval `[start, end)` in milliseconds since the epoch.
///
/// Construction rejects `end < start`, so every `Timespan` in circulation is
/// well formed. Empty spans (`start == end`) are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timespan {
    start: i64,
    end: i64,
}

/// Argument to [`Timespan::contains`]: a single instant or a whole span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOrSpan {
    Point(i64),
    Span(Timespan),
}

impl From<i64> for PointOrSpan {
    fn from(ms: i64) -> Self {
        PointOrSpan::Point(ms)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for PointOrSpan {
    fn from(dt: DateTime<Tz>) -> Self {
        PointOrSpan::Point(dt.timestamp_millis())
    }
}

impl<Tz: TimeZone> From<&DateTime<Tz>> for PointOrSpan {
    fn from(dt: &DateTime<Tz>) -> Self {
        PointOrSpan::Point(dt.timestamp_millis())
    }
}

impl From<Timespan> for PointOrSpan {
    fn from(span: Timespan) -> Self {
        PointOrSpan::Span(span)
    }
}

impl From<&Timespan> for PointOrSpan {
    fn from(span: &Timespan) -> Self {
        PointOrSpan::Span(*span)
    }
}

impl Timespan {
    pub fn new(start: i64, end: i64) -> CalSpanResult<Self> {
        if end < start {
            return Err(CalSpanError::InvalidInterval { start, end });
        }
        Ok(Timespan { start, end })
    }

    /// Span between two instants given in either order.
    pub fn between(a: i64, b: i64) -> Self {
        Timespan {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn from_dates<A: TimeZone, B: TimeZone>(
        start: &DateTime<A>,
        end: &DateTime<B>,
    ) -> CalSpanResult<Self> {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.end - self.start)
    }

    pub fn is_equal(&self, other: &Timespan) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// Points are inclusive of `end`; spans must be fully enclosed.
    pub fn contains(&self, value: impl Into<PointOrSpan>) -> bool {
        match value.into() {
            PointOrSpan::Point(v) => self.start <= v && v <= self.end,
            PointOrSpan::Span(t) => self.start <= t.start && self.end >= t.end,
        }
    }

    /// Spans that only touch at an endpoint do not overlap.
    pub fn overlaps(&self, other: &Timespan) -> bool {
        self.overlaps_range(other.start, other.end)
    }

    pub fn overlaps_range(&self, start: i64, end: i64) -> bool {
        !(end <= self.start || start >= self.end)
    }

    /// One local midnight per calendar day, from the start's day through the
    /// end's day.
    pub fn days_between(&self) -> Vec<DateTime<Local>> {
        let first = local_date(self.start);
        let last = local_date(self.end);

        first
            .iter_days()
            .take_while(|day| *day <= last)
            .filter_map(local_midnight)
            .collect()
    }

    /// The part of `other` left over once the overlap with `self` is cut out.
    ///
    /// Returns `None` when either span contains the other, and `other`
    /// untouched when they do not overlap.
    pub fn trim_overlap(&self, other: &Timespan) -> Option<Timespan> {
        if self.contains(other) || other.contains(self) {
            return None;
        }

        if !self.overlaps(other) {
            return Some(*other);
        }

        if other.start < self.start {
            Some(Timespan {
                start: other.start,
                end: self.start - 1,
            })
        } else {
            Some(Timespan {
                start: self.end + 1,
                end: other.end,
            })
        }
    }

    /// Smallest span covering both.
    pub fn union(&self, other: &Timespan) -> Timespan {
        Timespan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// True when the spans overlap or share an endpoint.
    pub fn is_adjacent_or_overlapping(&self, other: &Timespan) -> bool {
        self.overlaps(other) || self.end == other.start || other.end == self.start
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

pub(crate) fn local_date(ms: i64) -> NaiveDate {
    Local
        .timestamp_millis_opt(ms)
        .earliest()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Local midnight of `day`, or the first valid instant after it when a DST
/// transition skips midnight.
pub(crate) fn local_midnight(day: NaiveDate) -> Option<DateTime<Local>> {
    let midnight = day.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
}
