//! RRULE expansion for recurring events.
//!
//! Turns an event into its concrete occurrences. The sync window only bounds
//! recurrence expansion: a non-recurring event always has exactly one
//! occurrence, itself.
//!
//! Rules are expanded in local wall-clock time, so a 10:00 meeting stays at
//! 10:00 across a DST change and all-day occurrences start at local midnight.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use rrule::RRuleSet;
use tracing::warn;

use crate::constants::{DEFAULT_MAX_OCCURRENCES, DEFAULT_SYNC_DAYS};
use crate::error::{CalSpanError, CalSpanResult};
use crate::event::{Event, Recurrence, TransportTime};
use crate::timespan::{Timespan, local_midnight};

/// The range in which recurring events are expanded into busytimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub span: Timespan,
    pub max_occurrences: u16,
}

impl Default for SyncWindow {
    /// Default window: ±DEFAULT_SYNC_DAYS from now
    fn default() -> Self {
        Self::around(Utc::now(), DEFAULT_SYNC_DAYS, DEFAULT_MAX_OCCURRENCES)
    }
}

impl SyncWindow {
    pub fn around(now: DateTime<Utc>, days: i64, max_occurrences: u16) -> Self {
        let start = (now - Duration::days(days)).timestamp_millis();
        let end = (now + Duration::days(days)).timestamp_millis();

        SyncWindow {
            span: Timespan::between(start, end),
            max_occurrences,
        }
    }

    pub fn new(span: Timespan, max_occurrences: u16) -> Self {
        SyncWindow {
            span,
            max_occurrences,
        }
    }
}

/// Build an iCalendar-format rule set string for the rrule crate parser.
///
/// DTSTART is written without `Z`, which the parser reads in the local zone.
/// EXDATEs stay UTC instants since they are matched by timestamp.
fn build_rrule_string(start: &TransportTime, recurrence: &Recurrence) -> String {
    let mut lines = vec![format!("DTSTART:{}", ics_local(start))];

    lines.push(format!("RRULE:{}", recurrence.rrule));

    for exdate in &recurrence.exdates {
        lines.push(format!("EXDATE:{}", ics_utc(exdate)));
    }

    lines.join("\n")
}

fn ics_utc(time: &TransportTime) -> String {
    time.to_utc().format("%Y%m%dT%H%M%SZ").to_string()
}

fn ics_local(time: &TransportTime) -> String {
    time.to_date().format("%Y%m%dT%H%M%S").to_string()
}

/// Occurrences of `event`, ascending by start.
///
/// A non-recurring event yields its own span wherever it lies. A recurring one
/// yields the occurrences overlapping the window; timed occurrences keep the
/// event's duration, all-day ones its length in days.
pub fn expand(event: &Event, window: &SyncWindow) -> CalSpanResult<Vec<Timespan>> {
    let Some(own) = event.span() else {
        return Ok(Vec::new());
    };

    let Some(recurrence) = event.recurrence() else {
        return Ok(vec![own]);
    };

    let remote = &event.record().remote;
    let rule_set: RRuleSet = build_rrule_string(&remote.start, recurrence)
        .parse()
        .map_err(|e| {
            CalSpanError::Recurrence(format!(
                "Failed to parse RRULE for event '{}': {}",
                event.id(),
                e
            ))
        })?;

    // Occurrences starting up to one duration before the window still reach into it.
    // Subtract/add 1ms to make the range inclusive (after/before are exclusive).
    let duration = own.duration();
    let tz = rrule::Tz::LOCAL;
    let after = to_utc(window.span.start() - duration.num_milliseconds() - 1).with_timezone(&tz);
    let before = to_utc(window.span.end() + 1).with_timezone(&tz);

    let result = rule_set.after(after).before(before).all(window.max_occurrences);
    if result.limited {
        warn!(
            event_id = event.id(),
            limit = window.max_occurrences,
            "recurrence expansion truncated"
        );
    }

    let all_day_length = event.is_all_day().then(|| {
        (event.end_date().date_naive() - event.start_date().date_naive()).num_days()
    });

    let occurrences = result
        .dates
        .iter()
        .filter_map(|occ| match all_day_length {
            Some(days) => {
                let first = occ.with_timezone(&Local).date_naive();
                let start = local_midnight(first)?;
                let end = local_midnight(first + Duration::days(days))?;
                Timespan::from_dates(&start, &end).ok()
            }
            None => {
                let start = occ.timestamp_millis();
                Timespan::new(start, start + duration.num_milliseconds()).ok()
            }
        })
        .filter(|occ| window.span.overlaps(occ))
        .collect();

    Ok(occurrences)
}

fn to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
