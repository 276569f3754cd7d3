//! Calendar event model.
//!
//! An [`Event`] owns the [`EventRecord`] that is persisted in the events
//! collection and exposes typed accessors over it. Start and end are kept in
//! their transport encoding (`{utc}` or `{utc, isDate}`) inside the record and
//! decoded on every read, so the record and the `DateTime` views can never
//! disagree.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalSpanError, CalSpanResult};
use crate::timespan::{Timespan, local_midnight};

/// A start or end time as stored in an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportTime {
    /// Milliseconds since the epoch. For date-only values this is local midnight.
    pub utc: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_date: bool,
}

impl TransportTime {
    pub fn timed(dt: &DateTime<Local>) -> Self {
        TransportTime {
            utc: dt.timestamp_millis(),
            is_date: false,
        }
    }

    pub fn date_only(dt: &DateTime<Local>) -> Self {
        TransportTime {
            utc: truncate_to_midnight(dt).timestamp_millis(),
            is_date: true,
        }
    }

    pub fn to_date(&self) -> DateTime<Local> {
        DateTime::from_timestamp_millis(self.utc)
            .unwrap_or_default()
            .with_timezone(&Local)
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.utc).unwrap_or_default()
    }
}

/// A reminder attached to an event, relative to each occurrence's start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTrigger {
    #[serde(default = "default_alarm_action")]
    pub action: String,
    /// Offset in seconds from the occurrence start (negative fires before).
    pub trigger: i64,
}

fn default_alarm_action() -> String {
    "DISPLAY".to_string()
}

impl AlarmTrigger {
    pub fn display(trigger: i64) -> Self {
        AlarmTrigger {
            action: default_alarm_action(),
            trigger,
        }
    }
}

/// Recurrence definition for master events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// RRULE value, e.g. "FREQ=WEEKLY;COUNT=4"
    pub rrule: String,
    /// Occurrence starts excluded from the rule
    #[serde(default)]
    pub exdates: Vec<TransportTime>,
}

/// Fields owned by the remote (synced) side of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(default)]
    pub alarms: Vec<AlarmTrigger>,
    pub start: TransportTime,
    pub end: TransportTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

/// The persisted shape of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub calendar_id: i64,
    pub remote: RemoteEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    #[serde(rename = "start-after-end")]
    StartAfterEnd,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::StartAfterEnd => "start-after-end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub name: ValidationErrorKind,
}

/// Partial update for [`Event::update_attributes`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct EventAttributes {
    pub is_all_day: Option<bool>,
    pub start_date: Option<DateTime<Local>>,
    pub end_date: Option<DateTime<Local>>,
    pub calendar_id: Option<i64>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub alarms: Option<Vec<AlarmTrigger>>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    record: EventRecord,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// A fresh event starting and ending now. Until one of the dates changes it
    /// fails validation.
    pub fn new() -> Self {
        let now = TransportTime::timed(&Local::now());

        Event {
            record: EventRecord {
                id: uuid::Uuid::new_v4().to_string(),
                calendar_id: 0,
                remote: RemoteEvent {
                    title: String::new(),
                    location: String::new(),
                    description: String::new(),
                    sync_token: None,
                    alarms: Vec::new(),
                    start: now,
                    end: now,
                    recurrence: None,
                },
            },
        }
    }

    pub fn from_record(record: EventRecord) -> Self {
        Event { record }
    }

    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    pub fn into_record(self) -> EventRecord {
        self.record
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.record.id = id.into();
    }

    // DATES:

    pub fn start_date(&self) -> DateTime<Local> {
        self.record.remote.start.to_date()
    }

    pub fn end_date(&self) -> DateTime<Local> {
        self.record.remote.end.to_date()
    }

    pub fn set_start_date(&mut self, date: DateTime<Local>) {
        self.record.remote.start = self.encode(&date);
    }

    pub fn set_end_date(&mut self, date: DateTime<Local>) {
        self.record.remote.end = self.encode(&date);
    }

    fn encode(&self, date: &DateTime<Local>) -> TransportTime {
        if self.is_all_day() {
            TransportTime::date_only(date)
        } else {
            TransportTime::timed(date)
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.record.remote.start.is_date && self.record.remote.end.is_date
    }

    pub fn set_all_day(&mut self, all_day: bool) {
        let remote = &mut self.record.remote;

        if all_day {
            remote.start = TransportTime::date_only(&remote.start.to_date());
            remote.end = TransportTime::date_only(&remote.end.to_date());
        } else {
            remote.start.is_date = false;
            remote.end.is_date = false;
        }
    }

    /// The event's own `[start, end)`, or `None` while it is invalid.
    pub fn span(&self) -> Option<Timespan> {
        Timespan::new(self.record.remote.start.utc, self.record.remote.end.utc).ok()
    }

    // CALENDAR:

    pub fn calendar_id(&self) -> i64 {
        self.record.calendar_id
    }

    pub fn set_calendar_id(&mut self, calendar_id: i64) {
        self.record.calendar_id = calendar_id;
    }

    /// Parses the whole string; partial numbers like "7abc" are rejected.
    pub fn set_calendar_id_str(&mut self, value: &str) -> CalSpanResult<()> {
        let calendar_id = value
            .trim()
            .parse::<i64>()
            .map_err(|_| CalSpanError::InvalidCalendarId(value.to_string()))?;
        self.record.calendar_id = calendar_id;
        Ok(())
    }

    // REMOTE FIELDS:

    pub fn title(&self) -> &str {
        &self.record.remote.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.record.remote.title = title.into();
    }

    pub fn location(&self) -> &str {
        &self.record.remote.location
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.record.remote.location = location.into();
    }

    pub fn description(&self) -> &str {
        &self.record.remote.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.record.remote.description = description.into();
    }

    pub fn alarms(&self) -> &[AlarmTrigger] {
        &self.record.remote.alarms
    }

    pub fn set_alarms(&mut self, alarms: Vec<AlarmTrigger>) {
        self.record.remote.alarms = alarms;
    }

    pub fn recurrence(&self) -> Option<&Recurrence> {
        self.record.remote.recurrence.as_ref()
    }

    pub fn set_recurrence(&mut self, recurrence: Option<Recurrence>) {
        self.record.remote.recurrence = recurrence;
    }

    pub fn is_recurring(&self) -> bool {
        self.record.remote.recurrence.is_some()
    }

    // VALIDATION:

    pub fn validation_errors(&self) -> Option<Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.start_date() >= self.end_date() {
            errors.push(ValidationError {
                name: ValidationErrorKind::StartAfterEnd,
            });
        }

        if errors.is_empty() { None } else { Some(errors) }
    }

    /// Applies `attrs` and validates. On failure every change is rolled back.
    pub fn update_attributes(&mut self, attrs: EventAttributes) -> Result<(), Vec<ValidationError>> {
        let snapshot = self.record.clone();

        if let Some(all_day) = attrs.is_all_day {
            self.set_all_day(all_day);
        }
        if let Some(start) = attrs.start_date {
            self.set_start_date(start);
        }
        if let Some(end) = attrs.end_date {
            self.set_end_date(end);
        }
        if let Some(calendar_id) = attrs.calendar_id {
            self.set_calendar_id(calendar_id);
        }
        if let Some(title) = attrs.title {
            self.set_title(title);
        }
        if let Some(location) = attrs.location {
            self.set_location(location);
        }
        if let Some(description) = attrs.description {
            self.set_description(description);
        }
        if let Some(alarms) = attrs.alarms {
            self.set_alarms(alarms);
        }
        if let Some(recurrence) = attrs.recurrence {
            self.set_recurrence(Some(recurrence));
        }

        match self.validation_errors() {
            Some(errors) => {
                self.record = snapshot;
                Err(errors)
            }
            None => Ok(()),
        }
    }
}

pub(crate) fn truncate_to_midnight(dt: &DateTime<Local>) -> DateTime<Local> {
    local_midnight(dt.date_naive()).unwrap_or(*dt)
}
