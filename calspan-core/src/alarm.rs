//! Alarms derived from busytimes.
//!
//! Each busytime gets one alarm per trigger on its event. Alarms are only
//! ever written as part of a busytime write and removed with their busytime.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::busytime::Busytime;
use crate::db::{ChangeKind, Collection, Db, Direction, KeyRange, Transaction, record_id};
use crate::error::{CalSpanError, CalSpanResult};
use crate::event::AlarmTrigger;
use crate::timespan::Timespan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    #[serde(rename = "_id")]
    pub id: String,
    pub busytime_id: String,
    pub event_id: String,
    /// Absolute fire time in milliseconds.
    pub trigger: i64,
    pub action: String,
}

impl Alarm {
    /// Fails with `AlarmOutOfRange` when an offset does not land on a
    /// representable instant.
    pub fn for_busytime(busytime: &Busytime, triggers: &[AlarmTrigger]) -> CalSpanResult<Vec<Alarm>> {
        triggers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let trigger = t
                    .trigger
                    .checked_mul(1000)
                    .and_then(|offset| busytime.start.checked_add(offset))
                    .ok_or(CalSpanError::AlarmOutOfRange(t.trigger))?;

                Ok(Alarm {
                    id: format!("{}-{}", busytime.id, i),
                    busytime_id: busytime.id.clone(),
                    event_id: busytime.event_id.clone(),
                    trigger,
                    action: t.action.clone(),
                })
            })
            .collect()
    }

    pub fn trigger_date(&self) -> DateTime<Local> {
        DateTime::from_timestamp_millis(self.trigger)
            .unwrap_or_default()
            .with_timezone(&Local)
    }

    pub fn from_value(value: Value) -> CalSpanResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Queues the alarms of `busytime`.
pub(crate) fn queue_alarms(
    tx: &mut Transaction,
    busytime: &Busytime,
    triggers: &[AlarmTrigger],
) -> CalSpanResult<()> {
    for alarm in Alarm::for_busytime(busytime, triggers)? {
        let value = serde_json::to_value(&alarm)?;
        tx.put(Collection::Alarms, alarm.id.clone(), value);
        tx.notify(Collection::Alarms, ChangeKind::Add, alarm.id);
    }
    Ok(())
}

/// Queues removal of every alarm pointing at `busytime_id`.
pub(crate) async fn queue_remove_for_busytime(
    tx: &mut Transaction,
    busytime_id: &str,
) -> CalSpanResult<usize> {
    let alarms = tx
        .scan(
            Collection::Alarms,
            "busytimeId",
            &KeyRange::only(busytime_id),
            Direction::Next,
        )
        .await?;

    let ids: Vec<String> = alarms
        .iter()
        .filter_map(record_id)
        .map(str::to_string)
        .collect();

    for id in &ids {
        tx.delete(Collection::Alarms, id.clone());
        tx.notify(Collection::Alarms, ChangeKind::Remove, id.clone());
    }

    Ok(ids.len())
}

/// Read side of the alarms collection.
#[derive(Clone)]
pub struct AlarmStore {
    db: Db,
}

impl AlarmStore {
    pub fn new(db: Db) -> Self {
        AlarmStore { db }
    }

    pub async fn for_busytime(&self, busytime_id: &str) -> CalSpanResult<Vec<Alarm>> {
        self.by_index("busytimeId", KeyRange::only(busytime_id)).await
    }

    pub async fn for_event(&self, event_id: &str) -> CalSpanResult<Vec<Alarm>> {
        self.by_index("eventId", KeyRange::only(event_id)).await
    }

    pub async fn count(&self) -> CalSpanResult<usize> {
        self.db.count(Collection::Alarms).await
    }

    /// Alarms firing inside `span` (end inclusive), ascending by trigger.
    pub async fn load_triggers(&self, span: Timespan) -> CalSpanResult<Vec<Alarm>> {
        let range = KeyRange {
            lower: std::ops::Bound::Included(span.start().into()),
            upper: std::ops::Bound::Included(span.end().into()),
        };
        self.by_index("trigger", range).await
    }

    async fn by_index(&self, index: &str, range: KeyRange) -> CalSpanResult<Vec<Alarm>> {
        self.db
            .scan(Collection::Alarms, index, &range, Direction::Next)
            .await?
            .into_iter()
            .map(Alarm::from_value)
            .collect()
    }
}
