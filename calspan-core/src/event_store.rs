//! Event store.
//!
//! Source of events for the busytime store: every write of an event
//! re-derives its busytimes and alarms in the same transaction, and every
//! removal cascades down to them.

use tracing::{debug, info};

use crate::busytime::{Busytime, BusytimeStore};
use crate::db::{ChangeKind, Collection, Db, Direction, KeyRange, Transaction, record_id};
use crate::error::{CalSpanError, CalSpanResult};
use crate::event::{Event, EventRecord};

#[derive(Clone)]
pub struct EventStore {
    db: Db,
    busytimes: BusytimeStore,
}

impl EventStore {
    pub fn new(busytimes: BusytimeStore) -> Self {
        EventStore {
            db: busytimes.db().clone(),
            busytimes,
        }
    }

    pub fn busytimes(&self) -> &BusytimeStore {
        &self.busytimes
    }

    /// Validates and stores `event`, replacing its busytimes. Returns the
    /// busytimes derived for it.
    pub async fn persist(
        &self,
        event: &Event,
        tx: Option<&mut Transaction>,
    ) -> CalSpanResult<Vec<Busytime>> {
        match tx {
            Some(tx) => self.queue_persist(event, tx).await,
            None => {
                let mut tx = self.db.transaction();
                let busytimes = self.queue_persist(event, &mut tx).await?;
                self.commit(tx).await?;
                Ok(busytimes)
            }
        }
    }

    /// Re-derives the busytimes of every stored recurring event against the
    /// current sync window. Returns how many events were re-expanded.
    pub async fn resync(&self, tx: Option<&mut Transaction>) -> CalSpanResult<usize> {
        match tx {
            Some(tx) => self.queue_resync(tx).await,
            None => {
                let mut tx = self.db.transaction();
                let synced = self.queue_resync(&mut tx).await?;
                self.commit(tx).await?;
                Ok(synced)
            }
        }
    }

    /// Removes the event with its busytimes and alarms. Unknown ids are ignored.
    pub async fn remove(&self, id: &str, tx: Option<&mut Transaction>) -> CalSpanResult<()> {
        match tx {
            Some(tx) => self.queue_remove(id, tx).await.map(|_| ()),
            None => {
                let mut tx = self.db.transaction();
                self.queue_remove(id, &mut tx).await?;
                self.commit(tx).await
            }
        }
    }

    /// Removes every event of a calendar, with the full cascade. Returns the
    /// number of events removed.
    pub async fn remove_calendar(
        &self,
        calendar_id: i64,
        tx: Option<&mut Transaction>,
    ) -> CalSpanResult<usize> {
        match tx {
            Some(tx) => self.queue_remove_calendar(calendar_id, tx).await,
            None => {
                let mut tx = self.db.transaction();
                let removed = self.queue_remove_calendar(calendar_id, &mut tx).await?;
                self.commit(tx).await?;
                Ok(removed)
            }
        }
    }

    pub async fn get(&self, id: &str) -> CalSpanResult<Option<Event>> {
        match self.db.get(Collection::Events, id).await? {
            Some(value) => {
                let record: EventRecord = serde_json::from_value(value)?;
                Ok(Some(Event::from_record(record)))
            }
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> CalSpanResult<usize> {
        self.db.count(Collection::Events).await
    }

    pub async fn for_calendar(&self, calendar_id: i64) -> CalSpanResult<Vec<Event>> {
        self.db
            .scan(
                Collection::Events,
                "calendarId",
                &KeyRange::only(calendar_id),
                Direction::Next,
            )
            .await?
            .into_iter()
            .map(|value| Ok(Event::from_record(serde_json::from_value(value)?)))
            .collect()
    }

    async fn queue_persist(&self, event: &Event, tx: &mut Transaction) -> CalSpanResult<Vec<Busytime>> {
        if event.id().is_empty() {
            return Err(CalSpanError::MissingEventId);
        }
        if let Some(errors) = event.validation_errors() {
            return Err(CalSpanError::Validation(errors));
        }

        let kind = match tx.get(Collection::Events, event.id()).await? {
            Some(_) => ChangeKind::Change,
            None => ChangeKind::Add,
        };

        tx.put(
            Collection::Events,
            event.id(),
            serde_json::to_value(event.record())?,
        );
        tx.notify(Collection::Events, kind, event.id());

        self.busytimes.sync_event(event, Some(&mut *tx)).await
    }

    async fn queue_resync(&self, tx: &mut Transaction) -> CalSpanResult<usize> {
        let records = tx
            .scan(Collection::Events, "_id", &KeyRange::all(), Direction::Next)
            .await?;

        let mut synced = 0;
        for value in records {
            let event = Event::from_record(serde_json::from_value(value)?);
            if !event.is_recurring() {
                continue;
            }
            self.busytimes.sync_event(&event, Some(&mut *tx)).await?;
            synced += 1;
        }

        debug!(synced, "re-expanded recurring events");
        Ok(synced)
    }

    async fn queue_remove(&self, id: &str, tx: &mut Transaction) -> CalSpanResult<bool> {
        if tx.get(Collection::Events, id).await?.is_none() {
            return Ok(false);
        }

        self.busytimes.remove_event(id, Some(&mut *tx)).await?;
        tx.delete(Collection::Events, id);
        tx.notify(Collection::Events, ChangeKind::Remove, id);
        Ok(true)
    }

    async fn queue_remove_calendar(&self, calendar_id: i64, tx: &mut Transaction) -> CalSpanResult<usize> {
        let events = tx
            .scan(
                Collection::Events,
                "calendarId",
                &KeyRange::only(calendar_id),
                Direction::Next,
            )
            .await?;

        let ids: Vec<String> = events
            .iter()
            .filter_map(record_id)
            .map(str::to_string)
            .collect();

        for id in &ids {
            self.queue_remove(id, tx).await?;
        }

        info!(calendar_id, events = ids.len(), "removing calendar events");
        Ok(ids.len())
    }

    async fn commit(&self, tx: Transaction) -> CalSpanResult<()> {
        tx.commit().await?;
        self.busytimes.invalidate().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AlarmTrigger, EventAttributes, ValidationErrorKind};
    use crate::recurrence::SyncWindow;
    use crate::timespan::Timespan;
    use chrono::{Local, TimeZone};

    fn store() -> EventStore {
        let span = Timespan::new(0, 4_102_444_800_000).unwrap();
        EventStore::new(BusytimeStore::new(Db::in_memory(), SyncWindow::new(span, 365)))
    }

    fn meeting(id: &str, calendar_id: i64, day: u32) -> Event {
        let mut event = Event::new();
        event.set_id(id);
        event
            .update_attributes(EventAttributes {
                calendar_id: Some(calendar_id),
                title: Some(format!("meeting {id}")),
                start_date: Some(Local.with_ymd_and_hms(2012, 2, day, 10, 0, 0).unwrap()),
                end_date: Some(Local.with_ymd_and_hms(2012, 2, day, 11, 0, 0).unwrap()),
                alarms: Some(vec![AlarmTrigger::display(-600)]),
                ..Default::default()
            })
            .unwrap();
        event
    }

    #[tokio::test]
    async fn test_persist_derives_busytimes_and_alarms() {
        let store = store();
        store.persist(&meeting("a", 1, 5), None).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.busytimes().count().await.unwrap(), 1);
        assert_eq!(store.db.count(Collection::Alarms).await.unwrap(), 1);

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.title(), "meeting a");
    }

    #[tokio::test]
    async fn test_persist_rejects_invalid_event() {
        let store = store();
        let event = Event::new();

        let err = store.persist(&event, None).await.unwrap_err();
        match err {
            CalSpanError::Validation(errors) => {
                assert_eq!(errors[0].name, ValidationErrorKind::StartAfterEnd)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_rejects_missing_id() {
        let store = store();
        let mut event = meeting("a", 1, 5);
        event.set_id("");

        assert!(matches!(
            store.persist(&event, None).await,
            Err(CalSpanError::MissingEventId)
        ));
    }

    #[tokio::test]
    async fn test_remove_calendar_cascades() {
        let store = store();
        store.persist(&meeting("a", 1, 5), None).await.unwrap();
        store.persist(&meeting("b", 1, 6), None).await.unwrap();
        store.persist(&meeting("c", 2, 7), None).await.unwrap();

        let removed = store.remove_calendar(1, None).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.busytimes().count().await.unwrap(), 1);
        assert_eq!(store.db.count(Collection::Alarms).await.unwrap(), 1);
        assert_eq!(store.for_calendar(2).await.unwrap().len(), 1);
        assert!(store.for_calendar(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_rejects_out_of_range_alarm() {
        let store = store();
        let mut event = meeting("a", 1, 5);
        event.set_alarms(vec![AlarmTrigger::display(i64::MAX)]);

        let err = store.persist(&event, None).await.unwrap_err();

        assert!(matches!(err, CalSpanError::AlarmOutOfRange(i64::MAX)));
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.busytimes().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_returns_derived_busytimes() {
        let store = store();
        let busytimes = store.persist(&meeting("a", 1, 5), None).await.unwrap();

        assert_eq!(busytimes.len(), 1);
        assert_eq!(busytimes[0].event_id, "a");
    }

    #[tokio::test]
    async fn test_event_outside_window_still_has_busytime() {
        let db = Db::in_memory();
        let window = SyncWindow::new(
            Timespan::from_dates(
                &Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                &Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            )
            .unwrap(),
            365,
        );
        let store = EventStore::new(BusytimeStore::new(db, window));

        store.persist(&meeting("far", 1, 5), None).await.unwrap();

        assert_eq!(store.busytimes().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resync_follows_moving_window() {
        let db = Db::in_memory();
        let window_in = |y: i32| {
            SyncWindow::new(
                Timespan::from_dates(
                    &Local.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap(),
                    &Local.with_ymd_and_hms(y, 1, 11, 0, 0, 0).unwrap(),
                )
                .unwrap(),
                365,
            )
        };

        let mut daily = Event::new();
        daily.set_id("daily");
        daily
            .update_attributes(EventAttributes {
                calendar_id: Some(1),
                start_date: Some(Local.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
                end_date: Some(Local.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
                recurrence: Some(crate::event::Recurrence {
                    rrule: "FREQ=DAILY".to_string(),
                    exdates: vec![],
                }),
                ..Default::default()
            })
            .unwrap();

        let first = EventStore::new(BusytimeStore::new(db.clone(), window_in(2024)));
        first.persist(&daily, None).await.unwrap();
        first.persist(&meeting("single", 1, 5), None).await.unwrap();
        assert_eq!(first.busytimes().count().await.unwrap(), 11);

        let later = EventStore::new(BusytimeStore::new(db.clone(), window_in(2025)));
        let span_2025 = *later.busytimes().window();
        assert!(later.busytimes().load_span(span_2025.span).await.unwrap().is_empty());

        let synced = later.resync(None).await.unwrap();

        assert_eq!(synced, 1);
        let found = later.busytimes().load_span(span_2025.span).await.unwrap();
        assert_eq!(found.len(), 10);
        assert!(found.iter().all(|b| b.event_id == "daily"));
        // 10 daily occurrences plus the untouched single meeting
        assert_eq!(later.busytimes().count().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_shared_transaction_commits_together() {
        let store = store();
        let mut tx = store.db.transaction();

        store.persist(&meeting("a", 1, 5), Some(&mut tx)).await.unwrap();
        store.remove("a", Some(&mut tx)).await.unwrap();
        store.persist(&meeting("b", 1, 6), Some(&mut tx)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        tx.commit().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.busytimes().count().await.unwrap(), 1);
        assert!(store.get("a").await.unwrap().is_none());
        let alarms = crate::alarm::AlarmStore::new(store.db.clone());
        assert!(alarms.for_event("a").await.unwrap().is_empty());
        assert_eq!(alarms.for_event("b").await.unwrap().len(), 1);
    }
}
