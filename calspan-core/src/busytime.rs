//! Busytime store.
//!
//! A busytime is one concrete occupied interval of one event occurrence. The
//! store derives them from events (expanding recurrences inside its sync
//! window), keeps their alarms in step, and answers span queries through a
//! cache it owns.
//!
//! ## Span cache
//!
//! The cache holds one contiguous covered span plus every busytime
//! overlapping it. A query inside the covered span is answered from memory.
//! A query overlapping or touching it only scans the part that
//! `covered.trim_overlap(query)` leaves over, then grows the coverage. A
//! disjoint query starts a fresh cache.
//!
//! The cache remembers the database generation it was filled at. Any commit,
//! from this store or anyone else sharing the `Db`, bumps the generation and
//! the next query starts over.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::alarm::{queue_alarms, queue_remove_for_busytime};
use crate::db::{ChangeKind, Collection, Db, Direction, KeyRange, Transaction, record_id};
use crate::error::{CalSpanError, CalSpanResult};
use crate::event::Event;
use crate::recurrence::{SyncWindow, expand};
use crate::timespan::Timespan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Busytime {
    #[serde(rename = "_id")]
    pub id: String,
    pub event_id: String,
    #[serde(default)]
    pub calendar_id: i64,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub is_all_day: bool,
    /// Occurrence start for expanded recurring events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<i64>,
}

impl Busytime {
    pub fn for_occurrence(event: &Event, occurrence: Timespan) -> Self {
        Busytime {
            id: format!("{}-{}", event.id(), occurrence.start()),
            event_id: event.id().to_string(),
            calendar_id: event.calendar_id(),
            start: occurrence.start(),
            end: occurrence.end(),
            is_all_day: event.is_all_day(),
            recurrence_id: event.is_recurring().then_some(occurrence.start()),
        }
    }

    pub fn from_value(value: Value) -> CalSpanResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> CalSpanResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn span(&self) -> Timespan {
        Timespan::between(self.start, self.end)
    }

    pub fn start_date(&self) -> DateTime<Local> {
        to_local(self.start)
    }

    pub fn end_date(&self) -> DateTime<Local> {
        to_local(self.end)
    }
}

fn to_local(ms: i64) -> DateTime<Local> {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(&Local)
}

#[derive(Debug, Default)]
struct SpanCache {
    generation: u64,
    covered: Option<Timespan>,
    records: HashMap<String, Busytime>,
}

impl SpanCache {
    fn reset(&mut self, generation: u64) {
        self.generation = generation;
        self.covered = None;
        self.records.clear();
    }

    fn results(&self, span: &Timespan) -> Vec<Busytime> {
        let mut hits: Vec<Busytime> = self
            .records
            .values()
            .filter(|b| span.overlaps(&b.span()))
            .cloned()
            .collect();
        hits.sort_by(|a, b| (a.start, &a.id).cmp(&(b.start, &b.id)));
        hits
    }
}

const QUERY_PENDING: u8 = 0;
const QUERY_DELIVERED: u8 = 1;
const QUERY_CANCELLED: u8 = 2;

/// Handle to a span query started with [`BusytimeStore::load_span_with`].
pub struct SpanQuery {
    state: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl SpanQuery {
    /// Stops the query. Once this returns, the callback has either already run
    /// or never will. Returns false when the callback had already been handed
    /// the result.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(
                QUERY_PENDING,
                QUERY_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if cancelled {
            self.handle.abort();
        }
        cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the query task to end.
    pub async fn join(self) -> CalSpanResult<()> {
        match self.handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(CalSpanError::Cancelled),
            Err(e) => Err(CalSpanError::Storage(format!("span query failed: {e}"))),
        }
    }
}

#[derive(Clone)]
pub struct BusytimeStore {
    db: Db,
    window: SyncWindow,
    cache: Arc<Mutex<SpanCache>>,
}

impl BusytimeStore {
    pub fn new(db: Db, window: SyncWindow) -> Self {
        BusytimeStore {
            db,
            window,
            cache: Arc::new(Mutex::new(SpanCache::default())),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn window(&self) -> &SyncWindow {
        &self.window
    }

    // CONVERSION:

    /// One busytime for a single event, or one per occurrence inside the sync
    /// window for a recurring one.
    pub fn event_to_records(&self, event: &Event) -> CalSpanResult<Vec<Busytime>> {
        Ok(expand(event, &self.window)?
            .into_iter()
            .map(|occurrence| Busytime::for_occurrence(event, occurrence))
            .collect())
    }

    // WRITES:

    /// Stores one busytime. Without `tx` the write commits on its own.
    pub async fn persist(
        &self,
        busytime: &Busytime,
        tx: Option<&mut Transaction>,
    ) -> CalSpanResult<()> {
        match tx {
            Some(tx) => self.queue_persist(busytime, tx).await,
            None => {
                let mut tx = self.db.transaction();
                self.queue_persist(busytime, &mut tx).await?;
                self.commit(tx).await
            }
        }
    }

    /// Removes a busytime and its alarms. Unknown ids are ignored.
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

    /// Removes every busytime owned by `event_id`, one notification each.
    /// Returns how many were removed.
    pub async fn remove_event(
        &self,
        event_id: &str,
        tx: Option<&mut Transaction>,
    ) -> CalSpanResult<usize> {
        match tx {
            Some(tx) => self.queue_remove_event(event_id, tx).await,
            None => {
                let mut tx = self.db.transaction();
                let removed = self.queue_remove_event(event_id, &mut tx).await?;
                self.commit(tx).await?;
                Ok(removed)
            }
        }
    }

    /// Replaces the busytimes and alarms of `event` with freshly derived ones.
    /// The event itself must already be stored (or queued in `tx`).
    pub async fn sync_event(
        &self,
        event: &Event,
        tx: Option<&mut Transaction>,
    ) -> CalSpanResult<Vec<Busytime>> {
        match tx {
            Some(tx) => self.queue_sync_event(event, tx).await,
            None => {
                let mut tx = self.db.transaction();
                let busytimes = self.queue_sync_event(event, &mut tx).await?;
                self.commit(tx).await?;
                Ok(busytimes)
            }
        }
    }

    async fn queue_persist(&self, busytime: &Busytime, tx: &mut Transaction) -> CalSpanResult<()> {
        if tx.get(Collection::Events, &busytime.event_id).await?.is_none() {
            return Err(CalSpanError::OrphanBusytime(busytime.event_id.clone()));
        }

        let kind = match tx.get(Collection::Busytimes, &busytime.id).await? {
            Some(_) => ChangeKind::Change,
            None => ChangeKind::Add,
        };

        tx.put(Collection::Busytimes, busytime.id.clone(), busytime.to_value()?);
        tx.notify(Collection::Busytimes, kind, busytime.id.clone());
        Ok(())
    }

    async fn queue_remove(&self, id: &str, tx: &mut Transaction) -> CalSpanResult<bool> {
        if tx.get(Collection::Busytimes, id).await?.is_none() {
            return Ok(false);
        }

        queue_remove_for_busytime(tx, id).await?;
        tx.delete(Collection::Busytimes, id);
        tx.notify(Collection::Busytimes, ChangeKind::Remove, id);
        Ok(true)
    }

    async fn queue_remove_event(&self, event_id: &str, tx: &mut Transaction) -> CalSpanResult<usize> {
        let owned = tx
            .scan(
                Collection::Busytimes,
                "eventId",
                &KeyRange::only(event_id),
                Direction::Next,
            )
            .await?;

        let ids: Vec<String> = owned
            .iter()
            .filter_map(record_id)
            .map(str::to_string)
            .collect();

        for id in &ids {
            self.queue_remove(id, tx).await?;
        }

        debug!(event_id, removed = ids.len(), "queued busytime removal");
        Ok(ids.len())
    }

    async fn queue_sync_event(&self, event: &Event, tx: &mut Transaction) -> CalSpanResult<Vec<Busytime>> {
        let busytimes = self.event_to_records(event)?;

        self.queue_remove_event(event.id(), tx).await?;
        for busytime in &busytimes {
            self.queue_persist(busytime, tx).await?;
            queue_alarms(tx, busytime, event.alarms())?;
        }

        debug!(
            event_id = event.id(),
            busytimes = busytimes.len(),
            "derived busytimes"
        );
        Ok(busytimes)
    }

    async fn commit(&self, tx: Transaction) -> CalSpanResult<()> {
        tx.commit().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Drops everything cached.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        let generation = self.db.generation();
        cache.reset(generation);
    }

    // READS:

    pub async fn get(&self, id: &str) -> CalSpanResult<Option<Busytime>> {
        self.db
            .get(Collection::Busytimes, id)
            .await?
            .map(Busytime::from_value)
            .transpose()
    }

    pub async fn count(&self) -> CalSpanResult<usize> {
        self.db.count(Collection::Busytimes).await
    }

    /// Busytimes overlapping `span`, ascending by start.
    pub async fn load_span(&self, span: Timespan) -> CalSpanResult<Vec<Busytime>> {
        let mut cache = self.cache.lock().await;

        let generation = self.db.generation();
        if cache.generation != generation {
            cache.reset(generation);
        }

        let missing = match cache.covered {
            Some(covered) if covered.contains(span) => None,
            Some(covered) if covered.is_adjacent_or_overlapping(&span) => {
                Some(covered.trim_overlap(&span).unwrap_or(span))
            }
            Some(_) => {
                cache.reset(generation);
                Some(span)
            }
            None => Some(span),
        };

        match missing {
            None => debug!(%span, "span cache hit"),
            Some(missing) => {
                // Widen by the millisecond trim_overlap cuts off each side.
                let scan = Timespan::between(missing.start() - 1, missing.end() + 1);
                debug!(%span, %scan, "span cache miss");

                for busytime in self.scan_span(scan).await? {
                    cache.records.insert(busytime.id.clone(), busytime);
                }
                cache.covered = Some(match cache.covered {
                    Some(covered) => covered.union(&span),
                    None => span,
                });
            }
        }

        Ok(cache.results(&span))
    }

    /// Runs [`load_span`](Self::load_span) in the background and hands the
    /// result to `callback`, unless the query is cancelled first.
    pub fn load_span_with<F>(&self, span: Timespan, callback: F) -> SpanQuery
    where
        F: FnOnce(CalSpanResult<Vec<Busytime>>) + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(QUERY_PENDING));
        let task_state = state.clone();
        let store = self.clone();

        let handle = tokio::spawn(async move {
            let result = store.load_span(span).await;
            let deliver = task_state
                .compare_exchange(
                    QUERY_PENDING,
                    QUERY_DELIVERED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if deliver {
                callback(result);
            }
        });

        SpanQuery { state, handle }
    }

    async fn scan_span(&self, span: Timespan) -> CalSpanResult<Vec<Busytime>> {
        let records = self
            .db
            .scan(
                Collection::Busytimes,
                "end",
                &KeyRange::lower_bound(span.start(), true),
                Direction::Next,
            )
            .await?;

        let mut busytimes = Vec::new();
        for record in records {
            let busytime = Busytime::from_value(record)?;
            if span.overlaps(&busytime.span()) {
                busytimes.push(busytime);
            }
        }
        Ok(busytimes)
    }
}
