//! Persistence seam for the stores.
//!
//! The stores never touch storage directly. They go through a [`Db`] handle
//! wrapping a [`Backend`] (the key-value collaborator), and group their writes
//! in a [`Transaction`] that commits atomically or not at all.
//!
//! Records are plain JSON objects keyed by their `_id` field. Any top-level
//! field can be used as a cursor index.

mod file;
mod memory;
mod transaction;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use transaction::Transaction;

use std::fmt;
use std::ops::{Bound, ControlFlow};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::constants::NOTIFICATION_CAPACITY;
use crate::error::CalSpanResult;

/// Named record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Events,
    Busytimes,
    Alarms,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Events, Collection::Busytimes, Collection::Alarms];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Busytimes => "busytimes",
            Collection::Alarms => "alarms",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Value of an indexed field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Int(i64),
    Text(String),
}

impl IndexKey {
    /// Reads `field` from `record`. Records without a usable value are not
    /// part of that index.
    pub fn of(record: &Value, field: &str) -> Option<IndexKey> {
        match record.get(field)? {
            Value::Number(n) => n.as_i64().map(IndexKey::Int),
            Value::String(s) => Some(IndexKey::Text(s.clone())),
            Value::Bool(b) => Some(IndexKey::Int(i64::from(*b))),
            _ => None,
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::Int(v)
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::Text(v.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        IndexKey::Text(v)
    }
}

/// Bounds on an index, in the manner of an IndexedDB key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl KeyRange {
    pub fn all() -> Self {
        KeyRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn only(key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        KeyRange {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys above `key`; `open` excludes `key` itself.
    pub fn lower_bound(key: impl Into<IndexKey>, open: bool) -> Self {
        KeyRange {
            lower: bound(key.into(), open),
            upper: Bound::Unbounded,
        }
    }

    /// Keys below `key`; `open` excludes `key` itself.
    pub fn upper_bound(key: impl Into<IndexKey>, open: bool) -> Self {
        KeyRange {
            lower: Bound::Unbounded,
            upper: bound(key.into(), open),
        }
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }
}

fn bound(key: IndexKey, open: bool) -> Bound<IndexKey> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

/// A single queued write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        collection: Collection,
        id: String,
        value: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Put { collection, .. } | WriteOp::Delete { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Put { id, .. } | WriteOp::Delete { id, .. } => id,
        }
    }
}

/// The key-value collaborator behind a [`Db`].
///
/// `commit` must apply the whole batch or none of it.
pub trait Backend: Send + Sync {
    fn get(&self, collection: Collection, id: &str) -> CalSpanResult<Option<Value>>;

    fn count(&self, collection: Collection) -> CalSpanResult<usize>;

    /// Visits records whose `index` field falls in `range`, ordered by that
    /// field (ties by id). `visit` returns `ControlFlow::Break` to stop early.
    fn open_cursor(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
        visit: &mut dyn FnMut(&Value) -> ControlFlow<()>,
    ) -> CalSpanResult<()>;

    fn commit(&self, ops: &[WriteOp]) -> CalSpanResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

/// Emitted once the transaction carrying the write has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
}

/// Shared handle over a backend. Cloning is cheap.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

struct DbInner {
    backend: Box<dyn Backend>,
    generation: AtomicU64,
    notifier: broadcast::Sender<Notification>,
}

impl Db {
    pub fn new(backend: impl Backend + 'static) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Db {
            inner: Arc::new(DbInner {
                backend: Box::new(backend),
                generation: AtomicU64::new(0),
                notifier,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Opens (or creates) a file-backed database in `dir`.
    pub fn open(dir: &Path) -> CalSpanResult<Self> {
        Ok(Self::new(FileBackend::open(dir)?))
    }

    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Number of non-empty commits so far. Caches compare against it.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub async fn get(&self, collection: Collection, id: &str) -> CalSpanResult<Option<Value>> {
        tokio::task::yield_now().await;
        self.inner.backend.get(collection, id)
    }

    pub async fn count(&self, collection: Collection) -> CalSpanResult<usize> {
        tokio::task::yield_now().await;
        self.inner.backend.count(collection)
    }

    pub async fn scan(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
    ) -> CalSpanResult<Vec<Value>> {
        tokio::task::yield_now().await;

        let mut records = Vec::new();
        self.inner
            .backend
            .open_cursor(collection, index, range, direction, &mut |record| {
                records.push(record.clone());
                ControlFlow::Continue(())
            })?;
        Ok(records)
    }

    fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    fn publish(&self, notification: Notification) {
        // No receivers is fine
        let _ = self.inner.notifier.send(notification);
    }

    fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// `_id` of a stored record.
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("_id").and_then(Value::as_str)
}
