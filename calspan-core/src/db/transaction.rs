//! Scoped write batches.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::db::{
    ChangeKind, Collection, Db, Direction, IndexKey, KeyRange, Notification, WriteOp, record_id,
};
use crate::error::{CalSpanError, CalSpanResult};

/// Writes queued against a [`Db`], applied together by [`Transaction::commit`].
///
/// Reads through the transaction see its own pending writes. Dropping a
/// transaction without committing discards everything it queued.
pub struct Transaction {
    db: Db,
    ops: Vec<WriteOp>,
    notifications: Vec<Notification>,
}

impl Transaction {
    pub(crate) fn new(db: Db) -> Self {
        Transaction {
            db,
            ops: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn pending(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn put(&mut self, collection: Collection, id: impl Into<String>, value: Value) {
        self.ops.push(WriteOp::Put {
            collection,
            id: id.into(),
            value,
        });
    }

    pub fn delete(&mut self, collection: Collection, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.into(),
        });
    }

    /// Queues a notification to be published after a successful commit.
    pub fn notify(&mut self, collection: Collection, kind: ChangeKind, id: impl Into<String>) {
        self.notifications.push(Notification {
            collection,
            kind,
            id: id.into(),
        });
    }

    /// Latest pending write for the record, if any.
    fn pending_for(&self, collection: Collection, id: &str) -> Option<&WriteOp> {
        self.ops
            .iter()
            .rev()
            .find(|op| op.collection() == collection && op.id() == id)
    }

    pub async fn get(&self, collection: Collection, id: &str) -> CalSpanResult<Option<Value>> {
        match self.pending_for(collection, id) {
            Some(WriteOp::Put { value, .. }) => Ok(Some(value.clone())),
            Some(WriteOp::Delete { .. }) => Ok(None),
            None => self.db.get(collection, id).await,
        }
    }

    /// Like [`Db::scan`], with this transaction's pending writes applied on top.
    pub async fn scan(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
    ) -> CalSpanResult<Vec<Value>> {
        let committed = self.db.scan(collection, index, range, direction).await?;

        let mut by_id: BTreeMap<String, Value> = committed
            .into_iter()
            .filter_map(|record| Some((record_id(&record)?.to_string(), record)))
            .collect();

        for op in self.ops.iter().filter(|op| op.collection() == collection) {
            match op {
                WriteOp::Put { id, value, .. } => {
                    let in_range = IndexKey::of(value, index).is_some_and(|k| range.contains(&k));
                    if in_range {
                        by_id.insert(id.clone(), value.clone());
                    } else {
                        by_id.remove(id);
                    }
                }
                WriteOp::Delete { id, .. } => {
                    by_id.remove(id);
                }
            }
        }

        let mut records: Vec<(IndexKey, String, Value)> = by_id
            .into_iter()
            .filter_map(|(id, record)| Some((IndexKey::of(&record, index)?, id, record)))
            .collect();
        records.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        if direction == Direction::Prev {
            records.reverse();
        }

        Ok(records.into_iter().map(|(_, _, record)| record).collect())
    }

    /// Applies every queued write atomically, then publishes notifications.
    ///
    /// The backend commit runs on the blocking pool since file backends do
    /// synchronous IO.
    pub async fn commit(mut self) -> CalSpanResult<()> {
        let ops = std::mem::take(&mut self.ops);
        let notifications = std::mem::take(&mut self.notifications);

        if !ops.is_empty() {
            let writes = ops.len();
            let db = self.db.clone();
            tokio::task::spawn_blocking(move || db.backend().commit(&ops))
                .await
                .map_err(|e| CalSpanError::Storage(format!("commit task failed: {e}")))??;

            self.db.bump_generation();
            debug!(writes, generation = self.db.generation(), "committed transaction");
        }

        for notification in notifications {
            self.db.publish(notification);
        }

        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.ops.is_empty() {
            debug!(writes = self.ops.len(), "discarding uncommitted transaction");
        }
    }
}
