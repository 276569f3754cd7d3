//! In-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Backend, Collection, Direction, IndexKey, KeyRange, WriteOp};
use crate::error::{CalSpanError, CalSpanResult};

/// Records of one collection, keyed by id.
pub(crate) type Table = BTreeMap<String, Value>;

/// All collections of a database.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Tables {
    tables: HashMap<Collection, Table>,
}

impl Tables {
    pub(crate) fn get(&self, collection: Collection, id: &str) -> Option<Value> {
        self.tables.get(&collection)?.get(id).cloned()
    }

    pub(crate) fn count(&self, collection: Collection) -> usize {
        self.tables.get(&collection).map_or(0, BTreeMap::len)
    }

    pub(crate) fn cursor(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
        visit: &mut dyn FnMut(&Value) -> ControlFlow<()>,
    ) {
        let Some(table) = self.tables.get(&collection) else {
            return;
        };

        let mut matches: Vec<(IndexKey, &String, &Value)> = table
            .iter()
            .filter_map(|(id, record)| {
                let key = IndexKey::of(record, index)?;
                range.contains(&key).then_some((key, id, record))
            })
            .collect();

        matches.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        if direction == Direction::Prev {
            matches.reverse();
        }

        for (_, _, record) in matches {
            if visit(record).is_break() {
                break;
            }
        }
    }

    pub(crate) fn apply(&mut self, ops: &[WriteOp]) {
        for op in ops {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    value,
                } => {
                    self.tables
                        .entry(*collection)
                        .or_default()
                        .insert(id.clone(), value.clone());
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(table) = self.tables.get_mut(collection) {
                        table.remove(id);
                    }
                }
            }
        }
    }
}

/// Backend keeping everything in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn poisoned<T>(_: T) -> CalSpanError {
    CalSpanError::Storage("storage lock poisoned".to_string())
}

impl Backend for MemoryBackend {
    fn get(&self, collection: Collection, id: &str) -> CalSpanResult<Option<Value>> {
        Ok(self.tables.read().map_err(poisoned)?.get(collection, id))
    }

    fn count(&self, collection: Collection) -> CalSpanResult<usize> {
        Ok(self.tables.read().map_err(poisoned)?.count(collection))
    }

    fn open_cursor(
        &self,
        collection: Collection,
        index: &str,
        range: &KeyRange,
        direction: Direction,
        visit: &mut dyn FnMut(&Value) -> ControlFlow<()>,
    ) -> CalSpanResult<()> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables.cursor(collection, index, range, direction, visit);
        Ok(())
    }

    fn commit(&self, ops: &[WriteOp]) -> CalSpanResult<()> {
        self.tables.write().map_err(poisoned)?.apply(ops);
        Ok(())
    }
}
