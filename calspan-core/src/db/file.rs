//! JSON file backend.
//!
//! The whole database lives in one snapshot file, `<dir>/calspan.json`, an
//! object of collections keyed by record id. A commit writes the new snapshot
//! to a temp file and renames it into place, so a reader of the directory
//! sees either the whole batch or none of it. The in-memory copy is only
//! swapped once the rename succeeded.
//!
//! Every commit rewrites the full snapshot and does blocking file IO; it is
//! meant for personal-sized stores. `Transaction::commit` runs it on the
//! blocking pool.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use tracing::{debug, warn};

use crate::db::memory::{Tables, poisoned};
use crate::db::{Backend, Collection, Direction, KeyRange, WriteOp};
use crate::error::CalSpanResult;

static SNAPSHOT_FILE: &str = "calspan.json";

#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    tables: RwLock<Tables>,
}

impl FileBackend {
    pub fn open(dir: &Path) -> CalSpanResult<Self> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(SNAPSHOT_FILE);
        let tables = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Tables::default()
        };

        debug!(dir = %dir.display(), "opened file store");

        Ok(FileBackend {
            dir: dir.to_path_buf(),
            tables: RwLock::new(tables),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_snapshot(&self, tables: &Tables) -> CalSpanResult<()> {
        let path = self.dir.join(SNAPSHOT_FILE);
        let temp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(tables)?;
        let written = std::fs::write(&temp, content).and_then(|()| std::fs::rename(&temp, &path));

        if let Err(e) = written {
            if temp.is_file() {
                let _ = std::fs::remove_file(&temp);
            }
            warn!(path = %path.display(), error = %e, "snapshot write failed");
            return Err(e.into());
        }
        Ok(())
    }
}

impl Backend for FileBackend {
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
        let mut tables = self.tables.write().map_err(poisoned)?;

        let mut staged = tables.clone();
        staged.apply(ops);

        self.write_snapshot(&staged)?;
        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(collection: Collection, id: &str, value: Value) -> WriteOp {
        WriteOp::Put {
            collection,
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .commit(&[put(
                Collection::Events,
                "e1",
                json!({ "_id": "e1", "calendarId": 2 }),
            )])
            .unwrap();
        assert!(dir.path().join("calspan.json").exists());
        assert!(!dir.path().join("calspan.json.tmp").exists());

        let reopened = FileBackend::open(dir.path()).unwrap();
        let record = reopened.get(Collection::Events, "e1").unwrap().unwrap();
        assert_eq!(record["calendarId"], 2);
        assert_eq!(reopened.count(Collection::Events).unwrap(), 1);
        assert_eq!(reopened.count(Collection::Busytimes).unwrap(), 0);
    }

    #[test]
    fn test_failed_commit_is_invisible_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .commit(&[put(Collection::Events, "e1", json!({ "_id": "e1" }))])
            .unwrap();

        // A directory where the temp file should go makes the write fail
        std::fs::create_dir_all(dir.path().join("calspan.json.tmp")).unwrap();

        let result = backend.commit(&[
            put(Collection::Events, "e2", json!({ "_id": "e2" })),
            put(
                Collection::Busytimes,
                "e2-0",
                json!({ "_id": "e2-0", "eventId": "e2" }),
            ),
        ]);
        assert!(result.is_err());
        assert_eq!(backend.count(Collection::Events).unwrap(), 1);
        assert_eq!(backend.count(Collection::Busytimes).unwrap(), 0);

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.count(Collection::Events).unwrap(), 1);
        assert!(reopened.get(Collection::Events, "e2").unwrap().is_none());
        assert_eq!(reopened.count(Collection::Busytimes).unwrap(), 0);
    }
}
