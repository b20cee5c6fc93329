//! In-memory project store with a naive persisting option.
//!
//! The store maps project IDs to entities (configuration plus mutable
//! status metadata) and survives daemon restarts through a single
//! append-overwrite database file. The on-disk format is line-oriented,
//! each line being `<id>#<json-entity>`; a corrupt line fails the whole
//! load.
//!
//! Every mutation re-serialises the whole map into a buffer which is then
//! swapped in atomically (open with truncate, copy, fsync); last writer
//! wins, no transactions. The daemon additionally flushes periodically in
//! the background.

pub mod error;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use hoi_core::meta::{Meta, Status};
use hoi_core::project;

pub use error::StoreError;
use error::io_err;

/// A stored project: its canonical configuration plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub project: project::Config,
    pub meta: Meta,
}

/// Persistent keyed store of project configurations. Concurrent access is
/// guarded by a single reader-writer lock; values are held by value so no
/// data can be modified outside the lock.
pub struct Store {
    file: PathBuf,
    data: RwLock<HashMap<String, Entity>>,
}

impl Store {
    pub fn new(file: impl Into<PathBuf>) -> Store {
        Store {
            file: file.into(),
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Loads database file contents into memory. No open handle is kept on
    /// the file. A missing file is an empty store.
    pub fn load(&self) -> Result<(), StoreError> {
        if !self.file.exists() {
            return Ok(()); // nothing to do
        }
        tracing::info!("loading db file: {}", self.file.display());

        let contents = std::fs::read_to_string(&self.file).map_err(|e| io_err(&self.file, e))?;
        let mut data = HashMap::new();

        for (number, line) in contents.lines().enumerate() {
            let Some((id, json)) = line.split_once('#') else {
                return Err(StoreError::Corrupt {
                    path: self.file.clone(),
                    line: number + 1,
                });
            };
            let entity: Entity = serde_json::from_str(json).map_err(|source| {
                StoreError::Json {
                    path: self.file.clone(),
                    line: number + 1,
                    source,
                }
            })?;
            data.insert(id.to_string(), entity);
        }

        *self.write_lock() = data;
        Ok(())
    }

    /// Persists data into the database file: the whole map is serialised to
    /// a buffer under the read lock, then swapped in atomically.
    pub fn persist(&self) -> Result<(), StoreError> {
        let buf = {
            let data = self.read_lock();
            let mut buf = String::new();
            for (id, entity) in data.iter() {
                let json = serde_json::to_string(entity).map_err(|source| StoreError::Json {
                    path: self.file.clone(),
                    line: 0,
                    source,
                })?;
                buf.push_str(id);
                buf.push('#');
                buf.push_str(&json);
                buf.push('\n');
            }
            buf
        };

        let mut fh = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.file)
            .map_err(|e| io_err(&self.file, e))?;
        fh.write_all(buf.as_bytes())
            .map_err(|e| io_err(&self.file, e))?;
        fh.sync_all().map_err(|e| io_err(&self.file, e))
    }

    /// Flushes one last time; the caller must have stopped the periodic
    /// flusher before.
    pub fn close(&self) -> Result<(), StoreError> {
        self.persist()
    }

    pub fn has(&self, id: &str) -> bool {
        self.read_lock().contains_key(id)
    }

    pub fn read(&self, id: &str) -> Result<Entity, StoreError> {
        self.read_lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    pub fn read_all(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.read_lock().values().cloned().collect();
        all.sort_by(|a, b| a.project.name.cmp(&b.project.name));
        all
    }

    pub fn read_status(&self, id: &str) -> Result<Status, StoreError> {
        Ok(self.read(id)?.meta.status)
    }

    /// Writes a project configuration, resetting its status to Unknown.
    pub fn write(&self, id: &str, p: project::Config) -> Result<(), StoreError> {
        self.write_lock().insert(
            id.to_string(),
            Entity {
                project: p,
                meta: Meta {
                    status: Status::Unknown,
                },
            },
        );
        self.persist()
    }

    pub fn write_status(&self, id: &str, status: Status) -> Result<(), StoreError> {
        {
            let mut data = self.write_lock();
            let entity = data
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
            entity.meta.status = status;
        }
        self.persist()
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.write_lock().remove(id).is_none() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        self.persist()
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<String, Entity>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<String, Entity>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(name: &str) -> project::Config {
        let mut p = project::Config::default();
        p.path = PathBuf::from("/var/www").join(name);
        p.name = name.to_string();
        p
    }

    #[test]
    fn write_reopen_read_roundtrip() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("data.db");

        let store = Store::new(&file);
        let p = config("foo");
        let id = p.id();
        store.write(&id, p.clone()).expect("write");
        store.write_status(&id, Status::Active).expect("status");

        let reopened = Store::new(&file);
        reopened.load().expect("load");
        let entity = reopened.read(&id).expect("read");
        assert_eq!(entity.project, p);
        assert_eq!(entity.meta.status, Status::Active);
    }

    #[test]
    fn write_resets_status_to_unknown() {
        let tmp = TempDir::new().expect("tempdir");
        let store = Store::new(tmp.path().join("data.db"));
        let p = config("foo");
        let id = p.id();

        store.write(&id, p.clone()).expect("write");
        store.write_status(&id, Status::Active).expect("status");
        store.write(&id, p).expect("write again");
        assert_eq!(store.read_status(&id).expect("status"), Status::Unknown);
    }

    #[test]
    fn corrupt_line_fails_the_whole_load() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("data.db");
        std::fs::write(&file, "not a store line\n").expect("write");

        let store = Store::new(&file);
        assert!(matches!(
            store.load(),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn unparseable_entity_fails_the_whole_load() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("data.db");
        std::fs::write(&file, "abcd1234#{broken json\n").expect("write");

        let store = Store::new(&file);
        assert!(matches!(store.load(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn delete_removes_and_errors_on_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let store = Store::new(tmp.path().join("data.db"));
        let p = config("foo");
        let id = p.id();

        store.write(&id, p).expect("write");
        assert!(store.has(&id));
        store.delete(&id).expect("delete");
        assert!(!store.has(&id));
        assert!(matches!(
            store.delete(&id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn status_of_unknown_project_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let store = Store::new(tmp.path().join("data.db"));
        assert!(matches!(
            store.write_status("missing", Status::Active),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn read_all_returns_every_entity() {
        let tmp = TempDir::new().expect("tempdir");
        let store = Store::new(tmp.path().join("data.db"));

        for name in ["a", "b", "c"] {
            let p = config(name);
            store.write(&p.id(), p).expect("write");
        }
        let all = store.read_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].project.name, "a");
    }
}
