//! Storage layer for frontdesk.
//!
//! This module provides `SQLite`-backed durable local storage. Local mode
//! keeps the whole queue as one serialized JSON blob; every save overwrites
//! it in a single statement (last write wins).

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::entry::{Entry, EntryId, Status};
use crate::error::{Error, Result};
use crate::store::EntryStore;

/// Blob key holding the local-mode queue.
pub const ENTRIES_KEY: &str = "local_patients";

/// Durable local store for the queue.
///
/// Stateless with respect to the queue itself: every call reads or writes
/// the stored blob, nothing is cached.
#[derive(Debug)]
pub struct LocalStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open or create a local store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Local store opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored queue.
    ///
    /// An absent or malformed blob yields an empty list.
    #[must_use]
    pub fn load(&self) -> Vec<Entry> {
        let raw = match self.read_blob(ENTRIES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read local queue: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Entry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Stored queue is malformed, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Overwrite the stored queue with `entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, entries: &[Entry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.write_blob(ENTRIES_KEY, &raw)?;
        debug!("Saved {} entries to local store", entries.len());
        Ok(())
    }

    /// Read a raw blob by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn read_blob(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM blobs WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Replace a raw blob by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn write_blob(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO blobs (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("local store connection lock poisoned"))
    }

    /// Load, apply `change`, save. One write per call.
    fn modify(&self, change: impl FnOnce(&mut Vec<Entry>)) -> Result<()> {
        let mut entries = self.load();
        change(&mut entries);
        self.save(&entries)
    }
}

#[async_trait::async_trait]
impl EntryStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_all(&self) -> Result<Vec<Entry>> {
        Ok(self.load())
    }

    async fn insert(&self, entry: &Entry) -> Result<()> {
        let entry = entry.clone();
        self.modify(move |entries| {
            entries.retain(|e| e.id != entry.id);
            entries.push(entry);
        })
    }

    async fn update_status(&self, id: &EntryId, status: Status) -> Result<()> {
        self.modify(|entries| {
            if status == Status::Done {
                entries.retain(|e| &e.id != id);
            } else if let Some(entry) = entries.iter_mut().find(|e| &e.id == id) {
                entry.status = status;
            }
        })
    }

    async fn remove(&self, id: &EntryId) -> Result<()> {
        self.modify(|entries| entries.retain(|e| &e.id != id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> LocalStore {
        LocalStore::open_in_memory().expect("failed to create test store")
    }

    #[test]
    fn test_open_in_memory() {
        let store = LocalStore::open_in_memory();
        assert!(store.is_ok());
        assert_eq!(store.unwrap().path(), Path::new(":memory:"));
    }

    #[test]
    fn test_load_absent_is_empty() {
        let store = create_test_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let store = create_test_store();
        let entries = vec![Entry::new("Kim", "ultrasound"), Entry::new("Lee", "taping")];

        store.save(&entries).unwrap();

        assert_eq!(store.load(), entries);
    }

    #[test]
    fn test_save_overwrites() {
        let store = create_test_store();
        store.save(&[Entry::new("Old", "x")]).unwrap();

        let fresh = vec![Entry::new("New", "y")];
        store.save(&fresh).unwrap();

        assert_eq!(store.load(), fresh);
    }

    #[test]
    fn test_malformed_blob_is_empty() {
        let store = create_test_store();
        store.write_blob(ENTRIES_KEY, "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_blobs_are_independent() {
        let store = create_test_store();
        store.write_blob("other", "[1,2,3]").unwrap();
        store.save(&[Entry::new("Kim", "x")]).unwrap();

        assert_eq!(store.read_blob("other").unwrap().as_deref(), Some("[1,2,3]"));
        assert_eq!(store.load().len(), 1);
    }

    #[tokio::test]
    async fn test_entry_store_insert_appends() {
        let store = create_test_store();
        let a = Entry::new("A", "one");
        let b = Entry::new("B", "two");

        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[tokio::test]
    async fn test_entry_store_update_status() {
        let store = create_test_store();
        let a = Entry::new("A", "one");
        store.insert(&a).await.unwrap();

        store.update_status(&a.id, Status::InProgress).await.unwrap();

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all[0].status, Status::InProgress);
    }

    #[tokio::test]
    async fn test_entry_store_done_removes() {
        let store = create_test_store();
        let a = Entry::new("A", "one");
        store.insert(&a).await.unwrap();

        store.update_status(&a.id, Status::Done).await.unwrap();

        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entry_store_remove() {
        let store = create_test_store();
        let a = Entry::new("A", "one");
        let b = Entry::new("B", "two");
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        store.remove(&a.id).await.unwrap();

        assert_eq!(store.fetch_all().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_local_store_has_no_feed() {
        let store = create_test_store();
        assert!(store.subscribe().await.unwrap().is_none());
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("queue.db");

        let store = LocalStore::open(&path).unwrap();
        store.save(&[Entry::new("Kim", "x")]).unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.load().len(), 1);
    }
}
