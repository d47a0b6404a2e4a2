use std::{path::Path, sync::Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::bookmarks::BookmarkedEvent;
use crate::models::{CommittedEvent, DiscoveredEvent, ResolvedLocation};
use crate::tracking::TrackedMap;
use crate::utils;

pub mod keys {
    pub const USER_LOCATION: &str = "userLocation";
    pub const DISCOVERED_EVENTS: &str = "discoveredEvents";
    pub const BOOKMARKED_EVENTS: &str = "bookmarkedEvents";
    pub const TRACKED_EVENTS: &str = "trackedEvents";
    pub const EVENTS: &str = "events";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload error for {key}: {source}")]
    Serde {
        key: String,
        source: serde_json::Error,
    },
    #[error("store mutex poisoned")]
    Poisoned,
}

/// Key-value persistence: one JSON payload per key in a single SQLite table.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open_default() -> Result<Self, StoreError> {
        let path = utils::database_path();
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv(
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let payload: Option<String> = {
            let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            conn.query_row(
                "SELECT payload FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
        };
        match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|source| StoreError::Serde {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Read-miss is treated as the empty value.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        Ok(self.get_json(key)?.unwrap_or_default())
    }

    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let payload = serde_json::to_string(value).map_err(|source| StoreError::Serde {
            key: key.to_string(),
            source,
        })?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (key, payload, updated_at_utc)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               payload = excluded.payload,
               updated_at_utc = excluded.updated_at_utc",
            params![key, payload, now],
        )?;
        Ok(())
    }

    /// Makes every later write to `key` fail with a SQLite constraint error.
    #[cfg(test)]
    pub(crate) fn reject_writes_to(&self, key: &str) -> Result<(), StoreError> {
        let name: String = key.chars().filter(char::is_ascii_alphanumeric).collect();
        let key = key.replace('\'', "''");
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_insert_{name} BEFORE INSERT ON kv
             WHEN NEW.key = '{key}'
             BEGIN SELECT RAISE(ABORT, 'writes rejected'); END;
             CREATE TRIGGER reject_update_{name} BEFORE UPDATE ON kv
             WHEN NEW.key = '{key}'
             BEGIN SELECT RAISE(ABORT, 'writes rejected'); END;"
        ))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn user_location(&self) -> Result<Option<ResolvedLocation>, StoreError> {
        self.get_json(keys::USER_LOCATION)
    }

    pub fn set_user_location(&self, location: &ResolvedLocation) -> Result<(), StoreError> {
        self.put_json(keys::USER_LOCATION, location)
    }

    pub fn discovered_events(&self) -> Result<Vec<DiscoveredEvent>, StoreError> {
        self.get_or_default(keys::DISCOVERED_EVENTS)
    }

    pub fn set_discovered_events(&self, events: &[DiscoveredEvent]) -> Result<(), StoreError> {
        self.put_json(keys::DISCOVERED_EVENTS, events)
    }

    pub fn bookmarked_events(&self) -> Result<Vec<BookmarkedEvent>, StoreError> {
        self.get_or_default(keys::BOOKMARKED_EVENTS)
    }

    pub fn set_bookmarked_events(&self, events: &[BookmarkedEvent]) -> Result<(), StoreError> {
        self.put_json(keys::BOOKMARKED_EVENTS, events)
    }

    pub fn tracked_events(&self) -> Result<TrackedMap, StoreError> {
        self.get_or_default(keys::TRACKED_EVENTS)
    }

    pub fn set_tracked_events(&self, tracked: &TrackedMap) -> Result<(), StoreError> {
        self.put_json(keys::TRACKED_EVENTS, tracked)
    }

    pub fn events(&self) -> Result<Vec<CommittedEvent>, StoreError> {
        self.get_or_default(keys::EVENTS)
    }

    pub fn set_events(&self, events: &[CommittedEvent]) -> Result<(), StoreError> {
        self.put_json(keys::EVENTS, events)
    }
}
