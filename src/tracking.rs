use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Applied,
    Interested,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Applied => f.write_str("applied"),
            Status::Interested => f.write_str("interested"),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedStatus {
    #[serde(default, skip_serializing_if = "is_false")]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub interested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_at: Option<String>,
}

impl TrackedStatus {
    pub fn has(&self, status: Status) -> bool {
        match status {
            Status::Applied => self.applied,
            Status::Interested => self.interested,
        }
    }

    fn set(&mut self, status: Status, value: bool) {
        match status {
            Status::Applied => self.applied = value,
            Status::Interested => self.interested = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.applied && !self.interested
    }
}

pub type TrackedMap = BTreeMap<String, TrackedStatus>;

/// Per-event applied/interested flags. A record exists only while at least one flag is set.
pub struct TrackingStore {
    entries: TrackedMap,
    store: Option<Arc<Store>>,
}

impl TrackingStore {
    pub fn in_memory() -> Self {
        Self {
            entries: TrackedMap::new(),
            store: None,
        }
    }

    /// Loads `trackedEvents` and writes every later change back to it.
    pub fn load(store: Arc<Store>) -> Result<Self, StoreError> {
        let mut entries = store.tracked_events()?;
        // records written by older builds may carry no flags
        entries.retain(|_, status| !status.is_empty());
        Ok(Self {
            entries,
            store: Some(store),
        })
    }

    pub fn track(&mut self, event_id: &str, status: Status) -> Result<(), StoreError> {
        let entry = self.entries.entry(event_id.to_string()).or_default();
        entry.set(status, true);
        entry.tracked_at = Some(Utc::now().to_rfc3339());
        self.persist()
    }

    /// Sets `status` on every id and writes the map once. An empty id list writes nothing.
    pub fn track_all<'a, I>(&mut self, event_ids: I, status: Status) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Utc::now().to_rfc3339();
        let mut touched = false;
        for event_id in event_ids {
            let entry = self.entries.entry(event_id.to_string()).or_default();
            entry.set(status, true);
            entry.tracked_at = Some(now.clone());
            touched = true;
        }
        if touched {
            self.persist()?;
        }
        Ok(())
    }

    pub fn untrack(&mut self, event_id: &str, status: Status) -> Result<(), StoreError> {
        let Some(entry) = self.entries.get_mut(event_id) else {
            return Ok(());
        };
        entry.set(status, false);
        if entry.is_empty() {
            self.entries.remove(event_id);
        }
        self.persist()
    }

    /// Never fails; unknown ids yield an empty record.
    pub fn status(&self, event_id: &str) -> TrackedStatus {
        self.entries.get(event_id).cloned().unwrap_or_default()
    }

    pub fn is_tracked(&self, event_id: &str, status: Status) -> bool {
        self.entries
            .get(event_id)
            .map(|entry| entry.has(status))
            .unwrap_or(false)
    }

    /// Flips the interested flag and returns the new state.
    pub fn mark_interested(&mut self, event_id: &str) -> Result<bool, StoreError> {
        if self.is_tracked(event_id, Status::Interested) {
            self.untrack(event_id, Status::Interested)?;
            Ok(false)
        } else {
            self.track(event_id, Status::Interested)?;
            Ok(true)
        }
    }

    pub fn entries(&self) -> &TrackedMap {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.set_tracked_events(&self.entries),
            None => Ok(()),
        }
    }
}
