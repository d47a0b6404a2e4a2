use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Store, StoreError};
use crate::models::{format_date, parse_date, DiscoveredEvent};

/// A saved copy of a discovery. It does not follow later changes to the result set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkedEvent {
    #[serde(flatten)]
    pub event: DiscoveredEvent,
    pub bookmarked_at: String,
    pub original_date: String,
    #[serde(default)]
    pub notes: String,
}

impl BookmarkedEvent {
    pub fn from_event(mut event: DiscoveredEvent, today: NaiveDate) -> Self {
        event.is_historical = event.is_past(today);
        Self {
            original_date: event.start_date.clone(),
            event,
            bookmarked_at: Utc::now().to_rfc3339(),
            notes: String::new(),
        }
    }

    /// Same month and day, next calendar year. Feb 29 falls back to Feb 28.
    pub fn suggested_date(&self, today: NaiveDate) -> Option<String> {
        let original = parse_date(&self.original_date)?;
        let year = today.year() + 1;
        NaiveDate::from_ymd_opt(year, original.month(), original.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, original.month(), 28))
            .map(format_date)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkOutcome {
    Added(BookmarkedEvent),
    AlreadyBookmarked,
}

pub struct Bookmarks {
    entries: Vec<BookmarkedEvent>,
    store: Option<Arc<Store>>,
}

impl Bookmarks {
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            store: None,
        }
    }

    pub fn load(store: Arc<Store>) -> Result<Self, StoreError> {
        Ok(Self {
            entries: store.bookmarked_events()?,
            store: Some(store),
        })
    }

    pub fn bookmark(
        &mut self,
        event: DiscoveredEvent,
        today: NaiveDate,
    ) -> Result<BookmarkOutcome, StoreError> {
        if self.contains(&event.id) {
            return Ok(BookmarkOutcome::AlreadyBookmarked);
        }
        let bookmarked = BookmarkedEvent::from_event(event, today);
        self.entries.push(bookmarked.clone());
        self.persist()?;
        Ok(BookmarkOutcome::Added(bookmarked))
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, event_id: &str) -> Result<bool, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.event.id != event_id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.event.id == event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<&BookmarkedEvent> {
        self.entries.iter().find(|entry| entry.event.id == event_id)
    }

    /// Most recent original date first; unparseable dates last.
    pub fn list(&self) -> Vec<BookmarkedEvent> {
        let mut listed = self.entries.clone();
        listed.sort_by(|a, b| {
            let a = parse_date(&a.original_date);
            let b = parse_date(&b.original_date);
            match (a, b) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        listed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.set_bookmarked_events(&self.entries),
            None => Ok(()),
        }
    }
}
