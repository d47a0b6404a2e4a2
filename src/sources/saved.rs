use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::base;
use super::{EventSource, SearchQuery};
use crate::db::Store;
use crate::models::DiscoveredEvent;

const SOURCE_ID: &str = "manual";
const SOURCE_NAME: &str = "Saved manual entries";

/// Events the user entered by hand, matched against the searched city and window.
pub struct SavedEvents {
    store: Arc<Store>,
}

impl SavedEvents {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventSource for SavedEvents {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<DiscoveredEvent>> {
        let saved = self
            .store
            .discovered_events()
            .context("loading saved events")?;
        Ok(filter_saved(saved, query))
    }
}

fn filter_saved(saved: Vec<DiscoveredEvent>, query: &SearchQuery) -> Vec<DiscoveredEvent> {
    let city = base::city_of(&query.location).to_lowercase();
    let from = query.effective_from();
    saved
        .into_iter()
        .filter(|event| city.is_empty() || event.location.to_lowercase().contains(&city))
        .filter(|event| query.wants_type(&event.event_type))
        .filter(|event| match event.start() {
            Some(start) => start >= from && start <= query.date_to,
            None => false,
        })
        .map(|mut event| {
            event.distance = None;
            event.is_historical = event.is_historical || event.is_past(query.today);
            event
        })
        .collect()
}
