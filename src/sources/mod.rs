pub mod base;
pub mod listings;
pub mod saved;
pub mod web_patterns;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::db::Store;
use crate::models::DiscoveredEvent;

/// Parameters handed to every source. Sources do their own type/date filtering.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub location: String,
    pub radius_miles: u32,
    pub event_type: Option<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub include_historical: bool,
    pub today: NaiveDate,
}

impl SearchQuery {
    pub fn wants_type(&self, event_type: &str) -> bool {
        match self.event_type.as_deref() {
            None | Some("") => true,
            Some(wanted) => wanted == event_type,
        }
    }

    pub fn wants_any_of(&self, event_types: &[&str]) -> bool {
        match self.event_type.as_deref() {
            None | Some("") => true,
            Some(wanted) => event_types.contains(&wanted),
        }
    }

    /// Earliest accepted date; one year earlier when historical events are requested.
    pub fn effective_from(&self) -> NaiveDate {
        if self.include_historical {
            base::minus_one_year(self.date_from)
        } else {
            self.date_from
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn source_name(&self) -> &'static str;
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<DiscoveredEvent>>;
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
}

/// Result of querying one source. A failure contributes no events.
pub struct SourceOutcome {
    pub source_id: String,
    pub result: anyhow::Result<Vec<DiscoveredEvent>>,
}

/// Sources in priority order; earlier sources win deduplication ties.
pub fn active_sources(config: &AppConfig, store: Arc<Store>) -> Vec<Arc<dyn EventSource>> {
    let mut sources: Vec<Arc<dyn EventSource>> = Vec::new();
    if config.search_listings {
        sources.push(Arc::new(listings::ListingPatterns));
    }
    if config.search_web {
        sources.push(Arc::new(web_patterns::WebPatterns));
    }
    if config.search_saved {
        sources.push(Arc::new(saved::SavedEvents::new(store)));
    }
    sources
}

pub fn list_sources(sources: &[Arc<dyn EventSource>]) -> Vec<SourceInfo> {
    sources
        .iter()
        .map(|source| SourceInfo {
            id: source.source_id().to_string(),
            name: source.source_name().to_string(),
        })
        .collect()
}

/// Queries every source concurrently; outcomes come back in the input order.
pub async fn run_all(sources: &[Arc<dyn EventSource>], query: &SearchQuery) -> Vec<SourceOutcome> {
    let tasks = sources.iter().map(|source| async move {
        let source_id = source.source_id().to_string();
        let result = source.search(query).await;
        match &result {
            Ok(events) => debug!(source = %source_id, count = events.len(), "source finished"),
            Err(err) => warn!(source = %source_id, "source failed: {err:#}"),
        }
        SourceOutcome { source_id, result }
    });
    join_all(tasks).await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Source returning a fixed list, or failing on demand.
    pub(crate) struct StaticSource {
        pub(crate) id: &'static str,
        pub(crate) events: Vec<DiscoveredEvent>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl EventSource for StaticSource {
        fn source_id(&self) -> &'static str {
            self.id
        }

        fn source_name(&self) -> &'static str {
            self.id
        }

        async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<DiscoveredEvent>> {
            if self.fail {
                anyhow::bail!("{} is unavailable", self.id);
            }
            Ok(self.events.clone())
        }
    }

    pub(crate) fn query(location: &str, today: NaiveDate) -> SearchQuery {
        SearchQuery {
            location: location.to_string(),
            radius_miles: 25,
            event_type: None,
            date_from: today,
            date_to: base::add_months(today, 3),
            include_historical: false,
            today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{query, StaticSource};
    use super::*;
    use crate::models::sample_event;

    #[tokio::test]
    async fn run_all_isolates_failures_and_keeps_order() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("date");
        let sources: Vec<Arc<dyn EventSource>> = vec![
            Arc::new(StaticSource {
                id: "first",
                events: vec![sample_event("a", "A", "2025-05-02", "X")],
                fail: false,
            }),
            Arc::new(StaticSource {
                id: "broken",
                events: Vec::new(),
                fail: true,
            }),
            Arc::new(StaticSource {
                id: "third",
                events: vec![sample_event("b", "B", "2025-05-03", "X")],
                fail: false,
            }),
        ];

        let outcomes = run_all(&sources, &query("X", today)).await;
        let ids: Vec<_> = outcomes.iter().map(|o| o.source_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "broken", "third"]);
        assert!(outcomes[1].result.is_err());
        assert_eq!(outcomes[2].result.as_ref().expect("third").len(), 1);
    }

    #[test]
    fn config_toggles_sources() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let config = AppConfig {
            search_listings: false,
            ..AppConfig::default()
        };
        let sources = active_sources(&config, store);
        let infos = list_sources(&sources);
        let ids: Vec<_> = infos.iter().map(|info| info.id.as_str()).collect();
        assert_eq!(ids, vec!["web-search", "manual"]);
    }

    #[test]
    fn historical_widens_date_window() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("date");
        let mut q = query("X", today);
        assert_eq!(q.effective_from(), today);
        q.include_historical = true;
        assert_eq!(
            q.effective_from(),
            NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
        );
    }
}
