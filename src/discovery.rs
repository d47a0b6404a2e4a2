use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregate::{merge_outcomes, AggregateError};
use crate::bookmarks::{BookmarkOutcome, BookmarkedEvent, Bookmarks};
use crate::db::{Store, StoreError};
use crate::geo::{format_location_name, is_coordinate_pair, is_zip_code, DistanceEngine};
use crate::models::{parse_date, DiscoveredEvent, EventSource as Provenance, ResolvedLocation};
use crate::selection::{
    committed_from, insert_unless_present, CommitOutcome, CommitSummary, SelectionSet,
};
use crate::sort::{sort_events, SortKey};
use crate::sources::{self, base, EventSource, SearchQuery};
use crate::tracking::{Status, TrackedStatus, TrackingStore};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("search error: {0}")]
    AllSourcesFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AggregateError> for DiscoveryError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::AllSourcesFailed(detail) => DiscoveryError::AllSourcesFailed(detail),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub location: String,
    pub radius_miles: u32,
    pub event_type: Option<String>,
    /// Defaults to `today`.
    pub date_from: Option<NaiveDate>,
    /// Defaults to three months after `date_from`.
    pub date_to: Option<NaiveDate>,
    pub include_historical: bool,
    pub today: NaiveDate,
}

impl SearchRequest {
    pub fn new(location: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            location: location.into(),
            radius_miles: 25,
            event_type: None,
            date_from: None,
            date_to: None,
            include_historical: false,
            today,
        }
    }

    fn to_query(&self, location: &str) -> SearchQuery {
        let date_from = self.date_from.unwrap_or(self.today);
        let date_to = self
            .date_to
            .unwrap_or_else(|| base::add_months(date_from, 3));
        SearchQuery {
            location: location.to_string(),
            radius_miles: self.radius_miles,
            event_type: self.event_type.clone().filter(|t| !t.trim().is_empty()),
            date_from,
            date_to,
            include_historical: self.include_historical,
            today: self.today,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub generation: u64,
    /// The location handed to sources; ZIP queries become `"City, ST zip"`.
    pub location: String,
    pub origin: Option<ResolvedLocation>,
    pub count: usize,
    pub failed_sources: Vec<String>,
    pub annotated: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub event_id: String,
    pub distance: Option<f64>,
    pub display_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnnotationResults {
    pub generation: u64,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub discarded: usize,
}

/// Distance and display work for one result set, detached from the session so it can run
/// while a newer search replaces the results.
pub struct AnnotationBatch {
    generation: u64,
    events: Vec<DiscoveredEvent>,
    origin: Option<ResolvedLocation>,
    engine: DistanceEngine,
}

impl AnnotationBatch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One task per event, all awaited together. A failing event only loses its own annotation.
    pub async fn run(self) -> AnnotationResults {
        let AnnotationBatch {
            generation,
            events,
            origin,
            engine,
        } = self;
        let tasks = events
            .iter()
            .map(|event| annotate_one(&engine, event, origin.as_ref()));
        let annotations = join_all(tasks).await;
        AnnotationResults {
            generation,
            annotations,
        }
    }
}

async fn annotate_one(
    engine: &DistanceEngine,
    event: &DiscoveredEvent,
    origin: Option<&ResolvedLocation>,
) -> Annotation {
    let display = async {
        if !is_coordinate_pair(&event.location) {
            return None;
        }
        let name = engine.resolver().place_name(&event.location).await;
        (name != event.location).then_some(name)
    };
    let distance = async {
        match origin {
            Some(origin) => engine.annotate(event, origin).await,
            None => None,
        }
    };
    let (display_location, distance) = futures::join!(display, distance);
    Annotation {
        event_id: event.id.clone(),
        distance,
        display_location,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualEventInput {
    pub name: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub location: String,
    pub table_cost: f64,
    pub event_type: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

/// One discovery session: the current result set plus everything the user has done to it.
pub struct Discovery {
    store: Arc<Store>,
    sources: Vec<Arc<dyn EventSource>>,
    engine: DistanceEngine,
    generation: u64,
    results: Vec<DiscoveredEvent>,
    origin: Option<ResolvedLocation>,
    display_locations: HashMap<String, String>,
    selection: SelectionSet,
    tracking: TrackingStore,
    bookmarks: Bookmarks,
}

impl Discovery {
    pub fn new(
        store: Arc<Store>,
        sources: Vec<Arc<dyn EventSource>>,
        engine: DistanceEngine,
    ) -> Result<Self, DiscoveryError> {
        let saved_location = store.user_location()?;
        if let Some(location) = &saved_location {
            debug!(address = %location.address, "seeding geocode cache from saved location");
            engine.resolver().seed(location);
        }
        let tracking = TrackingStore::load(store.clone())?;
        let bookmarks = Bookmarks::load(store.clone())?;
        Ok(Self {
            store,
            sources,
            engine,
            generation: 0,
            results: Vec::new(),
            origin: None,
            display_locations: HashMap::new(),
            selection: SelectionSet::new(),
            tracking,
            bookmarks,
        })
    }

    pub async fn search(&mut self, request: SearchRequest) -> Result<SearchOutcome, DiscoveryError> {
        let raw = request.location.trim().to_string();
        if raw.is_empty() {
            return Err(DiscoveryError::InvalidInput(
                "enter a ZIP code, city, state or address".into(),
            ));
        }

        self.generation += 1;
        self.selection.clear();
        self.results.clear();
        self.display_locations.clear();

        let resolver = self.engine.resolver().clone();
        let mut search_location = raw.clone();
        self.origin = match resolver.resolve(&raw).await {
            Ok(origin) => {
                if is_zip_code(&raw) {
                    search_location = origin.address.clone();
                }
                if let Err(err) = self.store.set_user_location(&origin) {
                    warn!("could not save user location: {err}");
                }
                Some(origin)
            }
            Err(err) => {
                warn!(location = %raw, "searching without distances: {err}");
                None
            }
        };

        let query = request.to_query(&search_location);
        let outcomes = sources::run_all(&self.sources, &query).await;
        let merged = merge_outcomes(outcomes)?;
        self.results = merged.events;
        info!(
            generation = self.generation,
            location = %search_location,
            count = self.results.len(),
            "search finished"
        );

        let batch = self.annotation_batch();
        let report = self.apply_annotations(batch.run().await);

        Ok(SearchOutcome {
            generation: self.generation,
            location: search_location,
            origin: self.origin.clone(),
            count: self.results.len(),
            failed_sources: merged.failed_sources,
            annotated: report.applied,
        })
    }

    pub fn annotation_batch(&self) -> AnnotationBatch {
        AnnotationBatch {
            generation: self.generation,
            events: self.results.clone(),
            origin: self.origin.clone(),
            engine: self.engine.clone(),
        }
    }

    /// Applies a finished batch unless a newer search has started since it was taken.
    pub fn apply_annotations(&mut self, results: AnnotationResults) -> ApplyReport {
        if results.generation != self.generation {
            debug!(
                batch = results.generation,
                current = self.generation,
                "discarding stale annotation batch"
            );
            return ApplyReport {
                applied: 0,
                discarded: results.annotations.len(),
            };
        }

        let mut report = ApplyReport::default();
        for annotation in results.annotations {
            let Some(event) = self
                .results
                .iter_mut()
                .find(|event| event.id == annotation.event_id)
            else {
                report.discarded += 1;
                continue;
            };
            let mut changed = false;
            if let Some(miles) = annotation.distance {
                event.distance = Some(miles);
                changed = true;
            }
            if let Some(name) = annotation.display_location {
                self.display_locations.insert(annotation.event_id, name);
                changed = true;
            }
            if changed {
                report.applied += 1;
            }
        }
        report
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn origin(&self) -> Option<&ResolvedLocation> {
        self.origin.as_ref()
    }

    pub fn results(&self) -> &[DiscoveredEvent] {
        &self.results
    }

    pub fn sorted(&self, key: SortKey) -> Vec<DiscoveredEvent> {
        sort_events(&self.results, key)
    }

    pub fn status(&self, event_id: &str) -> TrackedStatus {
        self.tracking.status(event_id)
    }

    pub fn distance_of(&self, event_id: &str) -> Option<f64> {
        self.find_result(event_id).and_then(|event| event.distance)
    }

    pub fn display_location_of(&self, event_id: &str) -> Option<String> {
        if let Some(name) = self.display_locations.get(event_id) {
            return Some(name.clone());
        }
        let event = self.find_result(event_id)?;
        Some(format_location_name(&event.location).unwrap_or_else(|| event.location.clone()))
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }

    pub fn toggle_selection(&mut self, event_id: &str) -> Result<bool, DiscoveryError> {
        if self.find_result(event_id).is_none() {
            return Err(DiscoveryError::EventNotFound(event_id.to_string()));
        }
        Ok(self.selection.toggle(event_id))
    }

    /// Selects every displayed event not yet applied to; returns the selection size.
    pub fn select_all_unapplied(&mut self) -> usize {
        let tracking = &self.tracking;
        self.selection.select_all(&self.results, |event| {
            !tracking.is_tracked(&event.id, Status::Applied)
        });
        self.selection.size()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn bulk_apply(&mut self) -> Result<CommitSummary, DiscoveryError> {
        if self.selection.is_empty() {
            return Ok(CommitSummary::default());
        }
        let mut events = self.store.events()?;
        let staged = self.selection.stage_commit(&self.results, &mut events);
        let summary = staged.summary;
        if summary.added > 0 {
            self.store.set_events(&events)?;
        }
        self.tracking
            .track_all(staged.ids.iter().map(String::as_str), Status::Applied)?;
        info!(
            added = summary.added,
            already_existed = summary.already_existed,
            "bulk apply finished"
        );
        self.selection.clear();
        Ok(summary)
    }

    pub fn quick_apply(&mut self, event_id: &str) -> Result<CommitOutcome, DiscoveryError> {
        let event = match self.find_result(event_id) {
            Some(event) => event.clone(),
            None => self
                .find_saved(event_id)?
                .ok_or_else(|| DiscoveryError::EventNotFound(event_id.to_string()))?,
        };
        let mut events = self.store.events()?;
        let outcome = insert_unless_present(&event, &mut events);
        if outcome == CommitOutcome::Added {
            self.store.set_events(&events)?;
        }
        self.tracking.track(&event.id, Status::Applied)?;
        Ok(outcome)
    }

    pub fn mark_interested(&mut self, event_id: &str) -> Result<bool, DiscoveryError> {
        Ok(self.tracking.mark_interested(event_id)?)
    }

    /// Looks in the current results, then saved entries, then existing bookmarks.
    pub fn bookmark(
        &mut self,
        event_id: &str,
        today: NaiveDate,
    ) -> Result<BookmarkOutcome, DiscoveryError> {
        let event = if let Some(event) = self.find_result(event_id) {
            event.clone()
        } else if let Some(event) = self.find_saved(event_id)? {
            event
        } else if let Some(bookmarked) = self.bookmarks.get(event_id) {
            bookmarked.event.clone()
        } else {
            return Err(DiscoveryError::EventNotFound(event_id.to_string()));
        };
        Ok(self.bookmarks.bookmark(event, today)?)
    }

    pub fn remove_bookmark(&mut self, event_id: &str) -> Result<bool, DiscoveryError> {
        Ok(self.bookmarks.remove(event_id)?)
    }

    pub fn bookmarks(&self) -> Vec<BookmarkedEvent> {
        self.bookmarks.list()
    }

    pub fn saved_events(&self) -> Result<Vec<DiscoveredEvent>, DiscoveryError> {
        Ok(self.store.discovered_events()?)
    }

    /// Stores a hand-entered event with the saved entries and in the events collection.
    pub async fn save_manual_event(
        &mut self,
        input: ManualEventInput,
    ) -> Result<DiscoveredEvent, DiscoveryError> {
        let name = input.name.trim();
        let start_date = input.start_date.trim();
        let location = input.location.trim();
        if name.is_empty() || start_date.is_empty() || location.is_empty() {
            return Err(DiscoveryError::InvalidInput(
                "name, start date and location are required".into(),
            ));
        }
        if parse_date(start_date).is_none() {
            return Err(DiscoveryError::InvalidInput(format!(
                "start date must be YYYY-MM-DD, got {start_date}"
            )));
        }
        let end_date = input
            .end_date
            .as_deref()
            .map(str::trim)
            .filter(|date| !date.is_empty())
            .unwrap_or(start_date)
            .to_string();

        let mut location = location.to_string();
        if is_zip_code(&location) {
            match self.engine.resolver().resolve(&location).await {
                Ok(resolved) => location = resolved.address,
                Err(err) => debug!(zip = %location, "keeping raw ZIP for manual event: {err}"),
            }
        }

        let event = DiscoveredEvent {
            id: base::generate_id(Provenance::Manual, name, start_date, &location),
            name: name.to_string(),
            start_date: start_date.to_string(),
            end_date,
            location,
            event_type: input.event_type.trim().to_string(),
            table_cost: if input.table_cost.is_finite() {
                input.table_cost
            } else {
                0.0
            },
            distance: None,
            is_historical: false,
            source: Provenance::Manual,
            opportunity_links: None,
            url: input.url.filter(|url| !url.trim().is_empty()),
            description: input.description.filter(|text| !text.trim().is_empty()),
            discovered_at: Utc::now().to_rfc3339(),
            recurring: false,
        };

        let mut saved = self.store.discovered_events()?;
        saved.push(event.clone());
        self.store.set_discovered_events(&saved)?;

        let mut events = self.store.events()?;
        let mut committed = committed_from(&event);
        committed.id = event.id.clone();
        events.push(committed);
        self.store.set_events(&events)?;

        info!(event_id = %event.id, name = %event.name, "saved manual event");
        Ok(event)
    }

    pub fn remove_saved_event(&mut self, event_id: &str) -> Result<bool, DiscoveryError> {
        let mut saved = self.store.discovered_events()?;
        let before = saved.len();
        saved.retain(|event| event.id != event_id);
        if saved.len() == before {
            return Ok(false);
        }
        self.store.set_discovered_events(&saved)?;
        Ok(true)
    }

    fn find_result(&self, event_id: &str) -> Option<&DiscoveredEvent> {
        self.results.iter().find(|event| event.id == event_id)
    }

    fn find_saved(&self, event_id: &str) -> Result<Option<DiscoveredEvent>, StoreError> {
        Ok(self
            .store
            .discovered_events()?
            .into_iter()
            .find(|event| event.id == event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::keys;
    use crate::geo::testing::FakeGeocoder;
    use crate::geo::GeoResolver;
    use crate::models::sample_event;
    use crate::sources::testing::StaticSource;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).expect("date")
    }

    fn source(id: &'static str, events: Vec<DiscoveredEvent>) -> Arc<dyn EventSource> {
        Arc::new(StaticSource {
            id,
            events,
            fail: false,
        })
    }

    fn broken(id: &'static str) -> Arc<dyn EventSource> {
        Arc::new(StaticSource {
            id,
            events: Vec::new(),
            fail: true,
        })
    }

    fn session(
        store: Arc<Store>,
        geocoder: Arc<FakeGeocoder>,
        sources: Vec<Arc<dyn EventSource>>,
    ) -> Discovery {
        let engine = DistanceEngine::new(GeoResolver::new(geocoder));
        Discovery::new(store, sources, engine).expect("session")
    }

    fn fairs() -> Vec<DiscoveredEvent> {
        vec![
            sample_event("e1", "Spring Fair", "2025-05-10", "Boise, ID 83702"),
            sample_event("e2", "Summer Fair", "2025-06-10", "Boise, ID"),
            sample_event("e3", "Fall Fair", "2025-09-10", "Boise, ID"),
        ]
    }

    #[tokio::test]
    async fn zip_search_uses_canonical_location_and_annotates_distances() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);

        let outcome = discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");
        assert_eq!(outcome.location, "San Francisco, CA 94103");
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.annotated, 3);
        // every fake lookup lands on the same point
        assert_eq!(discovery.distance_of("e1"), Some(0.0));

        let saved = store.user_location().expect("read").expect("saved");
        assert_eq!(saved.address, "San Francisco, CA 94103");
        assert_eq!(saved.zip.as_deref(), Some("94103"));
    }

    #[tokio::test]
    async fn failed_origin_still_returns_results_without_distance() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::empty());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);

        let outcome = discovery
            .search(SearchRequest::new("Nowhere", today()))
            .await
            .expect("search");
        assert!(outcome.origin.is_none());
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.annotated, 0);
        assert_eq!(discovery.distance_of("e1"), None);
        assert!(store.user_location().expect("read").is_none());
    }

    #[tokio::test]
    async fn all_sources_failing_is_a_search_error() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store, geocoder, vec![broken("listings"), broken("web")]);

        let err = discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect_err("should fail");
        assert!(matches!(err, DiscoveryError::AllSourcesFailed(_)));
        assert!(discovery.results().is_empty());
    }

    #[tokio::test]
    async fn partial_source_failure_is_reported_but_not_fatal() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(
            store,
            geocoder,
            vec![broken("listings"), source("web", fairs())],
        );

        let outcome = discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.failed_sources, vec!["listings".to_string()]);
    }

    #[tokio::test]
    async fn stale_annotation_batch_is_discarded() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::empty().with_place("Boise, ID", 43.6, -116.2));
        let mut discovery = session(store, geocoder, vec![source("web", fairs())]);

        discovery
            .search(SearchRequest::new("Boise, ID", today()))
            .await
            .expect("first search");
        let stale = discovery.annotation_batch();
        assert_eq!(stale.generation(), 1);

        discovery
            .search(SearchRequest::new("Nowhere", today()))
            .await
            .expect("second search");
        assert_eq!(discovery.distance_of("e2"), None);

        let report = discovery.apply_annotations(stale.run().await);
        assert_eq!(report, ApplyReport { applied: 0, discarded: 3 });
        assert_eq!(discovery.distance_of("e2"), None);
    }

    #[tokio::test]
    async fn annotations_for_vanished_events_are_skipped() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::empty().with_place("Boise, ID", 43.6, -116.2));
        let mut discovery = session(store, geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("Boise, ID", today()))
            .await
            .expect("search");

        let results = AnnotationResults {
            generation: discovery.generation(),
            annotations: vec![
                Annotation {
                    event_id: "e2".into(),
                    distance: Some(12.5),
                    display_location: None,
                },
                Annotation {
                    event_id: "gone".into(),
                    distance: Some(1.0),
                    display_location: None,
                },
                Annotation {
                    event_id: "e1".into(),
                    distance: None,
                    display_location: None,
                },
            ],
        };
        let report = discovery.apply_annotations(results);
        assert_eq!(report, ApplyReport { applied: 1, discarded: 1 });
        assert_eq!(discovery.distance_of("e2"), Some(12.5));
        assert_eq!(discovery.distance_of("e1"), None);
    }

    #[tokio::test]
    async fn coordinate_locations_get_a_readable_display_name() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::city_only("Oakland"));
        let events = vec![
            sample_event("coords", "Lake Market", "2025-05-10", "37.8044,-122.2712"),
            sample_event("named", "Boise Fair", "2025-05-10", "Boise, ID 83702"),
        ];
        let mut discovery = session(store, geocoder, vec![source("web", events)]);
        discovery
            .search(SearchRequest::new("37.80,-122.27", today()))
            .await
            .expect("search");

        assert_eq!(discovery.display_location_of("coords").as_deref(), Some("Oakland"));
        assert!(discovery.distance_of("coords").is_some());
        assert_eq!(discovery.display_location_of("named").as_deref(), Some("Boise, ID"));
        assert_eq!(discovery.display_location_of("missing"), None);
    }

    #[tokio::test]
    async fn saved_location_seeds_the_geocode_cache() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        store
            .set_user_location(&ResolvedLocation {
                lat: 43.6,
                lon: -116.2,
                address: "Boise, ID 83702".into(),
                zip: Some("83702".into()),
            })
            .expect("seed");
        let geocoder = Arc::new(FakeGeocoder::failing());
        let mut discovery = session(store, geocoder, vec![source("web", Vec::new())]);

        let outcome = discovery
            .search(SearchRequest::new("83702", today()))
            .await
            .expect("search");
        let origin = outcome.origin.expect("origin from cache");
        assert_eq!(origin.lat, 43.6);
        assert_eq!(outcome.location, "Boise, ID 83702");
    }

    #[tokio::test]
    async fn new_search_clears_selection() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store, geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");
        assert!(discovery.toggle_selection("e1").expect("toggle"));
        assert!(matches!(
            discovery.toggle_selection("nope"),
            Err(DiscoveryError::EventNotFound(_))
        ));

        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search again");
        assert!(discovery.selection().is_empty());
    }

    #[tokio::test]
    async fn bulk_apply_commits_new_events_and_marks_all_applied() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        store
            .set_events(&[committed_from(&fairs()[1])])
            .expect("seed events");
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");

        assert_eq!(discovery.select_all_unapplied(), 3);
        let summary = discovery.bulk_apply().expect("apply");
        assert_eq!(
            summary,
            CommitSummary {
                added: 2,
                already_existed: 1
            }
        );
        assert_eq!(store.events().expect("events").len(), 3);
        assert!(discovery.selection().is_empty());
        for id in ["e1", "e2", "e3"] {
            assert!(discovery.status(id).applied);
        }
        assert_eq!(discovery.select_all_unapplied(), 0);
    }

    #[tokio::test]
    async fn quick_apply_marks_applied_even_when_already_committed() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");

        assert_eq!(discovery.quick_apply("e1").expect("apply"), CommitOutcome::Added);
        assert_eq!(
            discovery.quick_apply("e1").expect("apply again"),
            CommitOutcome::AlreadyExisted
        );
        assert_eq!(store.events().expect("events").len(), 1);
        assert!(discovery.status("e1").applied);
        assert!(matches!(
            discovery.quick_apply("missing"),
            Err(DiscoveryError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn quick_apply_leaves_event_unapplied_when_events_cannot_be_saved() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");
        store.reject_writes_to(keys::EVENTS).expect("lock events");

        assert!(matches!(
            discovery.quick_apply("e1"),
            Err(DiscoveryError::Store(_))
        ));
        assert!(!discovery.status("e1").applied);
        assert!(store.tracked_events().expect("tracked").is_empty());
        assert!(store.events().expect("events").is_empty());
    }

    #[tokio::test]
    async fn bulk_apply_leaves_selection_unapplied_when_events_cannot_be_saved() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");
        assert_eq!(discovery.select_all_unapplied(), 3);
        store.reject_writes_to(keys::EVENTS).expect("lock events");

        assert!(matches!(
            discovery.bulk_apply(),
            Err(DiscoveryError::Store(_))
        ));
        for id in ["e1", "e2", "e3"] {
            assert!(!discovery.status(id).applied);
        }
        assert!(store.tracked_events().expect("tracked").is_empty());
        assert_eq!(discovery.selection().size(), 3);
    }

    #[tokio::test]
    async fn interested_toggle_round_trips_through_storage() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::empty());
        let mut discovery = session(store.clone(), geocoder, Vec::new());

        assert!(discovery.mark_interested("e1").expect("on"));
        assert!(discovery.status("e1").interested);
        assert!(!discovery.mark_interested("e1").expect("off"));
        assert!(!discovery.status("e1").interested);
        assert!(store.tracked_events().expect("tracked").is_empty());
    }

    #[tokio::test]
    async fn bookmark_finds_results_then_saved_entries() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        store
            .set_discovered_events(&[sample_event("saved", "Old Fair", "2024-07-01", "Boise, ID")])
            .expect("seed");
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, vec![source("web", fairs())]);
        discovery
            .search(SearchRequest::new("94103", today()))
            .await
            .expect("search");

        assert!(matches!(
            discovery.bookmark("e1", today()).expect("bookmark"),
            BookmarkOutcome::Added(_)
        ));
        assert_eq!(
            discovery.bookmark("e1", today()).expect("again"),
            BookmarkOutcome::AlreadyBookmarked
        );
        let BookmarkOutcome::Added(old) = discovery.bookmark("saved", today()).expect("saved")
        else {
            panic!("expected saved event to be bookmarked");
        };
        assert!(old.event.is_historical);
        assert!(matches!(
            discovery.bookmark("missing", today()),
            Err(DiscoveryError::EventNotFound(_))
        ));

        let listed: Vec<_> = discovery
            .bookmarks()
            .into_iter()
            .map(|b| b.event.id)
            .collect();
        assert_eq!(listed, vec!["e1", "saved"]);
        assert!(discovery.remove_bookmark("e1").expect("remove"));
        assert_eq!(store.bookmarked_events().expect("read").len(), 1);
    }

    #[tokio::test]
    async fn manual_event_is_validated_enhanced_and_stored_twice() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::san_francisco());
        let mut discovery = session(store.clone(), geocoder, Vec::new());

        let missing = discovery
            .save_manual_event(ManualEventInput {
                name: "  ".into(),
                start_date: "2025-06-01".into(),
                location: "94103".into(),
                ..ManualEventInput::default()
            })
            .await;
        assert!(matches!(missing, Err(DiscoveryError::InvalidInput(_))));

        let event = discovery
            .save_manual_event(ManualEventInput {
                name: "Mission Makers Market".into(),
                start_date: "2025-06-01".into(),
                end_date: Some("2025-06-02".into()),
                location: "94103".into(),
                table_cost: 80.0,
                event_type: "market".into(),
                ..ManualEventInput::default()
            })
            .await
            .expect("save");
        assert_eq!(event.location, "San Francisco, CA 94103");
        assert_eq!(event.source, Provenance::Manual);

        let saved = discovery.saved_events().expect("saved");
        assert_eq!(saved.len(), 1);
        let events = store.events().expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);
        assert_eq!(events[0].days, 2);

        assert!(discovery.remove_saved_event(&event.id).expect("remove"));
        assert!(!discovery.remove_saved_event(&event.id).expect("remove again"));
        assert_eq!(store.events().expect("events").len(), 1);
    }

    #[tokio::test]
    async fn sorted_view_leaves_results_in_source_order() {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let geocoder = Arc::new(FakeGeocoder::empty());
        let mut events = fairs();
        events.reverse();
        let mut discovery = session(store, geocoder, vec![source("web", events)]);
        discovery
            .search(SearchRequest::new("Boise", today()))
            .await
            .expect("search");

        let sorted: Vec<_> = discovery
            .sorted(SortKey::Date)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(sorted, vec!["e1", "e2", "e3"]);
        let raw: Vec<_> = discovery.results().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(raw, vec!["e3", "e2", "e1"]);
    }
}
