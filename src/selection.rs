use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::db::StoreError;
use crate::models::{calculate_days, CommittedEvent, DiscoveredEvent, EventSource};
use crate::sources::base::generate_id;
use crate::tracking::{Status, TrackingStore};

/// The external events collection that applied discoveries are committed into.
pub trait EventsCollection {
    fn contains(&self, name: &str, start_date: &str) -> bool;
    fn insert(&mut self, event: CommittedEvent);
}

impl EventsCollection for Vec<CommittedEvent> {
    fn contains(&self, name: &str, start_date: &str) -> bool {
        self.iter()
            .any(|existing| existing.name == name && existing.start_date == start_date)
    }

    fn insert(&mut self, event: CommittedEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Added,
    AlreadyExisted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub added: usize,
    pub already_existed: usize,
}

pub fn committed_from(event: &DiscoveredEvent) -> CommittedEvent {
    let now = Utc::now().to_rfc3339();
    let end_date = if event.end_date.is_empty() {
        event.start_date.clone()
    } else {
        event.end_date.clone()
    };
    CommittedEvent {
        id: generate_id(
            EventSource::Manual,
            &event.name,
            &event.start_date,
            &event.location,
        ),
        name: event.name.clone(),
        start_date: event.start_date.clone(),
        days: calculate_days(&event.start_date, &end_date),
        end_date,
        location: event.location.clone(),
        table_cost: event.cost(),
        other_costs: 0.0,
        description: event.description.clone().unwrap_or_default(),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Inserts the discovery unless an event with the same name and start date is present.
pub fn insert_unless_present<C: EventsCollection + ?Sized>(
    event: &DiscoveredEvent,
    events: &mut C,
) -> CommitOutcome {
    if events.contains(&event.name, &event.start_date) {
        CommitOutcome::AlreadyExisted
    } else {
        events.insert(committed_from(event));
        CommitOutcome::Added
    }
}

/// Commits one discovery and marks it applied, whether or not it was already present.
///
/// A persisted collection must be saved between the two steps; see `Discovery::quick_apply`.
pub fn commit_one<C: EventsCollection + ?Sized>(
    event: &DiscoveredEvent,
    events: &mut C,
    tracking: &mut TrackingStore,
) -> Result<CommitOutcome, StoreError> {
    let outcome = insert_unless_present(event, events);
    tracking.track(&event.id, Status::Applied)?;
    Ok(outcome)
}

/// Result of inserting a selection: the counts plus every id that should be marked applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedCommit {
    pub summary: CommitSummary,
    pub ids: Vec<String>,
}

/// Multi-select state over the displayed results. Never persisted.
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn select_all<P>(&mut self, visible: &[DiscoveredEvent], predicate: P)
    where
        P: Fn(&DiscoveredEvent) -> bool,
    {
        for event in visible.iter().filter(|event| predicate(event)) {
            self.ids.insert(event.id.clone());
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Inserts every selected event found in `visible` without touching tracking.
    pub fn stage_commit<C: EventsCollection + ?Sized>(
        &self,
        visible: &[DiscoveredEvent],
        events: &mut C,
    ) -> StagedCommit {
        let mut staged = StagedCommit::default();
        for id in &self.ids {
            let Some(event) = visible.iter().find(|event| &event.id == id) else {
                debug!(event_id = %id, "selected event no longer displayed, skipping");
                continue;
            };
            match insert_unless_present(event, events) {
                CommitOutcome::Added => staged.summary.added += 1,
                CommitOutcome::AlreadyExisted => staged.summary.already_existed += 1,
            }
            staged.ids.push(id.clone());
        }
        staged
    }

    /// Commits every selected event found in `visible`. Duplicates (same name and start date
    /// already in `events`) are counted but still marked applied.
    pub fn bulk_commit<C: EventsCollection + ?Sized>(
        &self,
        visible: &[DiscoveredEvent],
        events: &mut C,
        tracking: &mut TrackingStore,
    ) -> Result<CommitSummary, StoreError> {
        let staged = self.stage_commit(visible, events);
        tracking.track_all(staged.ids.iter().map(String::as_str), Status::Applied)?;
        Ok(staged.summary)
    }
}
