use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::models::DiscoveredEvent;
use crate::sources::SourceOutcome;

#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),
}

/// Events with the same name, start date and location collapse to one.
pub fn dedup_key(event: &DiscoveredEvent) -> String {
    format!("{}-{}-{}", event.name, event.start_date, event.location)
}

/// First-seen wins, in the order the lists are given.
pub fn merge<I>(lists: I) -> Vec<DiscoveredEvent>
where
    I: IntoIterator<Item = Vec<DiscoveredEvent>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for event in list {
            if seen.insert(dedup_key(&event)) {
                merged.push(event);
            }
        }
    }
    merged
}

#[derive(Debug, Default)]
pub struct Merged {
    pub events: Vec<DiscoveredEvent>,
    pub failed_sources: Vec<String>,
}

/// Merges per-source outcomes. Failed sources contribute nothing; if every source that was asked
/// failed, the whole search is reported as failed rather than as "no results".
pub fn merge_outcomes(outcomes: Vec<SourceOutcome>) -> Result<Merged, AggregateError> {
    let attempted = outcomes.len();
    let mut lists = Vec::with_capacity(attempted);
    let mut errors: Vec<(String, anyhow::Error)> = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(events) => lists.push(events),
            Err(err) => errors.push((outcome.source_id, err)),
        }
    }

    if attempted > 0 && errors.len() == attempted {
        let joined = errors
            .into_iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AggregateError::AllSourcesFailed(joined));
    }

    for (id, err) in &errors {
        warn!(source = %id, "dropping failed source from results: {err}");
    }

    Ok(Merged {
        events: merge(lists),
        failed_sources: errors.into_iter().map(|(id, _)| id).collect(),
    })
}
