use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use super::base;
use super::{EventSource, SearchQuery};
use crate::models::{DiscoveredEvent, EventSource as Provenance};

const SOURCE_ID: &str = "web-search";
const SOURCE_NAME: &str = "Web patterns";

/// Recurring opportunity shapes seen on the open web: weekly farmers markets, craft fairs every
/// two weeks and monthly conventions, each anchored relative to today.
pub struct WebPatterns;

struct Pattern {
    event_type: &'static str,
    suffixes: &'static [&'static str],
    first_offset_days: u64,
    first_offset_months: u32,
    spacing_days: u64,
    length_days: u64,
    base_cost: f64,
    cost_step: f64,
    recurring: bool,
    description: &'static str,
}

const FARMERS_MARKETS: Pattern = Pattern {
    event_type: "farmers-market",
    suffixes: &["Farmers Market", "Weekend Market", "Community Market"],
    first_offset_days: 7,
    first_offset_months: 0,
    spacing_days: 7,
    length_days: 0,
    base_cost: 25.0,
    cost_step: 25.0,
    recurring: true,
    description: "Use the links to find real farmers markets and vendor info.",
};

const CRAFT_FAIRS: Pattern = Pattern {
    event_type: "craft-fair",
    suffixes: &["Craft Fair", "Artisan Market", "Handmade Market"],
    first_offset_days: 0,
    first_offset_months: 1,
    spacing_days: 14,
    length_days: 0,
    base_cost: 75.0,
    cost_step: 50.0,
    recurring: false,
    description: "Use the links to find real craft fairs and apply to vend.",
};

const CONVENTIONS: Pattern = Pattern {
    event_type: "convention",
    suffixes: &["Convention", "Expo", "Trade Show"],
    first_offset_days: 0,
    first_offset_months: 2,
    spacing_days: 30,
    length_days: 2,
    base_cost: 200.0,
    cost_step: 150.0,
    recurring: false,
    description: "Use the links to find real conventions and vendor applications.",
};

#[async_trait]
impl EventSource for WebPatterns {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<DiscoveredEvent>> {
        Ok(self.generate(query))
    }
}

impl WebPatterns {
    pub(crate) fn generate(&self, query: &SearchQuery) -> Vec<DiscoveredEvent> {
        let mut events = Vec::new();
        if query.wants_type(FARMERS_MARKETS.event_type) {
            events.extend(expand(&FARMERS_MARKETS, query));
        }
        if query.wants_type(CRAFT_FAIRS.event_type) {
            events.extend(expand(&CRAFT_FAIRS, query));
        }
        if query.wants_any_of(&["convention", "expo", "festival"]) {
            events.extend(expand(&CONVENTIONS, query));
        }
        events
    }
}

fn expand(pattern: &Pattern, query: &SearchQuery) -> Vec<DiscoveredEvent> {
    let city = base::city_of(&query.location);
    let state = base::state_of(&query.location);
    let first: NaiveDate = base::add_days(
        base::add_months(query.today, pattern.first_offset_months),
        pattern.first_offset_days,
    );
    let window_end = base::add_months(first, 3);
    let links = base::opportunity_links(
        pattern.event_type,
        &query.location,
        Some(first),
        Some(window_end),
        "",
        query.today,
    );

    pattern
        .suffixes
        .iter()
        .enumerate()
        .map(|(index, suffix)| {
            let name = match (pattern.event_type, index, &state) {
                ("convention", 0, Some(state)) => format!("{city} {state} {suffix}"),
                _ => format!("{city} {suffix}"),
            };
            let start = base::add_days(first, index as u64 * pattern.spacing_days);
            let end = base::add_days(start, pattern.length_days);
            base::build_event(
                Provenance::WebSearch,
                name,
                start,
                end,
                &query.location,
                pattern.event_type,
                pattern.base_cost + pattern.cost_step * index as f64,
                links.clone(),
                pattern.description,
                false,
                pattern.recurring,
            )
        })
        .collect()
}
