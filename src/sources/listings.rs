use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;

use super::base;
use super::{EventSource, SearchQuery};
use crate::models::{DiscoveredEvent, EventSource as Provenance};

const SOURCE_ID: &str = "eventbrite";
const SOURCE_NAME: &str = "Event listings";
const EVENTS_PER_SEARCH: u64 = 4;
const BASE_TABLE_COST: f64 = 50.0;
const TABLE_COST_STEP: f64 = 45.0;

/// Listing-style opportunities derived from per-type name templates, one per week from the
/// start of the requested window. Each carries search links to find the real listing.
pub struct ListingPatterns;

fn templates(event_type: &str, city: &str) -> Vec<String> {
    let suffixes: &[&str] = match event_type {
        "farmers-market" => &["Farmers Market", "Weekend Market", "Community Market"],
        "art-show" => &["Art Show", "Artisan Showcase", "Local Artists Market"],
        "convention" => &["Convention", "Expo", "Trade Show"],
        "festival" => &["Festival", "Street Fair", "Community Festival"],
        _ => &["Craft Fair", "Artisan Market", "Handmade Market", "Maker's Fair"],
    };
    suffixes
        .iter()
        .map(|suffix| format!("{city} {suffix}"))
        .collect()
}

#[async_trait]
impl EventSource for ListingPatterns {
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

impl ListingPatterns {
    pub(crate) fn generate(&self, query: &SearchQuery) -> Vec<DiscoveredEvent> {
        let event_type = query
            .event_type
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "craft-fair".to_string());
        let city = base::city_of(&query.location);
        let names = templates(&event_type, &city);

        let mut events = Vec::new();
        for index in 0..EVENTS_PER_SEARCH {
            let mut date = base::add_days(query.date_from, index * 7);
            if query.include_historical && index % 2 == 1 {
                date = base::minus_one_year(date);
            }
            if date > query.date_to {
                break;
            }

            let template = &names[index as usize % names.len()];
            let name = format!("{template} {}", date.year());
            let is_historical = date < query.today;
            let links = base::opportunity_links(
                &event_type,
                &query.location,
                Some(query.date_from),
                Some(query.date_to),
                &name,
                query.today,
            );
            let description = if is_historical {
                "Search for real events like this in your area. Past event, may recur annually."
            } else {
                "Search for real events like this in your area. Use the links to find and apply."
            };

            events.push(base::build_event(
                Provenance::Eventbrite,
                name,
                date,
                date,
                &query.location,
                &event_type,
                BASE_TABLE_COST + TABLE_COST_STEP * index as f64,
                links,
                description,
                is_historical,
                false,
            ));
        }
        events
    }
}
