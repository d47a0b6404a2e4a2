use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::models::{
    event_type_label, format_date, DiscoveredEvent, EventSource, OpportunityLinks,
};

static STATE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{2}").expect("valid state code regex"));

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Fresh event id. The sequence number keeps ids unique even for identical inputs.
pub fn generate_id(source: EventSource, name: &str, start_date: &str, location: &str) -> String {
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(start_date.as_bytes());
    hasher.update(b"|");
    hasher.update(location.as_bytes());
    hasher.update(b"|");
    hasher.update(sequence.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// City portion of a `"City, ST zip"` style location.
pub fn city_of(location: &str) -> String {
    let city = location.split(',').next().unwrap_or("").trim();
    if city.is_empty() {
        location.trim().to_string()
    } else {
        city.to_string()
    }
}

/// Two-letter state code from the second comma-separated part, if any.
pub fn state_of(location: &str) -> Option<String> {
    location
        .split(',')
        .nth(1)
        .and_then(|part| STATE_CODE_RE.find(part))
        .map(|m| m.as_str().to_string())
}

pub fn opportunity_links(
    event_type: &str,
    location: &str,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    event_name: &str,
    today: NaiveDate,
) -> OpportunityLinks {
    let type_label = event_type_label(if event_type.is_empty() {
        "craft-fair"
    } else {
        event_type
    });
    let location = location.trim();
    let year_from = date_from.unwrap_or(today).year();
    let year_to = date_to.map(|d| d.year()).unwrap_or(year_from);
    let year_range = if year_from == year_to {
        year_from.to_string()
    } else {
        format!("{year_from}-{year_to}")
    };
    let query = if event_name.is_empty() {
        format!("{type_label} {location} {year_range}")
    } else {
        format!("{event_name} {location}")
    };
    let listing_query = format!("{type_label} {location}");

    OpportunityLinks {
        google: search_url("https://www.google.com/search", &query),
        eventbrite: search_url("https://www.eventbrite.com/search/", &listing_query),
        facebook: search_url("https://www.facebook.com/events/search/", &query),
    }
}

fn search_url(base: &str, query: &str) -> String {
    match Url::parse_with_params(base, [("q", query)]) {
        Ok(url) => url.into(),
        Err(_) => base.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn build_event(
    source: EventSource,
    name: String,
    start: NaiveDate,
    end: NaiveDate,
    location: &str,
    event_type: &str,
    table_cost: f64,
    links: OpportunityLinks,
    description: &str,
    is_historical: bool,
    recurring: bool,
) -> DiscoveredEvent {
    let start_date = format_date(start);
    let id = generate_id(source, &name, &start_date, location);
    DiscoveredEvent {
        id,
        name,
        start_date,
        end_date: format_date(end),
        location: location.to_string(),
        event_type: event_type.to_string(),
        table_cost,
        distance: None,
        is_historical,
        source,
        url: Some(links.google.clone()),
        opportunity_links: Some(links),
        description: Some(description.to_string()),
        discovered_at: Utc::now().to_rfc3339(),
        recurring,
    }
}

pub fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

pub fn minus_one_year(date: NaiveDate) -> NaiveDate {
    date.checked_sub_months(Months::new(12)).unwrap_or(date)
}
