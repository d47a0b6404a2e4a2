use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lon: f64,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    Manual,
    WebSearch,
    Eventbrite,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Manual => "manual",
            EventSource::WebSearch => "web-search",
            EventSource::Eventbrite => "eventbrite",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpportunityLinks {
    pub google: String,
    pub eventbrite: String,
    pub facebook: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredEvent {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub table_cost: f64,
    /// Unset until the annotation pass geocodes the location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default)]
    pub is_historical: bool,
    pub source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_links: Option<OpportunityLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub discovered_at: String,
    #[serde(default)]
    pub recurring: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStatus {
    Past,
    Today,
    ThisWeek,
    ThisMonth,
    Upcoming,
}

impl TimeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TimeStatus::Past => "Past",
            TimeStatus::Today => "Today",
            TimeStatus::ThisWeek => "This Week",
            TimeStatus::ThisMonth => "This Month",
            TimeStatus::Upcoming => "Upcoming",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profitability {
    High,
    Medium,
    Low,
}

impl Profitability {
    pub fn label(&self) -> &'static str {
        match self {
            Profitability::High => "High",
            Profitability::Medium => "Medium",
            Profitability::Low => "Low",
        }
    }
}

impl DiscoveredEvent {
    pub fn start(&self) -> Option<NaiveDate> {
        parse_date(&self.start_date)
    }

    /// Table cost with NaN folded to zero.
    pub fn cost(&self) -> f64 {
        if self.table_cost.is_nan() {
            0.0
        } else {
            self.table_cost
        }
    }

    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.is_historical || self.start().map(|d| d < today).unwrap_or(false)
    }

    pub fn time_status(&self, today: NaiveDate) -> TimeStatus {
        let Some(start) = self.start() else {
            return TimeStatus::Upcoming;
        };
        let days_until = (start - today).num_days();
        match days_until {
            d if d < 0 => TimeStatus::Past,
            0 => TimeStatus::Today,
            d if d <= 7 => TimeStatus::ThisWeek,
            d if d <= 30 => TimeStatus::ThisMonth,
            _ => TimeStatus::Upcoming,
        }
    }

    pub fn profitability(&self) -> Profitability {
        let cost = self.cost();
        if cost < 100.0 {
            Profitability::High
        } else if cost < 300.0 {
            Profitability::Medium
        } else {
            Profitability::Low
        }
    }
}

/// A record in the shared `events` collection, created when a discovery is applied to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommittedEvent {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub table_cost: f64,
    #[serde(default)]
    pub other_costs: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .or_else(|| {
            // tolerate full timestamps such as `2025-05-01T00:00:00Z`
            trimmed
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
        })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Inclusive number of days covered by a start/end pair; unparseable input counts as one day.
pub fn calculate_days(start_date: &str, end_date: &str) -> i64 {
    match (parse_date(start_date), parse_date(end_date)) {
        (Some(start), Some(end)) => (end - start).num_days().abs() + 1,
        _ => 1,
    }
}

pub fn event_type_label(event_type: &str) -> String {
    match event_type {
        "craft-fair" => "Craft Fair".to_string(),
        "farmers-market" => "Farmers Market".to_string(),
        "art-show" => "Art Show".to_string(),
        "convention" => "Convention".to_string(),
        "festival" => "Festival".to_string(),
        "market" => "Market".to_string(),
        "expo" => "Expo".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn sample_event(id: &str, name: &str, start_date: &str, location: &str) -> DiscoveredEvent {
    DiscoveredEvent {
        id: id.to_string(),
        name: name.to_string(),
        start_date: start_date.to_string(),
        end_date: start_date.to_string(),
        location: location.to_string(),
        event_type: "craft-fair".to_string(),
        table_cost: 0.0,
        distance: None,
        is_historical: false,
        source: EventSource::WebSearch,
        opportunity_links: None,
        url: None,
        description: None,
        discovered_at: String::new(),
        recurring: false,
    }
}
