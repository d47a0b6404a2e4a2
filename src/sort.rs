use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::models::DiscoveredEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Date,
    DateDesc,
    Distance,
    Cost,
    Name,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::DateDesc => "date-desc",
            SortKey::Distance => "distance",
            SortKey::Cost => "cost",
            SortKey::Name => "name",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "date" => Ok(SortKey::Date),
            "date-desc" => Ok(SortKey::DateDesc),
            "distance" => Ok(SortKey::Distance),
            "cost" => Ok(SortKey::Cost),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// Returns a newly ordered copy; the input is left untouched. All orderings are stable.
pub fn sort_events(events: &[DiscoveredEvent], key: SortKey) -> Vec<DiscoveredEvent> {
    let mut sorted = events.to_vec();
    match key {
        SortKey::Date => sorted.sort_by(|a, b| compare_dates(a.start(), b.start(), false)),
        SortKey::DateDesc => sorted.sort_by(|a, b| compare_dates(a.start(), b.start(), true)),
        SortKey::Distance => sorted.sort_by(|a, b| {
            let da = a.distance.unwrap_or(f64::INFINITY);
            let db = b.distance.unwrap_or(f64::INFINITY);
            da.total_cmp(&db)
        }),
        SortKey::Cost => sorted.sort_by(|a, b| a.cost().total_cmp(&b.cost())),
        SortKey::Name => sorted.sort_by(|a, b| compare_names(&a.name, &b.name)),
    }
    sorted
}

// unparseable dates go last in both directions
fn compare_dates(a: Option<NaiveDate>, b: Option<NaiveDate>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
