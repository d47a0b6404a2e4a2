pub mod cache;
pub mod distance;
pub mod geocoder;
pub mod nominatim;
pub mod resolver;

use once_cell::sync::Lazy;
use regex::Regex;

pub use cache::{Cache, MemoryCache};
pub use distance::{haversine_miles, DistanceEngine, DistanceKey};
pub use geocoder::{DetailLevel, GeoError, GeocodeHit, Geocoder, PlaceParts};
pub use nominatim::NominatimGeocoder;
pub use resolver::GeoResolver;

static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid zip regex"));
static COORDINATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d+\.?\d*,\s*-?\d+\.?\d*$").expect("valid coordinate regex")
});
static TRAILING_ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d{5}(-\d{4})?$").expect("valid trailing zip regex"));

pub fn is_zip_code(text: &str) -> bool {
    ZIP_RE.is_match(text.trim())
}

pub fn is_coordinate_pair(text: &str) -> bool {
    COORDINATE_RE.is_match(text.trim())
}

pub fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    if !is_coordinate_pair(text) {
        return None;
    }
    let (lat, lon) = text.trim().split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lon = lon.trim().parse::<f64>().ok()?;
    Some((lat, lon))
}

/// Short display form of a location: `"City, ST"` without a trailing ZIP.
///
/// Returns `None` for raw coordinates, which need a reverse lookup before they read well.
pub fn format_location_name(location: &str) -> Option<String> {
    let trimmed = location.trim();
    if trimmed.is_empty() || is_coordinate_pair(trimmed) {
        return None;
    }
    let parts: Vec<&str> = trimmed.split(',').collect();
    if parts.len() > 1 {
        let city_state = parts[..2].join(",");
        return Some(TRAILING_ZIP_RE.replace(city_state.trim(), "").trim().to_string());
    }
    Some(trimmed.to_string())
}

const US_STATES: &[(&str, &str)] = &[
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Puerto Rico", "PR"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

/// Two-letter code for a US state given by full name or code, ignoring case.
pub fn state_code(name: &str) -> Option<&'static str> {
    let name = name.trim();
    US_STATES
        .iter()
        .find(|(full, code)| full.eq_ignore_ascii_case(name) || code.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

/// City and state code from a geocoder display name such as
/// `"San Francisco, San Francisco County, California, 94103, United States"`.
///
/// The city is the first part that is not a number; the state is the last part naming a US state.
pub fn city_state_from_display(display_name: &str) -> Option<(String, &'static str)> {
    let parts: Vec<&str> = display_name
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let (state_index, code) = parts
        .iter()
        .enumerate()
        .rev()
        .find_map(|(index, part)| state_code(part).map(|code| (index, code)))?;
    let city = parts[..state_index]
        .iter()
        .find(|part| !part.chars().all(|c| c.is_ascii_digit() || c == '-'))?;
    Some((city.to_string(), code))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::geocoder::{DetailLevel, GeoError, GeocodeHit, Geocoder, PlaceParts};

    /// Scripted geocoder that counts every call it receives.
    #[derive(Default)]
    pub(crate) struct FakeGeocoder {
        places: HashMap<String, GeocodeHit>,
        default_forward: Option<GeocodeHit>,
        postal: Option<GeocodeHit>,
        reverse_address: Option<PlaceParts>,
        reverse_city: Option<PlaceParts>,
        fail: bool,
        calls: AtomicUsize,
        forward_log: Mutex<Vec<String>>,
    }

    fn hit(lat: f64, lon: f64, display_name: &str) -> GeocodeHit {
        GeocodeHit {
            lat,
            lon,
            display_name: display_name.to_string(),
        }
    }

    impl FakeGeocoder {
        pub(crate) fn empty() -> Self {
            Self::default()
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn san_francisco() -> Self {
            let sf = hit(
                37.7725,
                -122.4091,
                "San Francisco, San Francisco County, California",
            );
            Self {
                default_forward: Some(sf.clone()),
                postal: Some(sf),
                reverse_address: Some(PlaceParts {
                    city: Some("San Francisco".into()),
                    state: Some("CA".into()),
                    zip: Some("94103".into()),
                }),
                reverse_city: Some(PlaceParts {
                    city: Some("San Francisco".into()),
                    state: Some("CA".into()),
                    zip: None,
                }),
                ..Self::default()
            }
        }

        pub(crate) fn city_only(city: &str) -> Self {
            Self {
                reverse_city: Some(PlaceParts {
                    city: Some(city.to_string()),
                    state: None,
                    zip: None,
                }),
                ..Self::default()
            }
        }

        pub(crate) fn without_postal(mut self) -> Self {
            self.postal = None;
            self
        }

        pub(crate) fn with_postal(mut self, display_name: &str, lat: f64, lon: f64) -> Self {
            self.postal = Some(hit(lat, lon, display_name));
            self
        }

        pub(crate) fn with_place(mut self, text: &str, lat: f64, lon: f64) -> Self {
            self.places.insert(text.to_string(), hit(lat, lon, text));
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn forward_queries(&self) -> Vec<String> {
            self.forward_log.lock().expect("forward log").clone()
        }

        fn record(&self) -> Result<(), GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GeoError::Http("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn forward_geocode(&self, text: &str) -> Result<Option<GeocodeHit>, GeoError> {
            self.record()?;
            self.forward_log
                .lock()
                .expect("forward log")
                .push(text.to_string());
            Ok(self
                .places
                .get(text)
                .cloned()
                .or_else(|| self.default_forward.clone()))
        }

        async fn reverse_geocode(
            &self,
            _lat: f64,
            _lon: f64,
            detail: DetailLevel,
        ) -> Result<Option<PlaceParts>, GeoError> {
            self.record()?;
            Ok(match detail {
                DetailLevel::Address => self.reverse_address.clone(),
                DetailLevel::City => self.reverse_city.clone(),
            })
        }

        async fn postal_lookup(&self, _zip: &str) -> Result<Option<GeocodeHit>, GeoError> {
            self.record()?;
            Ok(self.postal.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_zip_codes() {
        assert!(is_zip_code("94103"));
        assert!(is_zip_code(" 94103-1234 "));
        assert!(!is_zip_code("9410"));
        assert!(!is_zip_code("94103 CA"));
    }

    #[test]
    fn recognizes_coordinate_pairs() {
        assert_eq!(parse_coordinates("37.77,-122.41"), Some((37.77, -122.41)));
        assert_eq!(parse_coordinates("-33, 151.2"), Some((-33.0, 151.2)));
        assert_eq!(parse_coordinates("Austin, TX"), None);
    }

    #[test]
    fn formats_location_names() {
        assert_eq!(
            format_location_name("San Francisco, CA 94103").as_deref(),
            Some("San Francisco, CA")
        );
        assert_eq!(
            format_location_name("12 Main St, Boise, ID, USA").as_deref(),
            Some("12 Main St, Boise")
        );
        assert_eq!(format_location_name("Boise").as_deref(), Some("Boise"));
        assert_eq!(format_location_name("43.6,-116.2"), None);
    }

    #[test]
    fn maps_state_names_to_codes() {
        assert_eq!(state_code("California"), Some("CA"));
        assert_eq!(state_code(" new york "), Some("NY"));
        assert_eq!(state_code("id"), Some("ID"));
        assert_eq!(state_code("San Francisco County"), None);
    }

    #[test]
    fn reads_city_and_state_from_display_names() {
        let display = "San Francisco, San Francisco County, California, 94103, United States";
        assert_eq!(
            city_state_from_display(display),
            Some(("San Francisco".to_string(), "CA"))
        );
        assert_eq!(
            city_state_from_display("83702, Boise, Ada County, Idaho, United States"),
            Some(("Boise".to_string(), "ID"))
        );
        assert_eq!(city_state_from_display("94103, United States"), None);
        assert_eq!(city_state_from_display("California, United States"), None);
    }
}
