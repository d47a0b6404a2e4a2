use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::{Cache, MemoryCache};
use super::geocoder::{DetailLevel, GeoError, GeocodeHit, Geocoder, PlaceParts};
use super::{city_state_from_display, is_coordinate_pair, is_zip_code, parse_coordinates};
use crate::models::ResolvedLocation;

pub type GeocodeCache = Arc<dyn Cache<String, ResolvedLocation>>;

/// Turns free-form location text into coordinates plus a readable address.
#[derive(Clone)]
pub struct GeoResolver {
    geocoder: Arc<dyn Geocoder>,
    cache: GeocodeCache,
}

impl GeoResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self::with_cache(geocoder, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(geocoder: Arc<dyn Geocoder>, cache: GeocodeCache) -> Self {
        Self { geocoder, cache }
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Makes a previously persisted location resolvable without a network call.
    pub fn seed(&self, location: &ResolvedLocation) {
        if let Some(zip) = location.zip.as_deref().filter(|zip| !zip.is_empty()) {
            self.cache.set(zip.to_string(), location.clone());
        }
        if !location.address.trim().is_empty() {
            self.cache.set(location.address.clone(), location.clone());
        }
    }

    /// Cached by the exact query string, so `"94103"` and `" 94103"` are separate entries.
    pub async fn resolve(&self, query: &str) -> Result<ResolvedLocation, GeoError> {
        let key = query.to_string();
        if let Some(cached) = self.cache.get(&key) {
            debug!(query, "geocode cache hit");
            return Ok(cached);
        }

        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(GeoError::LocationNotFound(query.to_string()));
        }

        let resolved = if is_coordinate_pair(trimmed) {
            match parse_coordinates(trimmed) {
                Some((lat, lon)) => self.resolve_coordinates(lat, lon).await,
                None => None,
            }
        } else if is_zip_code(trimmed) {
            self.resolve_zip(trimmed).await
        } else {
            self.forward(trimmed)
                .await
                .map(|hit| ResolvedLocation {
                    lat: hit.lat,
                    lon: hit.lon,
                    address: hit.display_name,
                    zip: None,
                })
        };

        match resolved {
            Some(location) => {
                self.cache.set(key, location.clone());
                Ok(location)
            }
            None => Err(GeoError::LocationNotFound(query.to_string())),
        }
    }

    /// Readable name for a location string. Coordinates become a city name when one is known.
    pub async fn place_name(&self, location: &str) -> String {
        let trimmed = location.trim();
        if !is_coordinate_pair(trimmed) {
            return location.to_string();
        }
        let Some((lat, lon)) = parse_coordinates(trimmed) else {
            return location.to_string();
        };
        match self.reverse(lat, lon, DetailLevel::City).await {
            Some(PlaceParts {
                city: Some(city), ..
            }) => city,
            _ => location.to_string(),
        }
    }

    async fn resolve_coordinates(&self, lat: f64, lon: f64) -> Option<ResolvedLocation> {
        let address = self.describe_coordinates(lat, lon).await;
        Some(ResolvedLocation {
            lat,
            lon,
            address,
            zip: None,
        })
    }

    /// Full address, then city only, then state only, then the raw coordinates.
    async fn describe_coordinates(&self, lat: f64, lon: f64) -> String {
        if let Some(parts) = self.reverse(lat, lon, DetailLevel::Address).await {
            if let Some(label) = full_label(&parts) {
                return label;
            }
        }
        if let Some(parts) = self.reverse(lat, lon, DetailLevel::City).await {
            if let Some(city) = parts.city {
                return city;
            }
            if let Some(state) = parts.state {
                return state;
            }
        }
        format!("{lat:.4}, {lon:.4}")
    }

    async fn resolve_zip(&self, zip: &str) -> Option<ResolvedLocation> {
        let clean = zip.replace('-', "");
        let hit = match self.geocoder.postal_lookup(&clean).await {
            Ok(Some(hit)) => Some(hit),
            Ok(None) => {
                debug!(zip, "postal lookup missed, trying forward geocode");
                self.forward(&clean).await
            }
            Err(err) => {
                warn!(zip, "postal lookup failed: {err}");
                self.forward(&clean).await
            }
        }?;

        let address = match city_state_from_display(&hit.display_name) {
            Some((city, state)) => format!("{city}, {state} {zip}"),
            None => match self.reverse(hit.lat, hit.lon, DetailLevel::City).await {
                Some(PlaceParts {
                    city: Some(city),
                    state: Some(state),
                    ..
                }) => format!("{city}, {state} {zip}"),
                _ => hit.display_name.clone(),
            },
        };

        Some(ResolvedLocation {
            lat: hit.lat,
            lon: hit.lon,
            address,
            zip: Some(clean),
        })
    }

    async fn forward(&self, text: &str) -> Option<GeocodeHit> {
        match self.geocoder.forward_geocode(text).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(query = text, "forward geocode failed: {err}");
                None
            }
        }
    }

    async fn reverse(&self, lat: f64, lon: f64, detail: DetailLevel) -> Option<PlaceParts> {
        match self.geocoder.reverse_geocode(lat, lon, detail).await {
            Ok(parts) => parts,
            Err(err) => {
                warn!(lat, lon, "reverse geocode failed: {err}");
                None
            }
        }
    }
}

fn full_label(parts: &PlaceParts) -> Option<String> {
    match (&parts.city, &parts.state) {
        (Some(city), Some(state)) => Some(match &parts.zip {
            Some(zip) => format!("{city}, {state} {zip}"),
            None => format!("{city}, {state}"),
        }),
        _ => None,
    }
}
