use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::{Cache, MemoryCache};
use super::resolver::GeoResolver;
use crate::models::{DiscoveredEvent, ResolvedLocation};

const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Distance cache key: the event's location text plus the exact origin coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistanceKey {
    location: String,
    origin_lat_bits: u64,
    origin_lon_bits: u64,
}

impl DistanceKey {
    pub fn new(location: &str, origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            location: location.to_string(),
            origin_lat_bits: origin_lat.to_bits(),
            origin_lon_bits: origin_lon.to_bits(),
        }
    }
}

pub type DistanceCache = Arc<dyn Cache<DistanceKey, f64>>;

/// Great-circle distance in miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // near-antipodal pairs can round just past 1
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Clone)]
pub struct DistanceEngine {
    resolver: GeoResolver,
    cache: DistanceCache,
}

impl DistanceEngine {
    pub fn new(resolver: GeoResolver) -> Self {
        Self::with_cache(resolver, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(resolver: GeoResolver, cache: DistanceCache) -> Self {
        Self { resolver, cache }
    }

    pub fn resolver(&self) -> &GeoResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    /// Miles from `origin` to the event, rounded to one decimal.
    ///
    /// `None` when the event location cannot be geocoded; callers must not read that as zero.
    pub async fn annotate(&self, event: &DiscoveredEvent, origin: &ResolvedLocation) -> Option<f64> {
        let key = DistanceKey::new(&event.location, origin.lat, origin.lon);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let target = match self.resolver.resolve(&event.location).await {
            Ok(target) => target,
            Err(err) => {
                debug!(event_id = %event.id, "no distance for event: {err}");
                return None;
            }
        };

        let miles = round_tenth(haversine_miles(
            origin.lat, origin.lon, target.lat, target.lon,
        ));
        if !miles.is_finite() {
            warn!(event_id = %event.id, "discarding non-finite distance");
            return None;
        }
        self.cache.set(key, miles);
        Some(miles)
    }

    pub async fn annotate_event(
        &self,
        event: &DiscoveredEvent,
        origin: &ResolvedLocation,
    ) -> DiscoveredEvent {
        let mut annotated = event.clone();
        if let Some(miles) = self.annotate(event, origin).await {
            annotated.distance = Some(miles);
        }
        annotated
    }
}
