use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    #[error("location not found: {0}")]
    LocationNotFound(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

/// Pieces of a reverse lookup. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceParts {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    Address,
    City,
}

/// Geocoding provider contract. Adapters own the wire format; the resolver only sees these types.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward_geocode(&self, text: &str) -> Result<Option<GeocodeHit>, GeoError>;

    async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
        detail: DetailLevel,
    ) -> Result<Option<PlaceParts>, GeoError>;

    async fn postal_lookup(&self, zip: &str) -> Result<Option<GeocodeHit>, GeoError> {
        self.forward_geocode(zip).await
    }
}
