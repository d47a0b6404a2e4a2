use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::debug;

use super::geocoder::{DetailLevel, GeoError, GeocodeHit, Geocoder, PlaceParts};
use crate::config::AppConfig;

/// OpenStreetMap Nominatim adapter. Requests are serialized and spaced by the configured window,
/// as the public instance allows roughly one request per second.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    country_codes: String,
    rate_limit: Duration,
    request_queue: AsyncMutex<()>,
    last_request: AsyncMutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseDoc {
    address: Option<AddressDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressDoc {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    iso_state: Option<String>,
}

impl NominatimGeocoder {
    pub fn from_config(config: &AppConfig) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| GeoError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.geocoder_url.trim_end_matches('/').to_string(),
            country_codes: config.country_codes.clone(),
            rate_limit: Duration::from_millis(config.rate_limit_ms),
            request_queue: AsyncMutex::new(()),
            last_request: AsyncMutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GeoError> {
        Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|err| GeoError::Http(err.to_string()))
    }

    async fn search(&self, params: &[(&str, &str)]) -> Result<Option<GeocodeHit>, GeoError> {
        let mut url = self.endpoint("search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json").append_pair("limit", "1");
            if !self.country_codes.trim().is_empty() {
                pairs.append_pair("countrycodes", self.country_codes.trim());
            }
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let text = self.fetch(url).await?;
        let docs: Vec<SearchDoc> =
            serde_json::from_str(&text).map_err(|err| GeoError::Parse(err.to_string()))?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(hit_from_doc(doc)?)),
            None => Ok(None),
        }
    }

    async fn fetch(&self, url: Url) -> Result<String, GeoError> {
        let _guard = self.request_queue.lock().await;
        self.wait_for_rate_limit().await;

        debug!(%url, "nominatim request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| GeoError::Http(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| GeoError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(GeoError::Http(format!("status {}: {}", status, text)));
        }

        Ok(text)
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.rate_limit {
                sleep(self.rate_limit - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn forward_geocode(&self, text: &str) -> Result<Option<GeocodeHit>, GeoError> {
        self.search(&[("q", text)]).await
    }

    async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
        detail: DetailLevel,
    ) -> Result<Option<PlaceParts>, GeoError> {
        let zoom = match detail {
            DetailLevel::Address => "18",
            DetailLevel::City => "10",
        };
        let mut url = self.endpoint("reverse")?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("zoom", zoom)
            .append_pair("addressdetails", "1");

        let text = self.fetch(url).await?;
        parse_reverse(&text)
    }

    async fn postal_lookup(&self, zip: &str) -> Result<Option<GeocodeHit>, GeoError> {
        self.search(&[("postalcode", zip)]).await
    }
}

fn hit_from_doc(doc: SearchDoc) -> Result<GeocodeHit, GeoError> {
    let lat = doc
        .lat
        .parse::<f64>()
        .map_err(|err| GeoError::Parse(format!("lat {:?}: {err}", doc.lat)))?;
    let lon = doc
        .lon
        .parse::<f64>()
        .map_err(|err| GeoError::Parse(format!("lon {:?}: {err}", doc.lon)))?;
    Ok(GeocodeHit {
        lat,
        lon,
        display_name: doc.display_name,
    })
}

fn parse_reverse(text: &str) -> Result<Option<PlaceParts>, GeoError> {
    let doc: ReverseDoc =
        serde_json::from_str(text).map_err(|err| GeoError::Parse(err.to_string()))?;
    let Some(address) = doc.address else {
        return Ok(None);
    };

    let city = [
        address.city,
        address.town,
        address.village,
        address.municipality,
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.trim().is_empty());

    // "US-CA" is preferred over "California" so addresses read "City, CA".
    let state = address
        .iso_state
        .as_deref()
        .and_then(|code| code.rsplit('-').next())
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .or(address.state)
        .filter(|state| !state.trim().is_empty());

    let zip = address.postcode.filter(|zip| !zip.trim().is_empty());

    if city.is_none() && state.is_none() && zip.is_none() {
        return Ok(None);
    }
    Ok(Some(PlaceParts { city, state, zip }))
}
