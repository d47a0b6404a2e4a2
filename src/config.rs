use std::{fs, path::Path, path::PathBuf, sync::Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils;

const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "market-scout/0.1 (+https://github.com/market-scout/market-scout)";
const DEFAULT_COUNTRY_CODES: &str = "us";
const DEFAULT_RATE_LIMIT_MS: u64 = 1100;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RADIUS_MILES: u32 = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub geocoder_url: String,
    pub user_agent: String,
    pub country_codes: String,
    pub rate_limit_ms: u64,
    pub http_timeout_secs: u64,
    pub default_radius_miles: u32,
    pub default_sort: String,
    pub search_listings: bool,
    pub search_web: bool,
    pub search_saved: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            country_codes: DEFAULT_COUNTRY_CODES.to_string(),
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            default_radius_miles: DEFAULT_RADIUS_MILES,
            default_sort: "date".to_string(),
            search_listings: true,
            search_web: true,
            search_saved: true,
        }
    }
}

impl AppConfig {
    /// Applies `MARKET_SCOUT_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("MARKET_SCOUT_GEOCODER_URL") {
            self.geocoder_url = url;
        }
        if let Ok(agent) = std::env::var("MARKET_SCOUT_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Ok(codes) = std::env::var("MARKET_SCOUT_COUNTRY_CODES") {
            self.country_codes = codes;
        }
        if let Some(ms) = std::env::var("MARKET_SCOUT_RATE_LIMIT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.rate_limit_ms = ms;
        }
        self
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = read_config(&path)
            .unwrap_or_else(|err| {
                warn!("ignoring unreadable config {:?}: {err}", path);
                AppConfig::default()
            })
            .with_env_overrides();
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load_from(dir.path().join("config.json"));
        let config = store.read();
        assert_eq!(config.default_radius_miles, 25);
        assert!(config.search_web);
    }

    #[test]
    fn update_writes_through_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::load_from(path.clone());
        store
            .update(|config| {
                config.default_radius_miles = 50;
                config.search_listings = false;
            })
            .expect("update config");

        let reloaded = ConfigStore::load_from(path);
        let config = reloaded.read();
        assert_eq!(config.default_radius_miles, 50);
        assert!(!config.search_listings);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_sort":"distance"}"#).expect("write config");
        let config = ConfigStore::load_from(path).read();
        assert_eq!(config.default_sort, "distance");
        assert_eq!(config.country_codes, "us");
    }
}
