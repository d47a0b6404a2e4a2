use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = match std::env::var("MARKET_SCOUT_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => data_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("market-scout"),
    };
    if let Err(err) = fs::create_dir_all(&root) {
        warn!("failed to create data root {:?}: {err}", root);
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("market-scout.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!("failed to create parent {:?}: {err}", parent);
        }
    }
}
