use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCAL_CONFIG_FILE: &str = "asset-lab.json";
const CONFIG_DIR_NAME: &str = "asset-lab";

/// Settings shared by the upload server, the batch CLI and the watcher.
///
/// Relative paths are resolved against the working directory, the same way
/// the tools have always been run from the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    pub assets_dir: PathBuf,
    /// Relative to `assets_dir`.
    pub catalog_file: PathBuf,
    pub watch_dir: PathBuf,
    /// Relative to `watch_dir`.
    pub processed_dir: PathBuf,
    pub bind_addr: String,
    pub settle_delay_ms: u64,
    pub watch_asset_type: String,
    pub lock_timeout_ms: u64,
    pub max_upload_bytes: u64,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            catalog_file: PathBuf::from("image_map.json"),
            watch_dir: PathBuf::from("add_these_assets"),
            processed_dir: PathBuf::from("processed"),
            bind_addr: "0.0.0.0:8080".to_string(),
            settle_delay_ms: 500,
            watch_asset_type: "buildings".to_string(),
            lock_timeout_ms: 5_000,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl LabConfig {
    /// Loads the config from `explicit` if given, otherwise from the first
    /// file found in the working directory or the platform config directory.
    /// Falls back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(AssetError::ConfigMissing(path.to_path_buf()));
            }
            return Self::load_from(path);
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        log::debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str::<LabConfig>(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(CONFIG_DIR_NAME).join("config.json"));
        }
        paths
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.assets_dir.join(&self.catalog_file)
    }

    pub fn processed_path(&self) -> PathBuf {
        self.watch_dir.join(&self.processed_dir)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
