//! Application configuration management.
//!
//! Configuration is stored at `~/.config/nearby/config.json`; the backend
//! URL can be overridden through the `NEARBY_BACKEND_URL` environment
//! variable (or a `.env` file during development).

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "nearby";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default backend base URL
const DEFAULT_BACKEND_URL: &str = "https://api.nearby.app";

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile networks while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Keychain service name under which session fields are stored
const DEFAULT_KEYRING_SERVICE: &str = "nearby";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub keyring_service: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when no file exists.
    /// `NEARBY_BACKEND_URL` always wins over the file value.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("NEARBY_BACKEND_URL") {
            if !url.is_empty() {
                config.backend_url = url;
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
