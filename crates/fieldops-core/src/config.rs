//! Client configuration management.
//!
//! Holds the API base URL, the auth endpoint paths, the default request
//! timeout and which backend keeps the credential slots.
//!
//! Configuration is stored at `~/.config/fieldops/config.json`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "fieldops";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "FIELDOPS_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh-token";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the token and profile slots live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// One JSON file per slot under the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing survives the process
    Memory,
}

impl fmt::Display for CredentialBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        })
    }
}

impl FromStr for CredentialBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown credential backend `{}` (file, keyring, memory)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
        }
    }
}

impl Config {
    /// Config pointing at `base_url` with every other setting at its default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Read `path` as stored, defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed credential slots
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url":"https://ops.example.org"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://ops.example.org");
        assert_eq!(config.login_path, "/api/auth/login");
        assert_eq!(config.refresh_path, "/api/auth/refresh-token");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.credential_backend, CredentialBackend::File);
    }

    #[test]
    fn test_backend_names() {
        let config: Config = serde_json::from_str(r#"{"credential_backend":"keyring"}"#).unwrap();
        assert_eq!(config.credential_backend, CredentialBackend::Keyring);
        assert_eq!("Memory".parse::<CredentialBackend>(), Ok(CredentialBackend::Memory));
        assert_eq!(CredentialBackend::Keyring.to_string(), "keyring");
        assert!("vault".parse::<CredentialBackend>().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("fieldops-config-{}-{}", std::process::id(), nanos));
        let path = dir.join(APP_NAME).join(CONFIG_FILE);

        let missing = Config::load_from(&path).unwrap();
        assert_eq!(missing.api_base_url, DEFAULT_API_BASE_URL);

        let mut config = Config::for_base_url("https://ops.example.org");
        config.credential_backend = CredentialBackend::Memory;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.api_base_url, "https://ops.example.org");
        assert_eq!(reloaded.credential_backend, CredentialBackend::Memory);
        assert_eq!(reloaded.login_path, DEFAULT_LOGIN_PATH);

        let _ = std::fs::remove_dir_all(dir);
    }
}
