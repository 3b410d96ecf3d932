//! Configuration management for LoboShop.
//!
//! Loads configuration from ${LOBOSHOP_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "LOBOSHOP_BASE_URL";

pub mod paths {
    //! Path resolution for LoboShop configuration and data directories.
    //!
    //! LOBOSHOP_HOME resolution order:
    //! 1. LOBOSHOP_HOME environment variable (if set)
    //! 2. ~/.config/loboshop (default)
    //! 3. ./.loboshop when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the LoboShop home directory.
    pub fn loboshop_home() -> PathBuf {
        if let Ok(home) = std::env::var("LOBOSHOP_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".loboshop"),
            |h| h.join(".config").join("loboshop"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        loboshop_home().join("config.toml")
    }

    /// Returns the path to the persisted session store.
    pub fn storage_path() -> PathBuf {
        loboshop_home().join("storage.json")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        loboshop_home().join("logs")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST API, including the version prefix.
    pub base_url: String,
    /// Timeout for regular requests.
    pub request_timeout_secs: u64,
    /// Timeout for multipart product uploads.
    pub upload_timeout_secs: u64,
    /// Evict the session when a request for the current token gets a 401.
    pub evict_on_unauthorized: bool,
    /// Evict the saved session when startup validation cannot reach the server.
    pub evict_on_unreachable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            upload_timeout_secs: 30,
            evict_on_unauthorized: true,
            evict_on_unreachable: false,
        }
    }
}

impl Config {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:3000/api/v1";

    /// Loads configuration from the default path.
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the default config template to `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Resolves the base URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the chosen URL is malformed.
    pub fn effective_base_url(&self) -> Result<String> {
        resolve_base_url(std::env::var(BASE_URL_ENV).ok().as_deref(), &self.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// Returns the commented config template written by `config init`.
pub fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Resolves a base URL with precedence: env > config > default.
///
/// Blank values are skipped. Trailing slashes are trimmed so paths can be
/// appended with a single `/`.
///
/// # Errors
/// Returns an error if the chosen URL is malformed.
pub fn resolve_base_url(env_value: Option<&str>, config_value: &str) -> Result<String> {
    let chosen = [env_value, Some(config_value)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(Config::DEFAULT_BASE_URL);

    url::Url::parse(chosen).with_context(|| format!("Invalid LoboShop base URL: {chosen}"))?;
    Ok(chosen.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.upload_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = \"https://api.loboshop.mx/v1\"\nevict_on_unreachable = true\n")
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://api.loboshop.mx/v1");
        assert!(config.evict_on_unreachable);
        assert!(config.evict_on_unauthorized);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_init_writes_template_and_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::init(&path).unwrap();
        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed, Config::default());

        let err = Config::init(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_resolve_base_url_precedence() {
        assert_eq!(
            resolve_base_url(Some("http://env:1/api/"), "http://cfg:2/api").unwrap(),
            "http://env:1/api"
        );
        assert_eq!(
            resolve_base_url(Some("  "), "http://cfg:2/api").unwrap(),
            "http://cfg:2/api"
        );
        assert_eq!(
            resolve_base_url(None, "").unwrap(),
            Config::DEFAULT_BASE_URL
        );
    }

    #[test]
    fn test_resolve_base_url_rejects_garbage() {
        let err = resolve_base_url(Some("not a url"), "").unwrap_err();
        assert!(err.to_string().contains("Invalid LoboShop base URL"));
    }
}
