use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use serde::{Deserialize, Serialize};

use crate::discogs_rs::DISCOGS_API_BASE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    database: String,
    pub discogs: DiscogsConfig,
    pub clickhouse: Option<ClickHouseConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscogsConfig {
    pub api_base: String,
    /// Default user for `disq sync`
    pub user: Option<String>,
    /// Personal access token, optional for public collections
    pub token: Option<String>,
    pub per_page: u32,
    /// Fixed wait between page requests, e.g. "2s"
    pub page_delay: String,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// HTTP interface, e.g. http://localhost:8123
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let database = dirs::data_dir()
            .map(|dir| dir.join("disq").join("collection.db"))
            .unwrap_or_else(|| PathBuf::from("collection.db"));

        Self {
            database: database.to_string_lossy().to_string(),
            discogs: DiscogsConfig::default(),
            clickhouse: None,
        }
    }
}

impl Default for DiscogsConfig {
    fn default() -> Self {
        Self {
            api_base: DISCOGS_API_BASE.to_string(),
            user: None,
            token: None,
            per_page: 250,
            page_delay: "2s".to_string(),
            // Unauthenticated Discogs limit
            requests_per_minute: 25,
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "default".to_string(),
            username: "default".to_string(),
            password: None,
        }
    }
}

impl DiscogsConfig {
    pub fn page_delay(&self) -> Result<Duration> {
        humantime::parse_duration(&self.page_delay)
            .wrap_err_with(|| format!("Invalid discogs.page_delay '{}'", self.page_delay))
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("disq").join("config.toml"))
    }

    /// Load the default config file, falling back to built-in defaults when it doesn't exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write the default config to the default path, if no file exists there yet
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or(eyre!("No config directory on this platform"))?;
        Self::default().write_if_missing(&path)?;
        Ok(path)
    }

    fn write_if_missing(&self, path: &Path) -> Result<bool> {
        if path.exists() {
            log::info!("Config already exists at: {}", path.display());
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .context(format!("Failed to write config file: {}", path.display()))?;
        log::info!("Wrote default config to: {}", path.display());
        Ok(true)
    }

    fn validate(&self) -> Result<()> {
        self.discogs.page_delay()?;
        if self.discogs.requests_per_minute == 0 {
            return Err(eyre!("discogs.requests_per_minute must be greater than 0"));
        }
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    /// Get expanded database path
    pub fn database_path(&self) -> PathBuf {
        self.expand_path(&self.database)
    }
}
