use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_CONTEXT_WINDOW: usize = 6;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub agent_url: String,
    pub market_url: String,
    pub ml_url: String,
    pub watchlist: Vec<String>,
    pub history_days: u32,
    /// Number of prior messages sent with each analyst question.
    pub context_window: usize,
    /// Appended to the error text when the analyst cannot be reached.
    pub fallback_hint: String,
    /// Upper bound on any single service request. The forecast service trains
    /// before answering, so this is generous.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            agent_url: "http://127.0.0.1:5002".to_string(),
            market_url: "http://127.0.0.1:5000".to_string(),
            ml_url: "http://127.0.0.1:5001".to_string(),
            watchlist: ["AAPL", "MSFT", "NVDA", "TSLA", "AMZN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            history_days: 90,
            context_window: DEFAULT_CONTEXT_WINDOW,
            fallback_hint: "Make sure the **agent server** is running and reachable.".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_watchlist(watchlist: &[String]) -> Result<()> {
        Self::save_watchlist_to(&Self::get_config_path()?, watchlist)
    }

    /// Rewrite only the watchlist in the file at `path`. The file is read
    /// without env overrides so they never get persisted.
    pub fn save_watchlist_to(path: &Path, watchlist: &[String]) -> Result<()> {
        let mut config = Self::load_from(path).unwrap_or_else(|_| Self::new());
        config.watchlist = watchlist.to_vec();
        config.save_to(path)
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("QUANTDESK_AGENT_URL") {
            self.agent_url = url;
        }
        if let Some(url) = lookup("QUANTDESK_MARKET_URL") {
            self.market_url = url;
        }
        if let Some(url) = lookup("QUANTDESK_ML_URL") {
            self.ml_url = url;
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("quantdesk"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
