use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{backend::HttpBackend, controller::ResponseOrdering};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Client configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// base_url = "https://my-app.vercel.app"
/// timeout_secs = 10
/// ordering = "last-issued"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the `/api/...` routes live.
    pub base_url: String,

    pub timeout_secs: u64,

    pub ordering: ResponseOrdering,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            ordering: ResponseOrdering::default(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Replace the base URL after checking it is an absolute http(s) URL.
    pub fn set_base_url(&mut self, raw: &str) -> Result<()> {
        let url = Url::parse(raw.trim()).with_context(|| format!("Invalid base URL: {raw}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Unsupported scheme '{}' in base URL. Use http:// or https://.",
                url.scheme()
            ));
        }
        self.base_url = url.as_str().trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn backend(&self) -> Result<HttpBackend> {
        HttpBackend::new(self.base_url.clone(), self.timeout())
            .context("Failed to build HTTP client")
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "dashboard", "dashboard-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
