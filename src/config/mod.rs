//! Client configuration.
//!
//! Loaded from `config.toml` in the platform config directory, then
//! overridden by environment variables:
//! - `STAYDESK_API_URL` → `api.base_url`
//! - `STAYDESK_DATA_DIR` → `storage.data_dir`
//! - `STAYDESK_DEVICE_TOKEN` → `push.device_token`

pub mod schema;

pub use schema::{ApiConfig, Config, PushConfig, SessionConfig, StorageConfig};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "trackerstay", "staydesk")
}

impl Config {
    /// Default location of `config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), apply
    /// environment overrides and validate. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(ref path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config at {}", path.display()))?
            }
            _ => Self::default(),
        };

        config.apply_overrides_from(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// JSON Schema describing `config.toml`.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("STAYDESK_API_URL") {
            self.api.base_url = url;
        }
        if let Some(dir) = non_empty("STAYDESK_DATA_DIR") {
            self.storage.data_dir = Some(dir);
        }
        if let Some(token) = non_empty("STAYDESK_DEVICE_TOKEN") {
            self.push.device_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            bail!("api.base_url cannot be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("api.base_url must start with http:// or https:// (got '{url}')");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Directory for persisted records.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage.data_dir {
            let expanded = shellexpand::tilde(dir);
            return Ok(PathBuf::from(expanded.as_ref()));
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("No home directory found; set storage.data_dir or STAYDESK_DATA_DIR")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn expiry_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.session.expiry_redirect_delay_ms)
    }
}
