use crate::push::Platform;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://demo.trackerstay.com/api";

/// Request timeout. A request that outlives it counts as a network failure.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Delay between a 401 and the redirect to login, so in-flight UI can settle.
pub const DEFAULT_EXPIRY_REDIRECT_DELAY_MS: u64 = 1200;

/// Device name reported on login.
pub const DEFAULT_DEVICE_NAME: &str = "android-mobile";

/// Top-level client configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub push: PushConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, e.g. `https://demo.trackerstay.com/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Name sent as `device_name` on login.
    pub device_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            device_name: DEFAULT_DEVICE_NAME.into(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// Milliseconds between a 401 and the redirect to the login entry point.
    pub expiry_redirect_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_redirect_delay_ms: DEFAULT_EXPIRY_REDIRECT_DELAY_MS,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted records. `~` is expanded. Defaults to the
    /// platform data directory.
    pub data_dir: Option<String>,
}

/// Push notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PushConfig {
    /// Disable to skip token acquisition entirely.
    pub enabled: bool,
    /// Platform reported to the backend as `device_type`.
    pub platform: Platform,
    /// Token to use on hosts without an OS push service (CLI, emulators).
    pub device_token: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            platform: Platform::Android,
            device_token: None,
        }
    }
}
