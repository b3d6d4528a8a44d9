use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mobile OS a device token belongs to. Sent to the backend as
/// `device_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => bail!("Unknown platform '{other}' (expected 'ios' or 'android')"),
        }
    }
}

/// Push token plus its backend registration status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    pub value: String,
    pub platform: Platform,
    pub registered: bool,
}

/// Notification permission as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// How a notification is presented while the app is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresentationOptions {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
    pub show_banner: bool,
    pub show_list: bool,
}

impl PresentationOptions {
    /// Alert, sound and badge everywhere; banner and list are iOS-only.
    pub fn for_platform(platform: Platform) -> Self {
        let ios = platform == Platform::Ios;
        Self {
            show_alert: true,
            play_sound: true,
            set_badge: true,
            show_banner: ios,
            show_list: ios,
        }
    }
}

// ── OS push service ─────────────────────────────────────────────

/// Host push service: permissions, token retrieval, channel setup.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    /// Push tokens are only issued to physical devices.
    fn is_physical_device(&self) -> bool;

    async fn permission_status(&self) -> Result<PermissionStatus>;

    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Fetch the OS push token.
    async fn fetch_token(&self) -> Result<String>;

    /// Create the default notification channel (Android only).
    async fn configure_default_channel(&self) -> Result<()> {
        Ok(())
    }
}

/// Push platform backed by a token handed in by the host (configuration,
/// FFI callers). Permission is considered granted once a token exists.
#[derive(Debug)]
pub struct StaticPushPlatform {
    platform: Platform,
    physical: bool,
    token: RwLock<Option<String>>,
}

impl StaticPushPlatform {
    pub fn new(platform: Platform, token: Option<String>) -> Self {
        Self {
            platform,
            physical: true,
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    /// Emulator/simulator: never yields a token.
    pub fn simulator(platform: Platform) -> Self {
        Self {
            platform,
            physical: false,
            token: RwLock::new(None),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }
}

#[async_trait]
impl PushPlatform for StaticPushPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_physical_device(&self) -> bool {
        self.physical
    }

    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(if self.token.read().is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Undetermined
        })
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        Ok(if self.token.read().is_some() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }

    async fn fetch_token(&self) -> Result<String> {
        match self.token.read().clone() {
            Some(token) => Ok(token),
            None => bail!("No push token available"),
        }
    }
}
