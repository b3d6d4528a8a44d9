#![forbid(unsafe_code)]

//! staydesk Android bridge
//!
//! UniFFI bindings exposing the front-desk client core to Kotlin:
//! - session restore, login and logout
//! - auth status and login-redirect polling after a session expiry
//! - device push-token hand-off from Firebase Messaging
//! - notification dispatch into the inbox, unseen count
//!
//! Kotlin calls are synchronous; async work runs on a shared Tokio runtime
//! via `block_on`. Background registration keeps running on that runtime
//! after the call returns.

use staydesk::api::Navigator;
use staydesk::config::Config;
use staydesk::notifications::IncomingNotification;
use staydesk::push::{Platform, PresentationOptions, PushPlatform, StaticPushPlatform};
use staydesk::storage::{FileStore, KeyValueStore};
use staydesk::{FrontDesk, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

uniffi::setup_scaffolding!();

/// Global runtime for async operations
static RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();

fn runtime() -> Result<&'static Runtime, BridgeError> {
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| tracing::error!("Failed to create Tokio runtime: {e}"))
                .ok()
        })
        .as_ref()
        .ok_or(BridgeError::RuntimeUnavailable)
}

/// Settings passed from Kotlin at startup
#[derive(Debug, Clone, uniffi::Record)]
pub struct BridgeConfig {
    /// App files directory; records are stored here.
    pub data_dir: String,
    /// Overrides the default API root.
    pub base_url: Option<String>,
    /// Overrides the default login device name.
    pub device_name: Option<String>,
}

/// Authentication state exposed to Kotlin
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum AuthStatus {
    Loading,
    Authenticated { email: Option<String>, name: Option<String> },
    Unauthenticated,
}

impl From<SessionState> for AuthStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Uninitialized | SessionState::Loading => Self::Loading,
            SessionState::Authenticated(session) => Self::Authenticated {
                email: session.user.email().map(String::from),
                name: session.user.name().map(String::from),
            },
            SessionState::Unauthenticated => Self::Unauthenticated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct DeviceTokenInfo {
    pub value: String,
    pub platform: String,
    pub registered: bool,
}

/// Foreground presentation flags for the notification handler
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct NotificationPresentation {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
    pub show_banner: bool,
    pub show_list: bool,
}

impl From<PresentationOptions> for NotificationPresentation {
    fn from(options: PresentationOptions) -> Self {
        Self {
            show_alert: options.show_alert,
            play_sound: options.play_sound,
            set_badge: options.set_badge,
            show_banner: options.show_banner,
            show_list: options.show_list,
        }
    }
}

/// Records a pending redirect for Kotlin to poll; the activity decides when
/// to navigate.
#[derive(Debug, Default)]
struct FlagNavigator {
    login_required: AtomicBool,
}

impl Navigator for FlagNavigator {
    fn redirect_to_login(&self) {
        tracing::info!("Login redirect requested");
        self.login_required.store(true, Ordering::Release);
    }
}

/// Main front-desk controller exposed to Android
#[derive(uniffi::Object)]
pub struct FrontDeskController {
    desk: FrontDesk,
    navigator: Arc<FlagNavigator>,
}

#[uniffi::export]
impl FrontDeskController {
    /// Create a controller storing its records under `config.data_dir`
    #[uniffi::constructor]
    pub fn new(config: BridgeConfig) -> Result<Arc<Self>, BridgeError> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("staydesk=info,staydesk_android=info")
            .try_init();

        let navigator = Arc::new(FlagNavigator::default());
        let desk = build_desk(config, navigator.clone()).map_err(|e| BridgeError::Config {
            message: format!("{e:#}"),
        })?;

        Ok(Arc::new(Self { desk, navigator }))
    }

    /// Restore the persisted session. Call once at startup.
    pub fn init(&self) -> Result<AuthStatus, BridgeError> {
        runtime()?.block_on(self.desk.init());
        Ok(self.auth_status())
    }

    pub fn login(&self, email: String, password: String) -> Result<AuthStatus, BridgeError> {
        runtime()?.block_on(self.desk.session().login(&email, &password))?;
        self.navigator.login_required.store(false, Ordering::Release);
        Ok(self.auth_status())
    }

    /// Never fails; local state is cleared even if the backend is down.
    pub fn logout(&self) -> Result<(), BridgeError> {
        runtime()?.block_on(self.desk.session().logout());
        Ok(())
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.desk.session().state().into()
    }

    /// `true` once after a session expiry; the UI should show the login
    /// screen.
    pub fn take_login_redirect(&self) -> bool {
        self.navigator.login_required.swap(false, Ordering::AcqRel)
    }

    /// Hand over the FCM token obtained on the Kotlin side. Registration
    /// runs in the background once a session exists.
    pub fn set_device_token(&self, token: String) -> Result<DeviceTokenInfo, BridgeError> {
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(BridgeError::InvalidInput {
                message: "Device token is empty".into(),
            });
        }
        let adopted = runtime()?.block_on(self.desk.push().adopt_device_token(token));
        Ok(DeviceTokenInfo {
            value: adopted.value,
            platform: adopted.platform.to_string(),
            registered: adopted.registered,
        })
    }

    pub fn device_token(&self) -> Option<DeviceTokenInfo> {
        self.desk.push().device_token().map(|t| DeviceTokenInfo {
            value: t.value,
            platform: t.platform.to_string(),
            registered: t.registered,
        })
    }

    /// Manual registration (debug screen).
    pub fn register_device_token(&self) -> Result<bool, BridgeError> {
        Ok(runtime()?.block_on(self.desk.push().register_now()))
    }

    pub fn presentation(&self) -> NotificationPresentation {
        PresentationOptions::for_platform(self.desk.push().platform()).into()
    }

    /// Forward a received notification. `data_json` is the payload's data
    /// map, if any. Returns the number of listeners that handled it.
    pub fn dispatch_notification(
        &self,
        title: Option<String>,
        body: Option<String>,
        data_json: Option<String>,
    ) -> Result<u32, BridgeError> {
        let data = match data_json {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| BridgeError::InvalidInput {
                message: format!("Invalid notification data: {e}"),
            })?,
            None => serde_json::Value::Null,
        };
        let notification = IncomingNotification { title, body, data };
        let handled = runtime()?.block_on(self.desk.notifications().dispatch(notification));
        Ok(u32::try_from(handled).unwrap_or(u32::MAX))
    }

    pub fn unseen_notification_count(&self) -> u32 {
        u32::try_from(self.desk.inbox().unseen_count()).unwrap_or(u32::MAX)
    }

    pub fn mark_all_notifications_seen(&self) -> Result<(), BridgeError> {
        runtime()?
            .block_on(self.desk.inbox().mark_all_seen())
            .map_err(storage_error)
    }

    /// Clear session, device token and notifications.
    pub fn reset_data(&self) -> Result<(), BridgeError> {
        runtime()?
            .block_on(self.desk.reset_data())
            .map_err(storage_error)
    }

    /// Wait for background work; call from `onDestroy`.
    pub fn dispose(&self) -> Result<(), BridgeError> {
        runtime()?.block_on(self.desk.dispose());
        Ok(())
    }
}

fn build_desk(config: BridgeConfig, navigator: Arc<FlagNavigator>) -> anyhow::Result<FrontDesk> {
    if config.data_dir.trim().is_empty() {
        anyhow::bail!("data_dir is required");
    }

    let mut settings = Config::default();
    if let Some(url) = config.base_url.filter(|u| !u.trim().is_empty()) {
        settings.api.base_url = url;
    }
    if let Some(name) = config.device_name.filter(|n| !n.trim().is_empty()) {
        settings.api.device_name = name;
    }
    settings.push.platform = Platform::Android;
    settings.storage.data_dir = Some(config.data_dir.clone());

    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.data_dir));
    // Tokens arrive through `set_device_token`, never from the trait.
    let platform: Arc<dyn PushPlatform> =
        Arc::new(StaticPushPlatform::new(Platform::Android, None));
    FrontDesk::new(settings, storage, platform, navigator)
}

/// Errors that can occur in the bridge
#[derive(Debug, Clone, PartialEq, uniffi::Error)]
pub enum BridgeError {
    NotReady,
    Network { message: String },
    SessionExpired,
    Server { message: String },
    Api { status: u16, message: String },
    InvalidResponse { message: String },
    InvalidInput { message: String },
    Config { message: String },
    Storage { message: String },
    RuntimeUnavailable,
}

impl From<staydesk::Error> for BridgeError {
    fn from(err: staydesk::Error) -> Self {
        use staydesk::Error as E;
        let message = err.to_string();
        match err {
            E::NotReady => Self::NotReady,
            E::Network { .. } => Self::Network { message },
            E::SessionExpired => Self::SessionExpired,
            E::Server { .. } => Self::Server { message },
            E::Api { status, .. } => Self::Api { status, message },
            E::InvalidServerResponse(_) => Self::InvalidResponse { message },
            E::InvalidInput(_) => Self::InvalidInput { message },
        }
    }
}

fn storage_error(err: anyhow::Error) -> BridgeError {
    BridgeError::Storage {
        message: format!("{err:#}"),
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "Session is still loading"),
            Self::SessionExpired => write!(f, "Session expired. Please log in again."),
            Self::Network { message }
            | Self::Server { message }
            | Self::Api { message, .. }
            | Self::InvalidResponse { message }
            | Self::InvalidInput { message } => write!(f, "{message}"),
            Self::Config { message } => write!(f, "Config error: {message}"),
            Self::Storage { message } => write!(f, "Storage error: {message}"),
            Self::RuntimeUnavailable => write!(f, "Async runtime unavailable"),
        }
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn controller(tmp: &TempDir) -> Arc<FrontDeskController> {
        FrontDeskController::new(BridgeConfig {
            data_dir: tmp.path().to_string_lossy().into_owned(),
            base_url: Some("http://127.0.0.1:9".into()),
            device_name: None,
        })
        .unwrap()
    }

    #[test]
    fn test_fresh_install_is_unauthenticated() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp);
        assert_eq!(controller.auth_status(), AuthStatus::Loading);
        assert_eq!(controller.init().unwrap(), AuthStatus::Unauthenticated);
        assert!(!controller.take_login_redirect());
    }

    #[test]
    fn test_login_without_backend_is_network_error() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp);
        controller.init().unwrap();

        let err = controller.login("a@b.com".into(), "pw".into()).unwrap_err();
        assert!(matches!(err, BridgeError::Network { .. }));
        assert_eq!(controller.auth_status(), AuthStatus::Unauthenticated);
    }

    #[test]
    fn test_device_token_hand_off() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp);
        controller.init().unwrap();

        assert!(controller.set_device_token("   ".into()).is_err());
        let info = controller.set_device_token("fcm-1".into()).unwrap();
        assert_eq!(info.platform, "android");
        assert!(!info.registered);
        controller.dispose().unwrap();
        assert_eq!(controller.device_token().unwrap().value, "fcm-1");
    }

    #[test]
    fn test_notifications_reach_inbox() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp);
        controller.init().unwrap();

        let handled = controller
            .dispatch_notification(
                Some("New booking".into()),
                None,
                Some(r#"{"booking_id":7}"#.into()),
            )
            .unwrap();
        assert_eq!(handled, 1);
        assert_eq!(controller.unseen_notification_count(), 1);

        controller.mark_all_notifications_seen().unwrap();
        assert_eq!(controller.unseen_notification_count(), 0);
        assert!(controller
            .dispatch_notification(None, None, Some("{oops".into()))
            .is_err());
    }

    #[test]
    fn test_missing_data_dir_is_config_error() {
        let result = FrontDeskController::new(BridgeConfig {
            data_dir: " ".into(),
            base_url: None,
            device_name: None,
        });
        assert!(matches!(result, Err(BridgeError::Config { .. })));
    }

    #[test]
    fn test_android_presentation() {
        let tmp = TempDir::new().unwrap();
        let presentation = controller(&tmp).presentation();
        assert!(presentation.show_alert && !presentation.show_banner);
    }
}
