use super::platform::{DeviceToken, PermissionStatus, Platform, PushPlatform};
use crate::api::ApiClient;
use crate::session::{token_preview, ClearReason, Session, SessionObserver};
use crate::storage::{KeyValueStore, DEVICE_TOKEN_KEY};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

const DEVICE_TOKEN_PATH: &str = "/user/device-token";

#[derive(Serialize)]
struct DeviceTokenPayload<'a> {
    device_token: &'a str,
    device_type: &'a str,
}

/// Gets the device push token and registers it with the backend once per
/// authenticated session.
///
/// Registration is attempted when a token is known, a session is
/// authenticated, and that token has not been acknowledged yet. Attempts
/// are serialized; failures are logged and never surface to callers.
pub struct PushCoordinator {
    api: ApiClient,
    storage: Arc<dyn KeyValueStore>,
    platform: Arc<dyn PushPlatform>,
    token: RwLock<Option<String>>,
    /// Token value last acknowledged by the backend in this session.
    registered_for: Mutex<Option<String>>,
    /// Bumped whenever the session ends; stale acknowledgements are dropped.
    epoch: AtomicU64,
    disabled: AtomicBool,
    attempt: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    me: Weak<PushCoordinator>,
}

impl PushCoordinator {
    /// Create the coordinator and subscribe it to session events.
    pub fn new(
        api: ApiClient,
        storage: Arc<dyn KeyValueStore>,
        platform: Arc<dyn PushPlatform>,
    ) -> Arc<Self> {
        let coordinator = Arc::new_cyclic(|me| Self {
            api,
            storage,
            platform,
            token: RwLock::new(None),
            registered_for: Mutex::new(None),
            epoch: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
            attempt: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            me: me.clone(),
        });

        let observer: Arc<dyn SessionObserver> = coordinator.clone();
        coordinator.api.session().add_observer(Arc::downgrade(&observer));
        coordinator
    }

    pub fn platform(&self) -> Platform {
        self.platform.platform()
    }

    /// Whether token acquisition gave up for this run.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Current token and its registration status.
    pub fn device_token(&self) -> Option<DeviceToken> {
        let value = self.token.read().clone()?;
        let registered = self.registered_for.lock().as_deref() == Some(value.as_str());
        Some(DeviceToken {
            value,
            platform: self.platform(),
            registered,
        })
    }

    pub fn is_registered(&self) -> bool {
        self.device_token().is_some_and(|t| t.registered)
    }

    // ── Token acquisition ───────────────────────────────────────

    /// Ask the OS for a push token, persist it and re-evaluate
    /// registration. Any failure disables push for this run and yields
    /// `None`.
    pub async fn acquire_device_token(&self) -> Option<DeviceToken> {
        if self.is_disabled() {
            tracing::debug!("Push disabled for this run; skipping token acquisition");
            return None;
        }

        let value = match self.request_os_token().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.disabled.store(true, Ordering::Release);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to get push token: {e:#}");
                self.disabled.store(true, Ordering::Release);
                return None;
            }
        };

        if self.platform() == Platform::Android {
            if let Err(e) = self.platform.configure_default_channel().await {
                tracing::warn!("Failed to configure notification channel: {e:#}");
            }
        }

        Some(self.adopt_device_token(value).await)
    }

    async fn request_os_token(&self) -> anyhow::Result<Option<String>> {
        if !self.platform.is_physical_device() {
            tracing::warn!("Push notifications require a physical device");
            return Ok(None);
        }

        let mut status = self.platform.permission_status().await?;
        if status != PermissionStatus::Granted {
            status = self.platform.request_permission().await?;
        }
        if status != PermissionStatus::Granted {
            tracing::warn!(?status, "Push notification permission not granted");
            return Ok(None);
        }

        let token = self.platform.fetch_token().await?;
        if token.trim().is_empty() {
            anyhow::bail!("OS returned an empty push token");
        }
        Ok(Some(token))
    }

    /// Take a token obtained outside the platform trait (host hand-off),
    /// persist it and schedule registration.
    pub async fn adopt_device_token(&self, value: String) -> DeviceToken {
        tracing::info!(
            token = %token_preview(&value),
            platform = %self.platform(),
            "Got device push token"
        );
        if let Err(e) = self.storage.set(DEVICE_TOKEN_KEY, &value).await {
            tracing::warn!("Failed to persist device token: {e:#}");
        }
        *self.token.write() = Some(value.clone());
        self.disabled.store(false, Ordering::Release);

        self.schedule();
        DeviceToken {
            registered: self.registered_for.lock().as_deref() == Some(value.as_str()),
            value,
            platform: self.platform(),
        }
    }

    /// Persisted token, regardless of what this run acquired.
    pub async fn stored_device_token(&self) -> anyhow::Result<Option<String>> {
        self.storage.get(DEVICE_TOKEN_KEY).await
    }

    /// Drop the token from memory and storage (explicit data reset).
    pub async fn forget_device_token(&self) -> anyhow::Result<()> {
        *self.token.write() = None;
        *self.registered_for.lock() = None;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.storage.remove(DEVICE_TOKEN_KEY).await
    }

    // ── Registration ────────────────────────────────────────────

    /// POST the token to the backend. `true` once acknowledged; repeated
    /// calls for an acknowledged token make no request.
    pub async fn register_with_backend(&self, token: &str, platform: Platform) -> bool {
        if self.registered_for.lock().as_deref() == Some(token) {
            tracing::debug!("Device token already registered");
            return true;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let payload = DeviceTokenPayload {
            device_token: token,
            device_type: platform.as_str(),
        };

        tracing::info!(token = %token_preview(token), %platform, "Registering device token");
        let response: Value = match self.api.post_json(DEVICE_TOKEN_PATH, &payload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(status = ?e.status(), "Device token registration failed: {e}");
                return false;
            }
        };

        if !acknowledged(&response) {
            tracing::warn!(%response, "Backend did not acknowledge device token");
            return false;
        }

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!("Session ended during registration; discarding acknowledgement");
            return false;
        }

        *self.registered_for.lock() = Some(token.to_string());
        tracing::info!("Device token registered");
        true
    }

    /// Register now if a token is known and a session is active. Returns
    /// whether the current token is registered afterwards.
    pub async fn register_now(&self) -> bool {
        let _attempt = self.attempt.lock().await;

        let Some(token) = self.token.read().clone() else {
            tracing::debug!("No device token yet; registration deferred");
            return false;
        };
        if !self.api.session().is_authenticated() {
            tracing::debug!("Not authenticated; registration deferred");
            return false;
        }

        self.register_with_backend(&token, self.platform()).await
    }

    /// Fire-and-forget [`Self::register_now`].
    pub fn schedule(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; device token registration skipped");
            return;
        };

        let handle = runtime.spawn(async move {
            me.register_now().await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for scheduled registrations to finish.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<_> = std::mem::take(&mut *self.tasks.lock());
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    tracing::warn!("Registration task failed: {e}");
                }
            }
        }
    }
}

/// 2xx bodies count as acknowledged unless they say `success: false` or
/// `status: false`.
fn acknowledged(response: &Value) -> bool {
    let explicit_false = |field: &str| response.get(field).and_then(Value::as_bool) == Some(false);
    !(explicit_false("success") || explicit_false("status"))
}

impl SessionObserver for PushCoordinator {
    fn on_session_started(&self, _session: &Session) {
        self.schedule();
    }

    fn on_session_cleared(&self, reason: ClearReason) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if self.registered_for.lock().take().is_some() {
            tracing::debug!(?reason, "Device token registration reset");
        }
    }
}

impl std::fmt::Debug for PushCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCoordinator")
            .field("platform", &self.platform())
            .field("has_token", &self.token.read().is_some())
            .field("registered", &self.is_registered())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
