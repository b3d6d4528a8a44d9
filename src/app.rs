//! Composition root.
//!
//! [`FrontDesk`] wires storage, the session store, the API client, push
//! registration and the notification inbox together. Hosts create one per
//! process, call [`FrontDesk::init`] at startup and [`FrontDesk::dispose`]
//! before exiting.

use crate::api::{ApiClient, Navigator};
use crate::config::Config;
use crate::notifications::{NotificationHub, NotificationInbox, Subscription};
use crate::push::{PushCoordinator, PushPlatform, StaticPushPlatform};
use crate::services::{BookingService, UtilityService};
use crate::session::{ClearReason, Session, SessionCell, SessionStore};
use crate::storage::{FileStore, KeyValueStore};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct FrontDesk {
    config: Config,
    storage: Arc<dyn KeyValueStore>,
    api: ApiClient,
    session: SessionStore,
    push: Arc<PushCoordinator>,
    hub: NotificationHub,
    inbox: Arc<NotificationInbox>,
    bookings: BookingService,
    utilities: UtilityService,
    inbox_subscription: Mutex<Option<Subscription>>,
}

impl FrontDesk {
    /// Assemble the client from explicit collaborators.
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        push_platform: Arc<dyn PushPlatform>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        config.validate()?;

        let cell = Arc::new(SessionCell::new(Arc::clone(&storage)));
        let api = ApiClient::from_config(&config, cell, navigator)?;
        let session = SessionStore::new(api.clone(), config.api.device_name.clone());
        let push = PushCoordinator::new(api.clone(), Arc::clone(&storage), push_platform);

        Ok(Self {
            inbox: Arc::new(NotificationInbox::new(Arc::clone(&storage))),
            hub: NotificationHub::new(),
            bookings: BookingService::new(api.clone()),
            utilities: UtilityService::new(api.clone()),
            inbox_subscription: Mutex::new(None),
            config,
            storage,
            api,
            session,
            push,
        })
    }

    /// File-backed storage under the configured data directory; the push
    /// token comes from configuration.
    pub fn from_config(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let data_dir = config.data_dir()?;
        tracing::debug!(data_dir = %data_dir.display(), "Using file storage");

        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir));
        let platform = Arc::new(StaticPushPlatform::new(
            config.push.platform,
            config.push.device_token.clone(),
        ));
        Self::new(config, storage, platform, navigator)
    }

    /// Restore persisted state and start push registration.
    ///
    /// Returns the restored session, if any. Never fails: storage problems
    /// are logged and treated as a fresh install.
    pub async fn init(&self) -> Option<Session> {
        let notifications = self.inbox.load().await;
        self.subscribe_inbox();

        let session = self.session.load_from_storage().await;
        tracing::info!(
            authenticated = session.is_some(),
            notifications,
            "Front desk initialized"
        );

        if self.config.push.enabled {
            self.push.acquire_device_token().await;
        } else {
            tracing::debug!("Push disabled in configuration");
        }
        session
    }

    fn subscribe_inbox(&self) {
        let mut slot = self.inbox_subscription.lock();
        if slot.is_some() {
            return;
        }

        let inbox = Arc::clone(&self.inbox);
        *slot = Some(self.hub.on_notification_received(move |notification| {
            let inbox = Arc::clone(&inbox);
            async move {
                if let Err(e) = inbox.record(&notification).await {
                    tracing::warn!("Failed to store notification: {e:#}");
                }
            }
        }));
    }

    /// Wait for background registration and detach listeners.
    pub async fn dispose(&self) {
        self.push.settle().await;
        if let Some(subscription) = self.inbox_subscription.lock().take() {
            subscription.unsubscribe();
        }
        tracing::debug!("Front desk disposed");
    }

    /// Drop every local record: session, device token, notifications.
    /// The backend is not contacted.
    pub async fn reset_data(&self) -> Result<()> {
        self.push.settle().await;
        self.api.session().clear(ClearReason::Reset).await;
        self.push.forget_device_token().await?;
        self.inbox.reset();
        self.storage
            .clear_all()
            .await
            .context("Failed to clear local data")?;
        tracing::info!("Local data cleared");
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn push(&self) -> &Arc<PushCoordinator> {
        &self.push
    }

    pub fn notifications(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn inbox(&self) -> &NotificationInbox {
        &self.inbox
    }

    pub fn bookings(&self) -> &BookingService {
        &self.bookings
    }

    pub fn utilities(&self) -> &UtilityService {
        &self.utilities
    }
}

impl std::fmt::Debug for FrontDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontDesk")
            .field("api", &self.api)
            .field("session", &self.session.state())
            .field("push", &self.push)
            .field("inbox", &self.inbox)
            .finish()
    }
}
