use super::hub::IncomingNotification;
use crate::storage::{KeyValueStore, NOTIFICATIONS_KEY};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_TITLE: &str = "No Title";
const DEFAULT_BODY: &str = "No Message";

/// A received notification as kept in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub seen: bool,
}

/// Persisted list of received notifications, newest first.
pub struct NotificationInbox {
    storage: Arc<dyn KeyValueStore>,
    items: RwLock<Vec<NotificationItem>>,
}

impl NotificationInbox {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Load the persisted list. Unreadable lists are logged and start empty.
    pub async fn load(&self) -> usize {
        let stored = match self.storage.get(NOTIFICATIONS_KEY).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to read notification inbox: {e:#}");
                None
            }
        };

        let items = stored
            .map(|raw| {
                serde_json::from_str::<Vec<NotificationItem>>(&raw).unwrap_or_else(|e| {
                    tracing::warn!("Discarding malformed notification inbox: {e}");
                    Vec::new()
                })
            })
            .unwrap_or_default();

        let count = items.len();
        *self.items.write() = items;
        count
    }

    /// Prepend a notification. Missing title/body get placeholders.
    pub async fn record(&self, notification: &IncomingNotification) -> Result<NotificationItem> {
        let item = NotificationItem {
            id: uuid::Uuid::new_v4().to_string(),
            title: non_blank(notification.title.as_deref()).unwrap_or(DEFAULT_TITLE).to_string(),
            body: non_blank(notification.body.as_deref()).unwrap_or(DEFAULT_BODY).to_string(),
            date: Utc::now(),
            seen: false,
        };

        self.items.write().insert(0, item.clone());
        self.persist().await?;
        Ok(item)
    }

    pub fn items(&self) -> Vec<NotificationItem> {
        self.items.read().clone()
    }

    pub fn unseen_count(&self) -> usize {
        self.items.read().iter().filter(|item| !item.seen).count()
    }

    /// Mark one item as seen. Returns `false` for unknown ids.
    pub async fn mark_seen(&self, id: &str) -> Result<bool> {
        let found = {
            let mut items = self.items.write();
            match items.iter_mut().find(|item| item.id == id) {
                Some(item) => {
                    item.seen = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    pub async fn mark_all_seen(&self) -> Result<()> {
        self.items.write().iter_mut().for_each(|item| item.seen = true);
        self.persist().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.items.write().clear();
        self.storage.remove(NOTIFICATIONS_KEY).await
    }

    /// Forget in-memory items without touching storage.
    pub(crate) fn reset(&self) {
        self.items.write().clear();
    }

    async fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&*self.items.read())?;
        self.storage
            .set(NOTIFICATIONS_KEY, &raw)
            .await
            .context("Failed to persist notification inbox")
    }
}

impl std::fmt::Debug for NotificationInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationInbox")
            .field("items", &self.items.read().len())
            .field("unseen", &self.unseen_count())
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
