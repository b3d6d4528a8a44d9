use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Notification delivered by the OS while the app is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl IncomingNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            data: serde_json::Value::Null,
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Boxed async notification handler.
pub type NotificationHandler = Arc<dyn Fn(IncomingNotification) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, NotificationHandler)>>,
}

/// Fan-out point for received notifications. Platform code calls
/// [`NotificationHub::dispatch`]; consumers subscribe.
#[derive(Clone, Default)]
pub struct NotificationHub {
    handlers: Arc<Handlers>,
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays active until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn on_notification_received<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(IncomingNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.handlers.next_id.fetch_add(1, Ordering::Relaxed);
        let boxed: NotificationHandler =
            Arc::new(move |n| -> HandlerFuture { Box::pin(handler(n)) });
        self.handlers.entries.write().push((id, boxed));

        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.entries.read().len()
    }

    /// Deliver a notification to every current subscriber, in subscription
    /// order. Returns the number of handlers run.
    pub async fn dispatch(&self, notification: IncomingNotification) -> usize {
        let handlers: Vec<NotificationHandler> = self
            .handlers
            .entries
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        tracing::debug!(subscribers = handlers.len(), "Dispatching notification");
        for handler in &handlers {
            handler(notification.clone()).await;
        }
        handlers.len()
    }
}

/// Handle returned by [`NotificationHub::on_notification_received`].
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: u64,
    handlers: Weak<Handlers>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.entries.write().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn dispatch_reaches_all_subscribers_in_order() {
        let hub = NotificationHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            let _ = hub.on_notification_received(move |n| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(format!("{tag}:{}", n.title.unwrap_or_default()));
                }
            });
        }

        let count = hub.dispatch(IncomingNotification::new("New booking", "Room 12")).await;
        assert_eq!(count, 2);
        assert_eq!(*seen.lock(), vec!["a:New booking", "b:New booking"]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = NotificationHub::new();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = hits.clone();
        let subscription = hub.on_notification_received(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        hub.dispatch(IncomingNotification::default()).await;
        subscription.unsubscribe();
        hub.dispatch(IncomingNotification::default()).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_after_hub_dropped_is_harmless() {
        let hub = NotificationHub::new();
        let subscription = hub.on_notification_received(|_| async {});
        drop(hub);
        subscription.unsubscribe();
    }
}
