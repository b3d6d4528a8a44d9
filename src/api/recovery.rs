//! Session-expiry recovery.
//!
//! A 401 on any authenticated call runs one clear-and-redirect sequence:
//! the persisted session is dropped (observers reset the push registration
//! flag), and after a short delay the user is sent to the login entry point.
//! Concurrent 401s collapse into the sequence already in flight. A 401 for
//! a token that has since been replaced leaves the newer session alone, and
//! the redirect is skipped if someone signed in during the delay.

use crate::session::{ClearReason, SessionCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Moves the user to the login entry point.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator for headless hosts: just logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect_to_login(&self) {
        tracing::warn!("Session expired; login required");
    }
}

/// Guarded clear-and-redirect sequence.
pub struct ExpiryRecovery {
    in_flight: Arc<AtomicBool>,
    delay: Duration,
    navigator: Arc<dyn Navigator>,
}

impl ExpiryRecovery {
    pub fn new(navigator: Arc<dyn Navigator>, delay: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            delay,
            navigator,
        }
    }

    /// Whether a clear-and-redirect sequence is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run the sequence unless one is already in flight. `sent_token` is
    /// the bearer token the rejected request carried. Returns `true` if this
    /// call started the sequence.
    pub async fn trigger(&self, session: &Arc<SessionCell>, sent_token: Option<&str>) -> bool {
        let current = session.bearer_token();
        if current.is_some() && current.as_deref() != sent_token {
            tracing::debug!("401 for a replaced session; keeping the current one");
            return false;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("401 received while expiry recovery already in flight");
            return false;
        }

        tracing::warn!("Received 401; clearing session");
        session.clear(ClearReason::Expired).await;

        let in_flight = Arc::clone(&self.in_flight);
        let navigator = Arc::clone(&self.navigator);
        let session = Arc::clone(session);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if session.is_authenticated() {
                tracing::debug!("Signed in again before redirect; staying put");
            } else {
                navigator.redirect_to_login();
            }
            in_flight.store(false, Ordering::Release);
        });

        true
    }
}

impl std::fmt::Debug for ExpiryRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryRecovery")
            .field("in_flight", &self.is_in_flight())
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionState};
    use crate::storage::{KeyValueStore, MemoryStore, SESSION_KEY};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingNavigator(AtomicUsize);

    impl Navigator for CountingNavigator {
        fn redirect_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(token: &str) -> Session {
        Session::from_login_response(&serde_json::json!({
            "token": token,
            "token_type": "bearer",
            "user": {"id": 1}
        }))
        .unwrap()
    }

    async fn authenticated_cell() -> (Arc<MemoryStore>, Arc<SessionCell>) {
        let storage = Arc::new(MemoryStore::new());
        let cell = Arc::new(SessionCell::new(storage.clone()));
        cell.load().await;
        cell.establish(session("t1")).await;
        (storage, cell)
    }

    #[tokio::test]
    async fn trigger_clears_session_then_redirects_after_delay() {
        let (storage, cell) = authenticated_cell().await;
        let navigator = Arc::new(CountingNavigator::default());
        let recovery = ExpiryRecovery::new(navigator.clone(), Duration::from_millis(50));

        assert!(recovery.trigger(&cell, Some("t1")).await);
        assert_eq!(cell.state(), SessionState::Unauthenticated);
        assert!(storage.get(SESSION_KEY).await.unwrap().is_none());
        assert_eq!(navigator.0.load(Ordering::SeqCst), 0, "redirect is delayed");
        assert!(recovery.is_in_flight());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
        assert!(!recovery.is_in_flight());
    }

    #[tokio::test]
    async fn second_trigger_while_in_flight_is_ignored() {
        let (_storage, cell) = authenticated_cell().await;
        let navigator = Arc::new(CountingNavigator::default());
        let recovery = ExpiryRecovery::new(navigator.clone(), Duration::from_millis(100));

        assert!(recovery.trigger(&cell, Some("t1")).await);
        assert!(!recovery.trigger(&cell, Some("t1")).await);
        assert!(!recovery.trigger(&cell, Some("t1")).await);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_token_leaves_newer_session_alone() {
        let (_storage, cell) = authenticated_cell().await;
        cell.establish(session("t2")).await;
        let navigator = Arc::new(CountingNavigator::default());
        let recovery = ExpiryRecovery::new(navigator.clone(), Duration::from_millis(10));

        assert!(!recovery.trigger(&cell, Some("t1")).await);
        assert!(!recovery.trigger(&cell, None).await);
        assert_eq!(cell.bearer_token().as_deref(), Some("t2"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_during_delay_skips_redirect() {
        let (_storage, cell) = authenticated_cell().await;
        let navigator = Arc::new(CountingNavigator::default());
        let recovery = ExpiryRecovery::new(navigator.clone(), Duration::from_millis(100));

        assert!(recovery.trigger(&cell, Some("t1")).await);
        cell.establish(session("t2")).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 0);
        assert!(!recovery.is_in_flight());
        assert!(cell.is_authenticated());
    }
}
