use crate::api::Error;
use crate::storage::{KeyValueStore, SESSION_KEY};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Token type assumed when the backend omits `token_type`.
const DEFAULT_TOKEN_TYPE: &str = "bearer";

// ── Records ─────────────────────────────────────────────────────

/// Opaque user record returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Authenticated identity plus bearer token.
///
/// Either fully present or absent; [`Session::from_record`] and
/// [`Session::from_login_response`] reject partial records.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub token_type: String,
    pub user: UserProfile,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &token_preview(&self.token))
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .finish()
    }
}

/// Loosely-typed view used to validate untrusted payloads.
#[derive(Deserialize)]
struct RawSession {
    token: Option<String>,
    token_type: Option<String>,
    user: Option<Value>,
}

impl Session {
    /// Validate a login response body.
    pub fn from_login_response(body: &Value) -> Result<Self, Error> {
        let raw: RawSession = serde_json::from_value(body.clone())
            .map_err(|e| Error::InvalidServerResponse(e.to_string()))?;
        Self::from_raw(raw).map_err(|reason| Error::InvalidServerResponse(reason.into()))
    }

    /// Parse a persisted record. `None` for anything malformed or partial.
    pub fn from_record(record: &str) -> Option<Self> {
        let raw: RawSession = serde_json::from_str(record).ok()?;
        Self::from_raw(raw).ok()
    }

    /// Persisted representation.
    pub fn to_record(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Value for the `Authorization` header.
    pub fn bearer_token(&self) -> &str {
        &self.token
    }

    fn from_raw(raw: RawSession) -> Result<Self, &'static str> {
        let token = raw
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or("No token received from server")?;

        let user = match raw.user {
            Some(Value::Object(fields)) if !fields.is_empty() => UserProfile(fields),
            _ => return Err("No user data received from server"),
        };

        let token_type = raw
            .token_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

        Ok(Self {
            token,
            token_type,
            user,
        })
    }
}

/// First characters of a token, for logs.
pub(crate) fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}

// ── State machine ───────────────────────────────────────────────

/// Authentication state.
///
/// `Uninitialized -> Loading -> {Authenticated, Unauthenticated}`;
/// `Authenticated -> Unauthenticated` on logout or 401;
/// `Unauthenticated -> Authenticated` only through login.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated(Session),
    Unauthenticated,
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Whether the initial load has resolved.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Unauthenticated)
    }
}

/// Why a session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Logout,
    /// 401 on an authenticated call.
    Expired,
    LoginFailed,
    /// Explicit local data reset.
    Reset,
    /// A new login replaced a live session.
    Replaced,
}

/// Receives session lifecycle events.
pub trait SessionObserver: Send + Sync {
    fn on_session_started(&self, session: &Session);
    fn on_session_cleared(&self, reason: ClearReason);
}

// ── Cell ────────────────────────────────────────────────────────

/// In-memory session state backed by the persisted `user_data` record.
///
/// Shared by the session store (writes), the API client (token reads,
/// expiry) and the push coordinator (gating).
pub struct SessionCell {
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    observers: RwLock<Vec<Weak<dyn SessionObserver>>>,
}

impl SessionCell {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            storage,
            state,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticated(_))
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.state.borrow().session().map(|s| s.token.clone())
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Register an observer. Dropped observers are pruned lazily.
    pub fn add_observer(&self, observer: Weak<dyn SessionObserver>) {
        let mut observers = self.observers.write();
        observers.retain(|o| o.strong_count() > 0);
        observers.push(observer);
    }

    fn live_observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.observers.read().iter().filter_map(Weak::upgrade).collect()
    }

    /// Load the persisted record. Malformed records are purged and treated
    /// as "no session"; nothing here fails.
    pub async fn load(&self) -> Option<Session> {
        self.state.send_replace(SessionState::Loading);

        let record = match self.storage.get(SESSION_KEY).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to read persisted session: {e:#}");
                None
            }
        };

        let session = match record {
            Some(raw) => {
                let parsed = Session::from_record(&raw);
                if parsed.is_none() {
                    tracing::warn!("Discarding malformed persisted session");
                    self.purge().await;
                }
                parsed
            }
            None => None,
        };

        match session {
            Some(ref session) => {
                tracing::info!(email = session.user.email().unwrap_or("-"), "Restored session");
                self.state.send_replace(SessionState::Authenticated(session.clone()));
            }
            None => {
                tracing::debug!("No persisted session");
                self.state.send_replace(SessionState::Unauthenticated);
            }
        }
        session
    }

    /// Persist `session`, switch to `Authenticated` and notify observers.
    ///
    /// Replacing a live session reports it as cleared first, so observers
    /// never carry state from one session into the next.
    pub async fn establish(&self, session: Session) {
        if let Err(e) = self.storage.set(SESSION_KEY, &session.to_record()).await {
            tracing::warn!("Failed to persist session; it will not survive a restart: {e:#}");
        }
        let previous = self
            .state
            .send_replace(SessionState::Authenticated(session.clone()));

        let observers = self.live_observers();
        if matches!(previous, SessionState::Authenticated(_)) {
            tracing::debug!("Session replaced by a new login");
            for observer in &observers {
                observer.on_session_cleared(ClearReason::Replaced);
            }
        }
        for observer in &observers {
            observer.on_session_started(&session);
        }
    }

    /// Drop the persisted record, switch to `Unauthenticated` and notify
    /// observers.
    pub async fn clear(&self, reason: ClearReason) {
        self.purge().await;
        self.state.send_replace(SessionState::Unauthenticated);
        tracing::debug!(?reason, "Session cleared");

        for observer in self.live_observers() {
            observer.on_session_cleared(reason);
        }
    }

    async fn purge(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY).await {
            tracing::warn!("Failed to remove persisted session: {e:#}");
        }
    }
}

impl std::fmt::Debug for SessionCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCell")
            .field("state", &*self.state.borrow())
            .finish()
    }
}
