use super::state::{token_preview, ClearReason, Session, SessionCell, SessionState, UserProfile};
use crate::api::{data_or_self, decode, ApiClient, Error, OnUnauthorized, Result};
use reqwest::multipart::Form;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Message shown for a rejected login.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Owns the authenticated session: login, logout and restoration.
#[derive(Debug, Clone)]
pub struct SessionStore {
    cell: Arc<SessionCell>,
    api: ApiClient,
    device_name: String,
}

impl SessionStore {
    pub fn new(api: ApiClient, device_name: impl Into<String>) -> Self {
        Self {
            cell: Arc::clone(api.session()),
            api,
            device_name: device_name.into(),
        }
    }

    /// Restore the persisted session. Never fails; malformed records are
    /// purged.
    pub async fn load_from_storage(&self) -> Option<Session> {
        self.cell.load().await
    }

    /// Authenticate against `/login` and persist the session.
    ///
    /// Observers are notified on success; push registration runs in the
    /// background and does not delay this call. Logging in over a live
    /// session replaces it.
    ///
    /// Not reentrant: overlapping calls race on the stored session, so
    /// callers must debounce the login action.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        if !self.cell.state().is_ready() {
            return Err(Error::NotReady);
        }

        tracing::info!(%email, "Attempting login");
        match self.request_session(email, password).await {
            Ok(session) => {
                tracing::info!(token = %token_preview(&session.token), "Login succeeded");
                self.cell.establish(session.clone()).await;
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(%email, "Login failed: {e}");
                self.cell.clear(ClearReason::LoginFailed).await;
                Err(e)
            }
        }
    }

    async fn request_session(&self, email: &str, password: &str) -> Result<Session> {
        let form = Form::new()
            .text("email", email.to_string())
            .text("password", password.to_string())
            .text("device_name", self.device_name.clone());

        let builder = self.api.anonymous(Method::POST, "/login").multipart(form);
        let body = match self.api.execute(builder, OnUnauthorized::Report).await {
            Ok(body) => body,
            Err(Error::Api { status: 401, .. }) => {
                return Err(Error::Api {
                    status: 401,
                    message: INVALID_CREDENTIALS.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        let value: Value = decode(&body)?;
        Session::from_login_response(&value)
    }

    /// End the session. The backend call is best effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if self.cell.current().is_some() {
            let builder = self
                .api
                .request(Method::POST, "/logout")
                .json(&serde_json::json!({}));
            match self.api.execute(builder, OnUnauthorized::Report).await {
                Ok(_) => tracing::info!("Logged out on backend"),
                Err(e) => tracing::warn!("Backend logout failed, clearing locally anyway: {e}"),
            }
        } else {
            tracing::debug!("Logout without a session");
        }

        self.cell.clear(ClearReason::Logout).await;
    }

    pub fn current_session(&self) -> Option<Session> {
        self.cell.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.cell.is_authenticated()
    }

    pub fn state(&self) -> SessionState {
        self.cell.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.cell.subscribe()
    }

    pub fn cell(&self) -> &Arc<SessionCell> {
        &self.cell
    }

    /// Fetch the signed-in user from `/me`.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let value: Value = self.api.get_json("/me", &[]).await?;
        let value = match data_or_self(value) {
            Value::Object(mut map) if matches!(map.get("user"), Some(Value::Object(_))) => {
                map.remove("user").unwrap_or_default()
            }
            other => other,
        };
        match value {
            Value::Object(fields) => Ok(UserProfile::new(fields)),
            other => Err(Error::InvalidServerResponse(format!(
                "expected a user object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExpiryRecovery, LogNavigator};
    use crate::storage::{KeyValueStore, MemoryStore, SESSION_KEY};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(base_url: &str, storage: Arc<MemoryStore>) -> SessionStore {
        let cell = Arc::new(SessionCell::new(storage));
        let recovery = ExpiryRecovery::new(Arc::new(LogNavigator), Duration::from_millis(10));
        let api = ApiClient::new(base_url, Duration::from_secs(5), cell, recovery).unwrap();
        SessionStore::new(api, "android-mobile")
    }

    fn login_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "token": "t1",
            "token_type": "bearer",
            "user": {"id": 1, "email": "a@b.com"}
        }))
    }

    #[tokio::test]
    async fn login_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("a@b.com"))
            .and(body_string_contains("android-mobile"))
            .respond_with(login_ok())
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage.clone());
        assert!(store.load_from_storage().await.is_none());

        let session = store.login("a@b.com", "pw").await.unwrap();
        assert_eq!(session.token, "t1");
        assert_eq!(session.user.email(), Some("a@b.com"));
        assert!(store.is_authenticated());

        let persisted = storage.snapshot(SESSION_KEY).unwrap();
        assert_eq!(Session::from_record(&persisted), Some(session));
    }

    #[tokio::test]
    async fn login_before_load_is_not_ready() {
        let storage = Arc::new(MemoryStore::new());
        let store = store_for("http://127.0.0.1:9", storage);
        assert_eq!(store.login("a@b.com", "pw").await.unwrap_err(), Error::NotReady);
    }

    #[tokio::test]
    async fn login_without_token_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "bearer",
                "user": {"id": 1}
            })))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage.clone());
        store.load_from_storage().await;

        let err = store.login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, Error::InvalidServerResponse(_)));
        assert!(storage.snapshot(SESSION_KEY).is_none());
        assert_eq!(store.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn login_rejected_credentials_are_not_an_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})),
            )
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage);
        store.load_from_storage().await;

        let err = store.login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password");
        assert!(!store.api.recovery().is_in_flight());
    }

    #[tokio::test]
    async fn failed_login_purges_stale_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        storage
            .set(SESSION_KEY, r#"{"token":"old","token_type":"bearer","user":{"id":9}}"#)
            .await
            .unwrap();
        let store = store_for(&server.uri(), storage.clone());
        assert!(store.load_from_storage().await.is_some());

        let err = store.login("a@b.com", "pw").await.unwrap_err();
        assert_eq!(err, Error::Server { status: 500 });
        assert!(storage.snapshot(SESSION_KEY).is_none());
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn logout_calls_backend_with_token_then_clears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(login_ok())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .and(header("Authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage.clone());
        store.load_from_storage().await;
        store.login("a@b.com", "pw").await.unwrap();

        store.logout().await;
        assert!(store.current_session().is_none());
        assert!(storage.snapshot(SESSION_KEY).is_none());
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(login_ok())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage.clone());
        store.load_from_storage().await;
        store.login("a@b.com", "pw").await.unwrap();

        store.logout().await;
        assert_eq!(store.state(), SessionState::Unauthenticated);
        assert!(storage.snapshot(SESSION_KEY).is_none());
        assert!(!store.api.recovery().is_in_flight());
    }

    #[tokio::test]
    async fn logout_without_session_makes_no_request() {
        let server = MockServer::start().await;
        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage);
        store.load_from_storage().await;

        store.logout().await;
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_profile_accepts_wrapped_and_bare_users() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": 1, "email": "a@b.com", "name": "Ana"}
            })))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let store = store_for(&server.uri(), storage);
        store.load_from_storage().await;

        let profile = store.fetch_profile().await.unwrap();
        assert_eq!(profile.id(), Some(1));
        assert_eq!(profile.name(), Some("Ana"));
    }
}
