use super::error::{Error, Result};
use super::recovery::{ExpiryRecovery, Navigator};
use crate::config::Config;
use crate::session::SessionCell;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Fallback when an error response carries no `message`.
const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// How a 401 should be handled for a particular call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUnauthorized {
    /// Run the session-expiry recovery and fail with `SessionExpired`.
    Recover,
    /// Report the 401 as a plain `Api` error (login, logout).
    Report,
}

/// Backend client. Attaches the bearer token of the current session to
/// every request and maps failures onto [`Error`].
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<SessionCell>,
    recovery: Arc<ExpiryRecovery>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("has_token", &self.session.bearer_token().is_some())
            .finish()
    }
}

impl ApiClient {
    /// Build a client for `base_url`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<SessionCell>,
        recovery: ExpiryRecovery,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let base_url = base_url.trim().trim_end_matches('/').to_string();
        tracing::debug!(%base_url, ?timeout, "Created API client");

        Ok(Self {
            http,
            base_url,
            session,
            recovery: Arc::new(recovery),
        })
    }

    /// Build a client from configuration.
    pub fn from_config(
        config: &Config,
        session: Arc<SessionCell>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let recovery = ExpiryRecovery::new(navigator, config.expiry_redirect_delay());
        Self::new(
            &config.api.base_url,
            config.request_timeout(),
            session,
            recovery,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Session the client reads its bearer token from.
    pub fn session(&self) -> &Arc<SessionCell> {
        &self.session
    }

    /// Expiry recovery shared by every clone of this client.
    pub fn recovery(&self) -> &ExpiryRecovery {
        &self.recovery
    }

    /// Start a request, authenticated when a session exists.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.anonymous(method, path);
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Start a request without an `Authorization` header.
    pub fn anonymous(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Send a request and return the raw body of a successful response.
    pub async fn execute(
        &self,
        builder: RequestBuilder,
        on_unauthorized: OnUnauthorized,
    ) -> Result<String> {
        let sent_token = self.session.bearer_token();
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let body = response.text().await.map_err(network_error)?;

        if status == StatusCode::UNAUTHORIZED && on_unauthorized == OnUnauthorized::Recover {
            self.recovery
                .trigger(&self.session, sent_token.as_deref())
                .await;
            return Err(Error::SessionExpired);
        }

        check_status(status, &body)?;
        Ok(body)
    }

    // ── Typed helpers ───────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let builder = self.request(Method::GET, path).query(query);
        let body = self.execute(builder, OnUnauthorized::Recover).await?;
        decode(&body)
    }

    pub async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, path).json(payload);
        let body = self.execute(builder, OnUnauthorized::Recover).await?;
        decode(&body)
    }

    /// POST a multipart form (file uploads, login).
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let builder = self.request(Method::POST, path).multipart(form);
        let body = self.execute(builder, OnUnauthorized::Recover).await?;
        decode(&body)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, path);
        self.execute(builder, OnUnauthorized::Recover).await?;
        Ok(())
    }
}

fn network_error(err: reqwest::Error) -> Error {
    tracing::warn!(timeout = err.is_timeout(), "Request failed without response: {err}");
    Error::Network {
        detail: err.to_string(),
    }
}

/// Map a non-401 status onto the error taxonomy.
fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), "Server error");
        return Err(Error::Server {
            status: status.as_u16(),
        });
    }

    let message = backend_message(body).unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
    tracing::debug!(status = status.as_u16(), %message, "API error");
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

/// `message` field of a JSON error body, if any.
pub(crate) fn backend_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
}

/// Decode a JSON body. An empty body decodes as `null`.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let parsed = if body.trim().is_empty() {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        serde_json::from_str(body)
    };
    parsed.map_err(|e| Error::InvalidServerResponse(e.to_string()))
}

/// Unwrap a `{ "data": … }` envelope; bare payloads pass through.
pub fn data_or_self(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::recovery::LogNavigator;
    use crate::session::{Session, SessionState};
    use crate::storage::{KeyValueStore, MemoryStore, SESSION_KEY};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CountingNavigator(AtomicUsize);

    impl Navigator for CountingNavigator {
        fn redirect_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn client_for(
        server: &MockServer,
        navigator: Arc<dyn Navigator>,
    ) -> (Arc<MemoryStore>, ApiClient) {
        let storage = Arc::new(MemoryStore::new());
        let cell = Arc::new(SessionCell::new(storage.clone()));
        cell.load().await;
        let recovery = ExpiryRecovery::new(navigator, Duration::from_millis(100));
        let client = ApiClient::new(&server.uri(), Duration::from_secs(5), cell, recovery).unwrap();
        (storage, client)
    }

    async fn sign_in(client: &ApiClient, token: &str) {
        let session = Session::from_login_response(&json!({
            "token": token,
            "token_type": "bearer",
            "user": {"id": 1, "email": "a@b.com"}
        }))
        .unwrap();
        client.session().establish(session).await;
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let storage = Arc::new(MemoryStore::new());
        let cell = Arc::new(SessionCell::new(storage));
        let recovery = ExpiryRecovery::new(Arc::new(LogNavigator), Duration::from_millis(10));
        let client = ApiClient::new(
            "https://demo.trackerstay.com/api/",
            Duration::from_secs(1),
            cell,
            recovery,
        )
        .unwrap();
        assert_eq!(client.url("/login"), "https://demo.trackerstay.com/api/login");
        assert_eq!(client.url("utility/3"), "https://demo.trackerstay.com/api/utility/3");
    }

    #[test]
    fn backend_message_extraction() {
        assert_eq!(
            backend_message(r#"{"message":"Invalid date"}"#).as_deref(),
            Some("Invalid date")
        );
        assert_eq!(backend_message(r#"{"message":"   "}"#), None);
        assert_eq!(backend_message("not json"), None);
    }

    #[test]
    fn data_or_self_unwraps_envelopes() {
        assert_eq!(data_or_self(json!({"status": true, "data": [1, 2]})), json!([1, 2]));
        assert_eq!(data_or_self(json!([1, 2])), json!([1, 2]));
        assert_eq!(data_or_self(json!({"id": 3})), json!({"id": 3}));
        assert_eq!(data_or_self(json!({"data": null})), serde_json::Value::Null);
    }

    #[test]
    fn decode_empty_body_as_null() {
        let value: Option<serde_json::Value> = decode("").unwrap();
        assert!(value.is_none());
        let err = decode::<Vec<u32>>("{oops").unwrap_err();
        assert!(matches!(err, Error::InvalidServerResponse(_)));
    }

    #[tokio::test]
    async fn attaches_bearer_token_when_session_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("Authorization", "Bearer t1"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let (_storage, client) = client_for(&server, Arc::new(LogNavigator)).await;
        sign_in(&client, "t1").await;

        let me: serde_json::Value = client.get_json("/me", &[]).await.unwrap();
        assert_eq!(me["id"], 1);
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hotel/daily-booking-details"))
            .and(query_param("date", "2025-01-02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let (_storage, client) = client_for(&server, Arc::new(LogNavigator)).await;
        let _: serde_json::Value = client
            .get_json("/hotel/daily-booking-details", &[("date", "2025-01-02".to_string())])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let has_auth = requests[0]
            .headers
            .iter()
            .any(|(name, _)| name.as_str().eq_ignore_ascii_case("authorization"));
        assert!(!has_auth);
    }

    #[tokio::test]
    async fn unauthorized_expires_session_and_redirects_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hotel/notifications"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})),
            )
            .mount(&server)
            .await;

        let navigator = Arc::new(CountingNavigator::default());
        let (storage, client) = client_for(&server, navigator.clone()).await;
        sign_in(&client, "t1").await;
        assert!(storage.snapshot(SESSION_KEY).is_some());

        let err = client
            .get_json::<serde_json::Value>("/hotel/notifications", &[])
            .await
            .unwrap_err();

        assert_eq!(err, Error::SessionExpired);
        assert_eq!(client.session().state(), SessionState::Unauthenticated);
        assert!(storage.get(SESSION_KEY).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_responses_run_one_recovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let navigator = Arc::new(CountingNavigator::default());
        let (_storage, client) = client_for(&server, navigator.clone()).await;
        sign_in(&client, "t1").await;

        let (a, b, c) = tokio::join!(
            client.get_json::<serde_json::Value>("/utility", &[]),
            client.get_json::<serde_json::Value>("/utility/categories", &[]),
            client.get_json::<serde_json::Value>("/hotel/notifications", &[]),
        );
        for result in [a, b, c] {
            assert_eq!(result.unwrap_err(), Error::SessionExpired);
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/utility"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (storage, client) = client_for(&server, Arc::new(LogNavigator)).await;
        sign_in(&client, "t1").await;

        let err = client.get_json::<serde_json::Value>("/utility", &[]).await.unwrap_err();
        assert_eq!(err, Error::Server { status: 503 });
        assert!(client.session().is_authenticated());
        assert!(storage.snapshot(SESSION_KEY).is_some());
    }

    #[tokio::test]
    async fn client_error_carries_backend_message_or_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/utility/7"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Utility not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/utility/8"))
            .respond_with(ResponseTemplate::new(422).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let (_storage, client) = client_for(&server, Arc::new(LogNavigator)).await;

        let err = client.delete("/utility/7").await.unwrap_err();
        assert_eq!(
            err,
            Error::Api {
                status: 404,
                message: "Utility not found".into()
            }
        );

        let err = client.delete("/utility/8").await.unwrap_err();
        assert_eq!(err.to_string(), "An error occurred");
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let storage = Arc::new(MemoryStore::new());
        let cell = Arc::new(SessionCell::new(storage));
        let recovery = ExpiryRecovery::new(Arc::new(LogNavigator), Duration::from_millis(10));
        let client =
            ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2), cell, recovery).unwrap();

        let err = client.get_json::<serde_json::Value>("/me", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let cell = Arc::new(SessionCell::new(storage));
        let recovery = ExpiryRecovery::new(Arc::new(LogNavigator), Duration::from_millis(10));
        let client =
            ApiClient::new(&server.uri(), Duration::from_millis(200), cell, recovery).unwrap();

        let err = client.get_json::<serde_json::Value>("/me", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[tokio::test]
    async fn reported_unauthorized_does_not_touch_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let navigator = Arc::new(CountingNavigator::default());
        let (_storage, client) = client_for(&server, navigator.clone()).await;
        sign_in(&client, "t1").await;

        let builder = client.request(Method::POST, "/logout");
        let err = client.execute(builder, OnUnauthorized::Report).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, Error::Api { .. }));
        assert!(client.session().is_authenticated());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(navigator.0.load(Ordering::SeqCst), 0);
    }
}
