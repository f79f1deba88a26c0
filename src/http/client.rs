//! Authenticated REST client with a GET response cache.

use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TIME, ResponseCache, cache_key};
use super::error::ApiError;
use crate::auth::{AuthProvider, resolve_bearer};
use crate::cancel::CancelHandle;
use crate::config::ApiConfig;

const USER_AGENT: &str = concat!("wellness-client/", env!("CARGO_PKG_VERSION"));

/// Options for [`ApiClient::get`].
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Serve from and store into the response cache.
    pub cache: bool,
    /// How long a stored response stays valid.
    pub cache_time: Duration,
    pub params: BTreeMap<String, String>,
    pub signal: Option<CancelHandle>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_time: DEFAULT_CACHE_TIME,
            params: BTreeMap::new(),
            signal: None,
        }
    }
}

impl GetOptions {
    pub fn no_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn signal(mut self, signal: CancelHandle) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Options for [`ApiClient::post`] and [`ApiClient::put`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub signal: Option<CancelHandle>,
}

impl RequestOptions {
    pub fn signal(signal: CancelHandle) -> Self {
        Self {
            signal: Some(signal),
        }
    }
}

/// REST client for the wellness backend.
///
/// Every request carries a freshly resolved bearer token when someone is
/// signed in. GET responses are cached per URL and query parameters.
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
    cache: ResponseCache,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        Self::with_cache_capacity(config, auth, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        config: &ApiConfig,
        auth: Arc<dyn AuthProvider>,
        capacity: usize,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            auth,
            cache: ResponseCache::new(capacity),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.auth.as_ref()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Full URL for an endpoint such as `/api/goals`.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Performs a GET request, serving it from the cache when allowed.
    #[tracing::instrument(skip(self, options))]
    pub async fn get(&self, endpoint: &str, options: GetOptions) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        let key = cache_key(&url, &options.params);

        if options.cache {
            if let Some(data) = self.cache.get(&key) {
                debug!("[API] Using cached response for {}", key);
                return Ok(data);
            }
        }

        debug!("GET {}...", key);
        let request = self.client.get(&url).query(&options.params);
        let data = self.send(&url, request, options.signal.as_ref()).await?;

        if options.cache {
            self.cache.insert(key, data.clone(), options.cache_time);
        }

        Ok(data)
    }

    /// Performs a GET request and deserializes the payload.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: GetOptions,
    ) -> Result<T, ApiError> {
        let data = self.get(endpoint, options).await?;
        serde_json::from_value(data)
            .map_err(|e| ApiError::Setup(format!("Failed to parse response from {}: {}", endpoint, e)))
    }

    /// Sends `body` as JSON with POST. Never cached.
    #[tracing::instrument(skip(self, body, options))]
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        debug!("POST {}...", url);
        let request = self.client.post(&url).json(body);
        self.send(&url, request, options.signal.as_ref()).await
    }

    /// Sends `body` as JSON with PUT. Never cached.
    #[tracing::instrument(skip(self, body, options))]
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        debug!("PUT {}...", url);
        let request = self.client.put(&url).json(body);
        self.send(&url, request, options.signal.as_ref()).await
    }

    /// Drops cached responses for one endpoint (every key starting with its
    /// URL), or the whole cache.
    pub fn clear_cache(&self, endpoint: Option<&str>) {
        match endpoint {
            Some(endpoint) => {
                let prefix = self.url(endpoint);
                let removed = self.cache.remove_prefix(&prefix);
                debug!("[API] Cleared {} cached responses for {}", removed, prefix);
            }
            None => {
                self.cache.clear();
                debug!("[API] Cleared response cache");
            }
        }
    }

    /// Attaches credentials, sends the request and reads the payload,
    /// racing all of it against `signal`. Failures are logged and
    /// returned unchanged.
    async fn send(
        &self,
        url: &str,
        request: RequestBuilder,
        signal: Option<&CancelHandle>,
    ) -> Result<Value, ApiError> {
        let exchange = async {
            let request = match resolve_bearer(self.auth.as_ref()).await {
                Some(token) => request.bearer_auth(token),
                None => request,
            };
            let response = request
                .send()
                .await
                .map_err(|e| ApiError::from_transport(url, e))?;
            read_payload(url, response).await
        };

        let result = match signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(ApiError::Cancelled {
                        reason: signal.to_error().reason,
                    }),
                    result = exchange => result,
                }
            }
            None => exchange.await,
        };

        if let Err(e) = &result {
            e.log(&self.base_url);
        }
        result
    }
}

/// Percent-encodes one path segment, such as a document id.
pub fn path_segment(segment: &str) -> String {
    // form encoding writes spaces as '+'; a literal '+' is already "%2B".
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Turns a response into a payload: JSON when the body parses, `null` for
/// an empty body, the raw text otherwise.
async fn read_payload(url: &str, response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::from_transport(url, e))?;

    if !status.is_success() {
        return Err(ApiError::from_response_body(status, &body));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Anonymous, MockAuthProvider, Principal, StaticToken};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tokio::net::TcpListener;

    fn config(url: String) -> ApiConfig {
        ApiConfig::new(url, Duration::from_secs(5))
    }

    fn client(server: &Server) -> ApiClient {
        ApiClient::new(&config(server.url()), Arc::new(Anonymous)).unwrap()
    }

    fn client_with_token(server: &Server, token: &str) -> ApiClient {
        ApiClient::new(&config(server.url()), Arc::new(StaticToken::new("u1", token))).unwrap()
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_get_caches_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/goals")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"g1"}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        let first = client.get("/api/goals", GetOptions::default()).await.unwrap();
        let second = client.get("/api/goals", GetOptions::default()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, json!([{"id": "g1"}]));
        assert_eq!(first, second);
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_get_param_order_shares_cache_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/journals")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("a".into(), "1".into()),
                Matcher::UrlEncoded("b".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"entries":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        let options = GetOptions::default().param("a", 1).param("b", 2);
        client.get("/api/journals", options).await.unwrap();
        let options = GetOptions::default().param("b", 2).param("a", 1);
        client.get("/api/journals", options).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_without_cache_always_hits_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/moods")
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        client.get("/api/moods", GetOptions::default().no_cache()).await.unwrap();
        client.get("/api/moods", GetOptions::default().no_cache()).await.unwrap();

        mock.assert_async().await;
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_refetches_after_cache_time() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/goals")
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        let options = || GetOptions::default().cache_time(Duration::from_millis(50));
        client.get("/api/goals", options()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.get("/api/goals", options()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authorization_header_sent_when_signed_in() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/profile")
            .match_header("Authorization", "Bearer id-token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_with_token(&server, "id-token");
        client.get("/api/profile", GetOptions::default()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_failure_sends_request_without_credentials() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/profile")
            .match_header("Authorization", Matcher::Missing)
            .with_status(401)
            .with_body(r#"{"error":"Unauthorized"}"#)
            .create_async()
            .await;

        let mut auth = MockAuthProvider::new();
        auth.expect_current_principal()
            .returning(|| Some(Principal::new("u1")));
        auth.expect_id_token()
            .returning(|_, _| Err(anyhow::anyhow!("token service unavailable")));

        let client = ApiClient::new(&config(server.url()), Arc::new(auth)).unwrap();
        let err = client
            .get("/api/profile", GetOptions::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
        assert_eq!(err.to_string(), "HTTP 401: Unauthorized");
    }

    #[tokio::test]
    async fn test_failed_get_is_not_cached() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/goals")
            .with_status(500)
            .with_body(r#"{"error":"Database unavailable"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        for _ in 0..2 {
            let err = client
                .get("/api/goals", GetOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ApiError::Status { ref message, .. } if message.as_deref() == Some("Database unavailable")
            ));
        }

        mock.assert_async().await;
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_post_sends_json_and_skips_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/journal")
            .match_header("content-type", "application/json")
            .match_header("Authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({"title": "Day 1", "content": "ok"})))
            .with_status(201)
            .with_body(r#"{"id":"j1"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client_with_token(&server, "tok");
        let body = json!({"title": "Day 1", "content": "ok"});
        let first = client
            .post("/api/journal", &body, RequestOptions::default())
            .await
            .unwrap();
        client
            .post("/api/journal", &body, RequestOptions::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(first, json!({"id": "j1"}));
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_put_sends_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/goal/g1")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"completed": true})))
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = client(&server);
        let result = client
            .put("/api/goal/g1", &json!({"completed": true}), RequestOptions::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_non_json_body_returned_as_text() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let client = client(&server);
        let result = client.get("/health", GetOptions::default()).await.unwrap();
        assert_eq!(result, Value::String("OK".to_string()));
    }

    #[tokio::test]
    async fn test_clear_cache_by_endpoint_prefix() {
        let mut server = Server::new_async().await;
        let goals = server
            .mock("GET", "/api/goals")
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;
        let journals = server
            .mock("GET", "/api/journals")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        client.get("/api/goals", GetOptions::default()).await.unwrap();
        client.get("/api/journals", GetOptions::default()).await.unwrap();

        client.clear_cache(Some("/api/goals"));
        assert_eq!(client.cache().len(), 1);

        client.get("/api/goals", GetOptions::default()).await.unwrap();
        client.get("/api/journals", GetOptions::default()).await.unwrap();

        goals.assert_async().await;
        journals.assert_async().await;

        client.clear_cache(None);
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_as_deserializes() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/profile")
            .with_status(200)
            .with_body(r#"{"name":"Sam","streak":4}"#)
            .create_async()
            .await;

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Profile {
            name: String,
            streak: u32,
        }

        let client = client(&server);
        let profile: Profile = client
            .get_as("/api/profile", GetOptions::default())
            .await
            .unwrap();
        assert_eq!(
            profile,
            Profile {
                name: "Sam".to_string(),
                streak: 4
            }
        );
    }

    #[tokio::test]
    async fn test_already_cancelled_signal_skips_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/goals")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let signal = CancelHandle::new();
        signal.cancel("navigated away");

        let client = client(&server);
        let err = client
            .get("/api/goals", GetOptions::default().signal(signal))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.is_cancellation());
        assert_eq!(err.to_string(), "Request canceled: navigated away");
    }

    #[test_log::test(tokio::test)]
    async fn test_in_flight_request_cancelled() {
        let (url, server) = silent_server().await;
        let client = ApiClient::new(&config(url), Arc::new(Anonymous)).unwrap();

        let signal = CancelHandle::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel("user left the page");
        });

        let started = std::time::Instant::now();
        let err = client
            .post("/api/chat", &json!({"message": "hi"}), RequestOptions::signal(signal))
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(started.elapsed() < Duration::from_secs(2));
        server.abort();
    }

    /// Signed in, but handing out a token takes far too long.
    struct SlowTokenAuth;

    #[async_trait::async_trait]
    impl AuthProvider for SlowTokenAuth {
        async fn current_principal(&self) -> Option<Principal> {
            Some(Principal::new("u1"))
        }

        async fn id_token(&self, _principal: &Principal, _force_refresh: bool) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_token_lookup() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/goals")
            .expect(0)
            .create_async()
            .await;
        let client = ApiClient::new(&config(server.url()), Arc::new(SlowTokenAuth)).unwrap();

        let signal = CancelHandle::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel("signed out");
        });

        let started = std::time::Instant::now();
        let err = client
            .get("/api/goals", GetOptions::default().signal(signal))
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(started.elapsed() < Duration::from_secs(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (url, server) = silent_server().await;
        let config = ApiConfig::new(url, Duration::from_millis(100));
        let client = ApiClient::new(&config, Arc::new(Anonymous)).unwrap();

        let err = client
            .get("/api/goals", GetOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Timeout { .. }));
        assert!(!err.is_cancellation());
        server.abort();
    }
}
