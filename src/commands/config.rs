use anyhow::{Context, Result};
use reqwest::Client;

use crate::{
    auth::provider_from_env,
    config::{ApiConfig, LoadingConfig},
    http::ApiClient,
    loading::LoadingTracker,
    runtime::Runtime,
};

/// Everything a command needs: the REST client and a loading tracker.
pub struct Config {
    pub client: ApiClient,
    pub tracker: LoadingTracker,
}

impl Config {
    pub fn new<R: Runtime>(
        runtime: &R,
        base_url: Option<&str>,
        timeout_ms: Option<u64>,
    ) -> Result<Self> {
        let api = ApiConfig::from_env(runtime)?.with_overrides(base_url, timeout_ms)?;
        Self::with_loading(runtime, api, LoadingConfig::default())
    }

    pub fn with_loading<R: Runtime>(
        runtime: &R,
        api: ApiConfig,
        loading: LoadingConfig,
    ) -> Result<Self> {
        let auth_client = Client::builder()
            .user_agent(concat!("wellness-client/", env!("CARGO_PKG_VERSION")))
            .timeout(api.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let auth = provider_from_env(runtime, auth_client);
        let client = ApiClient::new(&api, auth).context("Failed to build API client")?;

        Ok(Self {
            client,
            tracker: LoadingTracker::new(loading),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::ID_TOKEN_ENV;
    use crate::config::{BASE_URL_ENV, TIMEOUT_ENV};
    use crate::runtime::MockRuntime;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    /// Mock runtime exposing only the given variables.
    pub(crate) fn runtime_with(vars: Vec<(&'static str, String)>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .ok_or(std::env::VarError::NotPresent)
        });
        runtime
    }

    /// Config pointed at `server` with fast retries.
    pub(crate) fn test_config(server: &Server, token: Option<&str>) -> Config {
        let mut vars = vec![(BASE_URL_ENV, server.url())];
        if let Some(token) = token {
            vars.push((ID_TOKEN_ENV, token.to_string()));
        }
        let runtime = runtime_with(vars);
        let api = ApiConfig::from_env(&runtime).unwrap();
        let loading = LoadingConfig {
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
            max_retries: 2,
        };
        Config::with_loading(&runtime, api, loading).unwrap()
    }

    /// Helper function to verify Authorization header behavior
    async fn verify_authorization_header(token: Option<&str>) {
        let mut server = Server::new_async().await;

        let expected_header = match token {
            Some(t) => Matcher::Exact(format!("Bearer {}", t)),
            None => Matcher::Missing,
        };

        let mock = server
            .mock("GET", "/api/profile")
            .match_header("Authorization", expected_header)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = test_config(&server, token);
        config
            .client
            .get("/api/profile", Default::default())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_config_new_with_id_token() {
        verify_authorization_header(Some("test_token")).await;
    }

    #[tokio::test]
    async fn test_config_new_without_id_token() {
        verify_authorization_header(None).await;
    }

    #[test]
    fn test_config_new_applies_overrides() {
        let runtime = runtime_with(vec![
            (BASE_URL_ENV, "http://env-host:1".to_string()),
            (TIMEOUT_ENV, "1000".to_string()),
        ]);
        let config = Config::new(&runtime, Some("http://flag-host:2/"), None).unwrap();
        assert_eq!(config.client.base_url(), "http://flag-host:2");
    }

    #[test]
    fn test_config_new_rejects_bad_timeout() {
        let runtime = runtime_with(vec![(TIMEOUT_ENV, "abc".to_string())]);
        assert!(Config::new(&runtime, None, None).is_err());
    }
}
