//! Refresh-token exchange against a secure-token endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{AuthProvider, Principal, mask_token};
use crate::expiry::{Deadline, DeadlineExpiry};

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize, Debug)]
struct TokenResponse {
    id_token: String,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<u64>,
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Seconds>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Seconds::Number(n) => Some(n),
        Seconds::Text(s) => s.trim().parse().ok(),
    }))
}

/// Cache key of the current ID token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdTokenKey;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    deadline: Instant,
}

impl Deadline for CachedToken {
    fn deadline(&self) -> Instant {
        self.deadline
    }
}

struct State {
    refresh_token: String,
    user_id: Option<String>,
}

/// Exchanges a long-lived refresh token for short-lived ID tokens.
pub struct RefreshTokenAuth {
    client: Client,
    endpoint: String,
    api_key: String,
    state: Mutex<State>,
    tokens: Cache<IdTokenKey, CachedToken>,
}

impl RefreshTokenAuth {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        refresh_token: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            state: Mutex::new(State {
                refresh_token: refresh_token.into(),
                user_id,
            }),
            tokens: Cache::builder()
                .max_capacity(1)
                .expire_after(DeadlineExpiry)
                .build(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached_token(&self) -> Option<String> {
        self.tokens.get(&IdTokenKey).map(|t| t.value)
    }

    /// Performs one exchange and stores the result.
    #[tracing::instrument(skip(self))]
    async fn exchange(&self) -> Result<String> {
        let refresh_token = self.lock().refresh_token.clone();
        debug!(
            "Exchanging refresh token {} at {}...",
            mask_token(&refresh_token),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed with HTTP {}: {}", status.as_u16(), body);
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
        let deadline = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);

        {
            let mut state = self.lock();
            if let Some(rotated) = parsed.refresh_token {
                state.refresh_token = rotated;
            }
            if let Some(uid) = parsed.user_id {
                state.user_id = Some(uid);
            }
        }
        self.tokens.insert(
            IdTokenKey,
            CachedToken {
                value: parsed.id_token.clone(),
                deadline,
            },
        );

        Ok(parsed.id_token)
    }
}

#[async_trait]
impl AuthProvider for RefreshTokenAuth {
    async fn current_principal(&self) -> Option<Principal> {
        if let Some(uid) = self.lock().user_id.clone() {
            return Some(Principal::new(uid));
        }

        // The user id is only known after the first exchange.
        if let Err(e) = self.exchange().await {
            warn!("Could not determine signed-in user: {:#}", e);
            return None;
        }
        self.lock().user_id.clone().map(Principal::new)
    }

    async fn id_token(&self, principal: &Principal, force_refresh: bool) -> Result<String> {
        if let Some(uid) = self.lock().user_id.as_deref() {
            if uid != principal.uid {
                anyhow::bail!("User '{}' is not signed in", principal.uid);
            }
        }

        if !force_refresh {
            if let Some(token) = self.cached_token() {
                return Ok(token);
            }
        }
        self.exchange().await
    }
}
