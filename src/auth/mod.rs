//! Authentication collaborator.
//!
//! The REST backend expects `Authorization: Bearer <id token>`. Providers
//! answer two questions: who is signed in, and what ID token proves it.

mod refresh;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use std::sync::Arc;

use crate::runtime::{Runtime, env_non_empty};

pub use refresh::{DEFAULT_TOKEN_ENDPOINT, RefreshTokenAuth};

pub const ID_TOKEN_ENV: &str = "WELLNESS_ID_TOKEN";
pub const USER_ID_ENV: &str = "WELLNESS_USER_ID";
pub const REFRESH_TOKEN_ENV: &str = "WELLNESS_REFRESH_TOKEN";
pub const AUTH_API_KEY_ENV: &str = "WELLNESS_AUTH_API_KEY";
pub const TOKEN_ENDPOINT_ENV: &str = "WELLNESS_TOKEN_ENDPOINT";

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the signed-in principal, or `None` when nobody is signed in.
    async fn current_principal(&self) -> Option<Principal>;

    /// Obtains an ID token for `principal`. Fails on network problems or
    /// when the principal is no longer signed in.
    async fn id_token(&self, principal: &Principal, force_refresh: bool) -> Result<String>;
}

/// Nobody is signed in; requests go out without credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl AuthProvider for Anonymous {
    async fn current_principal(&self) -> Option<Principal> {
        None
    }

    async fn id_token(&self, _principal: &Principal, _force_refresh: bool) -> Result<String> {
        anyhow::bail!("No user is signed in")
    }
}

/// A pre-issued ID token. Refreshing returns the same token.
#[derive(Clone)]
pub struct StaticToken {
    principal: Principal,
    token: String,
}

impl StaticToken {
    pub fn new(uid: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            principal: Principal::new(uid),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("principal", &self.principal)
            .field("token", &mask_token(&self.token))
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn current_principal(&self) -> Option<Principal> {
        Some(self.principal.clone())
    }

    async fn id_token(&self, principal: &Principal, _force_refresh: bool) -> Result<String> {
        if principal != &self.principal {
            anyhow::bail!("User '{}' is not signed in", principal.uid);
        }
        Ok(self.token.clone())
    }
}

/// Picks a provider from the environment.
///
/// A refresh token plus API key wins over a static ID token; with neither,
/// requests are anonymous.
pub fn provider_from_env<R: Runtime + ?Sized>(
    runtime: &R,
    client: Client,
) -> Arc<dyn AuthProvider> {
    let user_id = env_non_empty(runtime, USER_ID_ENV);

    if let (Some(refresh_token), Some(api_key)) = (
        env_non_empty(runtime, REFRESH_TOKEN_ENV),
        env_non_empty(runtime, AUTH_API_KEY_ENV),
    ) {
        let endpoint = env_non_empty(runtime, TOKEN_ENDPOINT_ENV)
            .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string());
        debug!(
            "Using {} for authentication: {}",
            REFRESH_TOKEN_ENV,
            mask_token(&refresh_token)
        );
        return Arc::new(RefreshTokenAuth::new(
            client,
            endpoint,
            api_key,
            refresh_token,
            user_id,
        ));
    }

    if let Some(token) = env_non_empty(runtime, ID_TOKEN_ENV) {
        debug!(
            "Using {} for authentication: {}",
            ID_TOKEN_ENV,
            mask_token(&token)
        );
        return Arc::new(StaticToken::new(
            user_id.unwrap_or_else(|| "user".to_string()),
            token,
        ));
    }

    debug!("No credentials configured, requests will be anonymous");
    Arc::new(Anonymous)
}

/// Resolves the bearer credential for one request.
///
/// Token failures are recovered here: the request goes out without a
/// credential and the server decides whether that is acceptable.
pub(crate) async fn resolve_bearer(provider: &dyn AuthProvider) -> Option<String> {
    let principal = provider.current_principal().await?;

    match provider.id_token(&principal, true).await {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("[API] Error getting auth token: {:#}", e);
            None
        }
    }
}

/// Returns the signed-in principal or fails with `User not authenticated`.
pub async fn require_user(provider: &dyn AuthProvider) -> Result<Principal> {
    match provider.current_principal().await {
        Some(principal) => Ok(principal),
        None => anyhow::bail!("User not authenticated"),
    }
}

/// Shows the first 8 and last 4 characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
