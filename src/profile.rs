//! Profile store: the signed-in user's profile document and usage stats.

use anyhow::Result;
use log::debug;
use serde_json::{Map, Value};

use crate::auth::require_user;
use crate::http::{ApiClient, GetOptions, RequestOptions};

pub const PROFILE_ENDPOINT: &str = "/api/user/profile";
pub const STATS_ENDPOINT: &str = "/api/user/stats";

pub struct ProfileStore<'a> {
    client: &'a ApiClient,
    profile: Option<Map<String, Value>>,
    stats: Option<Value>,
}

impl<'a> ProfileStore<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            profile: None,
            stats: None,
        }
    }

    pub fn profile(&self) -> Option<&Map<String, Value>> {
        self.profile.as_ref()
    }

    pub fn stats(&self) -> Option<&Value> {
        self.stats.as_ref()
    }

    /// The profile's `bio`, empty when unset.
    pub fn bio(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.get("bio"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn preferences(&self) -> Option<&Map<String, Value>> {
        self.profile
            .as_ref()
            .and_then(|p| p.get("preferences"))
            .and_then(Value::as_object)
    }

    /// Loads the profile, always from the network.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&mut self) -> Result<&Map<String, Value>> {
        require_user(self.client.auth()).await?;

        let data = self
            .client
            .get(PROFILE_ENDPOINT, GetOptions::default().no_cache())
            .await?;
        let profile = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => anyhow::bail!("Unexpected profile response: {}", other),
        };

        Ok(self.profile.insert(profile))
    }

    /// Sends `changes` and merges them into the local profile.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&mut self, changes: Map<String, Value>) -> Result<Value> {
        require_user(self.client.auth()).await?;

        let response = self
            .client
            .put(PROFILE_ENDPOINT, &changes, RequestOptions::default())
            .await?;

        debug!("Merging {} updated profile fields", changes.len());
        self.profile.get_or_insert_with(Map::new).extend(changes);
        Ok(response)
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_stats(&mut self) -> Result<&Value> {
        require_user(self.client.auth()).await?;

        let stats = self
            .client
            .get(STATS_ENDPOINT, GetOptions::default().no_cache())
            .await?;
        Ok(self.stats.insert(stats))
    }
}
