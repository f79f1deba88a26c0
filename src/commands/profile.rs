//! `profile` subcommands.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::{loading::ExecuteOptions, profile::ProfileStore};

use super::config::Config;

#[tracing::instrument(skip(config))]
pub async fn show(config: &Config) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "profile",
            |_| async move {
                let mut store = ProfileStore::new(client);
                Ok(Value::Object(store.fetch().await?.clone()))
            },
            ExecuteOptions::default(),
        )
        .await
}

#[tracing::instrument(skip(config, changes))]
pub async fn update(config: &Config, changes: &Value) -> Result<Value> {
    let Value::Object(changes) = changes else {
        anyhow::bail!("Profile changes must be a JSON object");
    };
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "profile:update",
            |_| {
                let changes: Map<String, Value> = changes.clone();
                async move { ProfileStore::new(client).update(changes).await }
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}

#[tracing::instrument(skip(config))]
pub async fn stats(config: &Config) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "profile:stats",
            |_| async move {
                let mut store = ProfileStore::new(client);
                Ok(store.fetch_stats().await?.clone())
            },
            ExecuteOptions::default(),
        )
        .await
}
