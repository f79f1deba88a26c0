//! `journal` subcommands.

use anyhow::Result;
use serde_json::Value;

use crate::{
    journal::{JournalStore, NewJournal},
    loading::ExecuteOptions,
};

use super::config::Config;

#[tracing::instrument(skip(config))]
pub async fn list(config: &Config) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "journal",
            |_| async move {
                let mut store = JournalStore::new(client);
                let entries = store.fetch().await?;
                Ok(serde_json::to_value(entries)?)
            },
            ExecuteOptions::default(),
        )
        .await
}

#[tracing::instrument(skip(config, content))]
pub async fn add(config: &Config, title: &str, content: &str, share_with_ai: bool) -> Result<Value> {
    let entry = NewJournal::new(title, content).share_with_ai(share_with_ai);
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "journal:create",
            |_| {
                let entry = entry.clone();
                async move { JournalStore::new(client).create(entry).await }
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}
