//! Journal store: lists and writes the signed-in user's journal entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::require_user;
use crate::http::{ApiClient, GetOptions, RequestOptions};
use crate::timestamp::parse_timestamp;

pub const JOURNALS_ENDPOINT: &str = "/api/journals";
pub const JOURNAL_ENDPOINT: &str = "/api/journal";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Everything else the backend attached, such as sentiment scores.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    updated_at: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl JournalEntry {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawEntry = serde_json::from_value(value).context("Malformed journal entry")?;
        let id = match raw.id {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        Ok(JournalEntry {
            id,
            title: raw.title.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            created_at: parse_timestamp(&raw.created_at),
            updated_at: parse_timestamp(&raw.updated_at),
            extra: raw.extra,
        })
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewJournal {
    pub title: String,
    pub content: String,
    pub share_with_ai: bool,
}

impl NewJournal {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            share_with_ai: false,
        }
    }

    pub fn share_with_ai(mut self, share: bool) -> Self {
        self.share_with_ai = share;
        self
    }
}

pub struct JournalStore<'a> {
    client: &'a ApiClient,
    entries: Vec<JournalEntry>,
}

impl<'a> JournalStore<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Loads the entry list. A response that is not a list is logged and
    /// leaves the previous entries in place.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&mut self) -> Result<&[JournalEntry]> {
        require_user(self.client.auth()).await?;

        let data = self
            .client
            .get(JOURNALS_ENDPOINT, GetOptions::default())
            .await?;

        match data {
            Value::Array(items) => {
                self.entries = items
                    .into_iter()
                    .filter_map(|item| {
                        JournalEntry::from_value(item)
                            .map_err(|e| warn!("Skipping journal entry: {:#}", e))
                            .ok()
                    })
                    .collect();
                debug!("Fetched {} journal entries", self.entries.len());
            }
            other => warn!("Invalid journals data received: {}", other),
        }

        Ok(&self.entries)
    }

    #[tracing::instrument(skip(self, entry), fields(title = %entry.title))]
    pub async fn create(&mut self, entry: NewJournal) -> Result<Value> {
        require_user(self.client.auth()).await?;

        let created = self
            .client
            .post(JOURNAL_ENDPOINT, &entry, RequestOptions::default())
            .await?;

        self.client.clear_cache(Some(JOURNALS_ENDPOINT));
        self.fetch().await?;
        Ok(created)
    }
}
