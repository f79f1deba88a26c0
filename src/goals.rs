//! Goals store: fetches, creates and updates the signed-in user's goals.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::require_user;
use crate::http::{ApiClient, GetOptions, RequestOptions, path_segment};
use crate::timestamp::{parse_timestamp, to_date_string};

pub const GOALS_ENDPOINT: &str = "/api/goals";

const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub completed: bool,
    pub target_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fields the client does not interpret, kept as sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawGoal {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    target_date: Value,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    updated_at: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Goal {
    /// Normalizes one goal document. Missing creation and update times
    /// default to `now`.
    pub fn from_value(value: Value, now: DateTime<Utc>) -> Result<Self> {
        let raw: RawGoal = serde_json::from_value(value).context("Malformed goal document")?;
        let id = match raw.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => anyhow::bail!("Goal has an invalid id: {}", other),
        };

        Ok(Goal {
            id,
            title: raw.title.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            category: raw
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            completed: raw.completed.unwrap_or(false),
            target_date: parse_timestamp(&raw.target_date),
            created_at: parse_timestamp(&raw.created_at).unwrap_or(now),
            updated_at: parse_timestamp(&raw.updated_at).unwrap_or(now),
            extra: raw.extra,
        })
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewGoal {
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_date: Option<NaiveDate>,
}

impl NewGoal {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            target_date: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn target_date(mut self, date: NaiveDate) -> Self {
        self.target_date = Some(date);
        self
    }
}

/// Partial update of a goal. Only primitive values are sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalUpdate {
    fields: Map<String, Value>,
}

impl GoalUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Request body: non-primitive values are dropped and a parseable
    /// `target_date` becomes `YYYY-MM-DD`.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        for (key, value) in &self.fields {
            match value {
                Value::Array(_) | Value::Object(_) => {
                    debug!("Dropping non-primitive update field '{}'", key);
                }
                Value::String(s) if key == "target_date" => {
                    let normalized = parse_timestamp(value)
                        .map(|ts| to_date_string(&ts))
                        .unwrap_or_else(|| {
                            warn!("Invalid date string: {}", s);
                            s.clone()
                        });
                    body.insert(key.clone(), Value::String(normalized));
                }
                _ => {
                    body.insert(key.clone(), value.clone());
                }
            }
        }
        body
    }
}

/// Client-side view of the user's goals.
pub struct GoalsStore<'a> {
    client: &'a ApiClient,
    goals: Vec<Goal>,
}

impl<'a> GoalsStore<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            goals: Vec::new(),
        }
    }

    /// Goals from the last fetch.
    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn active(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| !g.completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| g.completed)
    }

    pub fn find(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&mut self) -> Result<&[Goal]> {
        self.require_user().await?;

        let data = self
            .client
            .get(GOALS_ENDPOINT, GetOptions::default())
            .await?;

        let items = match data {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("goals") {
                Some(Value::Array(items)) => items,
                _ => anyhow::bail!("Unexpected goals response: expected a list"),
            },
            Value::Null => Vec::new(),
            _ => anyhow::bail!("Unexpected goals response: expected a list"),
        };

        let now = Utc::now();
        self.goals = items
            .into_iter()
            .filter_map(|item| match Goal::from_value(item, now) {
                Ok(goal) => Some(goal),
                Err(e) => {
                    warn!("Skipping goal document: {:#}", e);
                    None
                }
            })
            .collect();
        debug!("Fetched {} goals", self.goals.len());

        Ok(&self.goals)
    }

    #[tracing::instrument(skip(self, goal), fields(title = %goal.title))]
    pub async fn create(&mut self, goal: NewGoal) -> Result<Value> {
        self.require_user().await?;

        let created = self
            .client
            .post(GOALS_ENDPOINT, &goal, RequestOptions::default())
            .await?;

        self.refresh().await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update(&mut self, id: &str, update: GoalUpdate) -> Result<Value> {
        self.require_user().await?;

        let body = update.to_body();
        debug!("Sending updates for goal {}: {:?}", id, body);
        let updated = self
            .client
            .put(&goal_endpoint(id), &body, RequestOptions::default())
            .await?;

        self.refresh().await?;
        Ok(updated)
    }

    /// Flips the completion flag of a goal from the last fetch.
    pub async fn toggle_completion(&mut self, id: &str) -> Result<Value> {
        let completed = self
            .find(id)
            .map(|g| g.completed)
            .with_context(|| format!("Goal with ID {} not found", id))?;

        self.update(id, GoalUpdate::new().set("completed", !completed))
            .await
    }

    /// Drops cached goal responses and refetches.
    async fn refresh(&mut self) -> Result<()> {
        self.client.clear_cache(Some(GOALS_ENDPOINT));
        self.fetch().await?;
        Ok(())
    }

    async fn require_user(&self) -> Result<()> {
        require_user(self.client.auth()).await.map(drop)
    }
}

fn goal_endpoint(id: &str) -> String {
    format!("/api/goal/{}", path_segment(id))
}
