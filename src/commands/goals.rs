//! `goals` subcommands.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;

use crate::{
    goals::{GoalsStore, NewGoal},
    loading::ExecuteOptions,
};

use super::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalFilter {
    #[default]
    All,
    Active,
    Completed,
}

/// Lists goals as JSON, optionally filtered by completion.
#[tracing::instrument(skip(config))]
pub async fn list(config: &Config, filter: GoalFilter) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "goals",
            |_| async move {
                let mut store = GoalsStore::new(client);
                store.fetch().await?;
                let goals: Vec<_> = match filter {
                    GoalFilter::All => store.goals().iter().collect(),
                    GoalFilter::Active => store.active().collect(),
                    GoalFilter::Completed => store.completed().collect(),
                };
                Ok(serde_json::to_value(goals)?)
            },
            ExecuteOptions::default(),
        )
        .await
}

#[tracing::instrument(skip(config, description, category))]
pub async fn add(
    config: &Config,
    title: &str,
    description: Option<&str>,
    category: Option<&str>,
    target_date: Option<NaiveDate>,
) -> Result<Value> {
    let mut goal = NewGoal::new(title);
    if let Some(description) = description {
        goal = goal.description(description);
    }
    if let Some(category) = category {
        goal = goal.category(category);
    }
    if let Some(date) = target_date {
        goal = goal.target_date(date);
    }

    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "goals:create",
            |_| {
                let goal = goal.clone();
                async move { GoalsStore::new(client).create(goal).await }
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}

#[tracing::instrument(skip(config))]
pub async fn toggle(config: &Config, id: &str) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "goals:toggle",
            |_| async move {
                let mut store = GoalsStore::new(client);
                store.fetch().await?;
                store.toggle_completion(id).await
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}
