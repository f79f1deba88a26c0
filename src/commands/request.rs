//! Raw `get`, `post` and `put` commands.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::{
    http::{GetOptions, RequestOptions},
    loading::ExecuteOptions,
};

use super::config::Config;

/// Parses a `name=value` query parameter.
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid parameter '{}'. Expected 'name=value'.", raw))?;
    if name.is_empty() {
        anyhow::bail!("Invalid parameter '{}'. The name is empty.", raw);
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parses a JSON request body given on the command line.
pub fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Request body is not valid JSON: {}", raw))
}

/// GET with automatic retry of transient failures.
#[tracing::instrument(skip(config, params))]
pub async fn get(
    config: &Config,
    endpoint: &str,
    params: &[(String, String)],
    no_cache: bool,
) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            &format!("GET {}", endpoint),
            |signal| {
                let mut options = params
                    .iter()
                    .fold(GetOptions::default(), |o, (k, v)| o.param(k.as_str(), v))
                    .signal(signal);
                if no_cache {
                    options = options.no_cache();
                }
                async move { Ok(client.get(endpoint, options).await?) }
            },
            ExecuteOptions::default(),
        )
        .await
}

/// POST is not retried: the backend may already have applied it.
#[tracing::instrument(skip(config, body))]
pub async fn post(config: &Config, endpoint: &str, body: &Value) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            &format!("POST {}", endpoint),
            |signal| async move {
                Ok(client
                    .post(endpoint, body, RequestOptions::signal(signal))
                    .await?)
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}

#[tracing::instrument(skip(config, body))]
pub async fn put(config: &Config, endpoint: &str, body: &Value) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            &format!("PUT {}", endpoint),
            |signal| async move {
                Ok(client
                    .put(endpoint, body, RequestOptions::signal(signal))
                    .await?)
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}
