//! `chat` subcommand.

use anyhow::Result;
use serde_json::Value;

use crate::{chat::ChatSession, loading::ExecuteOptions};

use super::config::Config;

/// Sends one message, in a new conversation unless `conversation_id` is
/// given. Generating a reply is not idempotent, so nothing is retried.
#[tracing::instrument(skip(config, message))]
pub async fn send(config: &Config, message: &str, conversation_id: Option<&str>) -> Result<Value> {
    let client = &config.client;
    config
        .tracker
        .execute_with_loading(
            "chat",
            |signal| async move {
                let mut session = match conversation_id {
                    Some(id) => ChatSession::resume(client, id),
                    None => ChatSession::new(client),
                };
                session.send_message(message, Some(signal)).await
            },
            ExecuteOptions::default().retries(0),
        )
        .await
}
