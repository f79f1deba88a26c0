//! Chat with the AI companion.

use anyhow::Result;
use log::debug;
use serde::Serialize;
use serde_json::{Value, json};

use crate::auth::require_user;
use crate::cancel::CancelHandle;
use crate::http::{ApiClient, RequestOptions};

pub const SENTIMENT_ENDPOINT: &str = "/api/analyze_sentiment";
pub const RESPONSE_ENDPOINT: &str = "/api/generate_response";

#[derive(Serialize)]
struct ResponseRequest<'a> {
    message: &'a str,
    sentiment: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// One conversation. The backend assigns the id on the first message.
pub struct ChatSession<'a> {
    client: &'a ApiClient,
    conversation_id: Option<String>,
}

impl<'a> ChatSession<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            conversation_id: None,
        }
    }

    /// Continues an existing conversation.
    pub fn resume(client: &'a ApiClient, conversation_id: impl Into<String>) -> Self {
        Self {
            client,
            conversation_id: Some(conversation_id.into()),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Scores the message's sentiment, then asks for a reply to it.
    /// Returns the reply document.
    #[tracing::instrument(skip(self, message, signal))]
    pub async fn send_message(
        &mut self,
        message: &str,
        signal: Option<CancelHandle>,
    ) -> Result<Value> {
        require_user(self.client.auth()).await?;

        let options = RequestOptions { signal };
        let sentiment = self
            .client
            .post(SENTIMENT_ENDPOINT, &json!({ "message": message }), options.clone())
            .await?;

        let request = ResponseRequest {
            message,
            sentiment: &sentiment,
            conversation_id: self.conversation_id.as_deref(),
        };
        let reply = self.client.post(RESPONSE_ENDPOINT, &request, options).await?;

        if self.conversation_id.is_none() {
            if let Some(id) = reply.get("conversation_id").and_then(Value::as_str) {
                debug!("Started conversation {}", id);
                self.conversation_id = Some(id.to_string());
            }
        }
        Ok(reply)
    }
}
