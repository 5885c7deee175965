//! AI coaching assistant
//!
//! Chat messages are never cached or retried automatically; a failure
//! notifies (with a retry action when it makes sense) and is returned.

use peloton_client::{ApiRequest, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{PelotonApi, decode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

impl PelotonApi {
    pub async fn send_message(&self, prompt: &str, history: &[ChatMessage]) -> Result<ChatReply> {
        debug!(turns = history.len(), "sending chat message");
        let body = json!({ "prompt": prompt, "history": history });
        let data = self.client.send(ApiRequest::post("/chat", body)).await?;
        decode(data)
    }
}
