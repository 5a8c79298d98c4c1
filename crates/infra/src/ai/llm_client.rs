//! Client for any endpoint implementing OpenAI's `/v1/chat/completions`.
//!
//! Wire types are private; callers send a system and a user message and get
//! the reply text back.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM reply could not be decoded: {0}")]
    Decode(String),

    #[error("LLM reply was empty")]
    EmptyReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// Full chat-completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    pub api_url: String,
    pub model: String,
    /// Sent as a bearer token when present. Local servers usually need none.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One round trip: `system` then `user`, returning the first choice's text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message { role: "system", content: system },
                Message { role: "user", content: user },
            ],
            temperature: 0.2,
        };

        debug!(model = %self.config.model, content_len = user.len(), "sending LLM request");

        let mut req = self.client.post(&self.config.api_url).json(&payload);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.config.api_url, error = %e, "LLM HTTP request failed (transport)");
            LlmError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "LLM endpoint returned an error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LlmError::EmptyReply)
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_is_taken_from_the_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  {\"summary\":\"ok\"}  "}}],"usage":{}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let text = parsed.choices.into_iter().next().and_then(|c| c.message.content).unwrap();
        assert_eq!(text.trim(), r#"{"summary":"ok"}"#);
    }

    #[test]
    fn request_serializes_as_chat_completion() {
        let payload = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![Message { role: "user", content: "hi" }],
            temperature: 0.2,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
