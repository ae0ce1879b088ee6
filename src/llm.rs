use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("endpoint returned HTTP {code}")]
    Status { code: u16 },
    #[error("unreadable response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Timeouts, connection failures, rate limits and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Connection(_) => true,
            LlmError::Status { code } => *code == 429 || *code >= 500,
            LlmError::Parse(_) => false,
        }
    }
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError>;
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// Returns `None` when neither an endpoint nor a key is configured.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let base_url = dotenv::var("LLM_BASE_URL").ok().filter(|u| !u.is_empty());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        if base_url.is_none() && api_key.is_none() {
            return Ok(None);
        }
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let model = dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        // Per-attempt deadlines are enforced by the caller; this is a backstop.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Some(Self {
            client,
            base_url,
            model,
            api_key,
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    /// Non-streaming chat completion.
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
            "max_tokens": 512,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(Duration::from_secs(120))
            } else {
                LlmError::Connection(e.to_string())
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                code: status.as_u16(),
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> LlmClient {
        LlmClient {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            model: "m".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client("http://localhost:1234/v1/").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client("http://host").endpoint(),
            "http://host/v1/chat/completions"
        );
        assert_eq!(
            client("http://host/v1/chat/completions").endpoint(),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(LlmError::Connection("reset".into()).is_retryable());
        assert!(LlmError::Status { code: 429 }.is_retryable());
        assert!(LlmError::Status { code: 503 }.is_retryable());
        assert!(!LlmError::Status { code: 401 }.is_retryable());
        assert!(!LlmError::Parse("eof".into()).is_retryable());
    }
}
