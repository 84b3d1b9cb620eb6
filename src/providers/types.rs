use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ModelInfo, Role};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone)]
pub struct ChatRequest {
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRequest")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("messages", &format!("[{} messages]", self.messages.len()))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text delta as delivered by the endpoint.
    Token(String),
    Done {
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
    },
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
}

/// A model advertised by the endpoint's `/models` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModel {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
}

impl From<RemoteModel> for ModelInfo {
    fn from(remote: RemoteModel) -> Self {
        let provider = remote
            .id
            .split_once('/')
            .map(|(vendor, _)| vendor.to_string())
            .unwrap_or_default();
        ModelInfo {
            provider,
            name: remote.name,
            description: None,
            context_length: remote.context_length.unwrap_or_default(),
            input_price: 0.0,
            output_price: 0.0,
            id: remote.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let req = ChatRequest {
            api_key: "sk-or-secret".into(),
            model: "m".into(),
            messages: vec![],
            base_url: "http://localhost".into(),
            temperature: None,
            max_tokens: None,
        };
        let out = format!("{req:?}");
        assert!(!out.contains("sk-or-secret"));
        assert!(out.contains("***"));
    }

    #[test]
    fn remote_model_converts_to_model_info() {
        let info: ModelInfo = RemoteModel {
            id: "openai/gpt-4o".into(),
            name: "GPT-4o".into(),
            context_length: Some(128_000),
        }
        .into();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.name, "GPT-4o");
        assert_eq!(info.context_length, 128_000);
    }
}
