pub mod perplexity;
pub mod sse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "sonar";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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

/// A selectable completion model.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "sonar",
        name: "Sonar",
        description: "Fast, lightweight answers grounded in recent market news.",
    },
    ModelInfo {
        id: "sonar-pro",
        name: "Sonar Pro",
        description: "Deeper search and longer answers for detailed stock research.",
    },
    ModelInfo {
        id: "sonar-reasoning",
        name: "Sonar Reasoning",
        description: "Step-by-step reasoning for valuation and comparison questions.",
    },
    ModelInfo {
        id: "sonar-reasoning-pro",
        name: "Sonar Reasoning Pro",
        description: "Most thorough analysis; slower and more expensive.",
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    MODEL_CATALOG.iter().find(|m| m.id == id)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub search_domain_filter: Vec<String>,
    pub search_recency_filter: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub related_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// Transport seam between the completion client and an HTTP provider.
///
/// `chat_stream` must hand every delta to `on_chunk` in provider order before
/// returning; on a mid-stream failure the deltas already delivered stand.
#[async_trait(?Send)]
pub trait CompletionBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn FnMut(StreamChunk) + '_),
    ) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}
