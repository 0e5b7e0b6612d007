use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_CHAT_MODEL: &str = "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// Generation parameters are fixed for the question-answering flow.
pub const MAX_TOKENS: u32 = 400;
pub const TEMPERATURE: f32 = 0.7;
pub const TOP_P: f32 = 0.7;
pub const TOP_K: u32 = 50;
pub const REPETITION_PENALTY: f32 = 1.0;
pub const STOP_SEQUENCES: &[&str] = &["<|eot_id|>", "<|eom_id|>"];

/// An OpenAI-compatible chat-completion backend. `api_key` holds the name of
/// the environment variable, not the key itself.
#[derive(Clone, Debug)]
pub enum Provider {
    Together {
        api_key: String,
        base_url: String,
        timeout: Duration,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Single-turn streamed request with the fixed generation parameters.
    pub fn streaming(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(MAX_TOKENS),
            temperature: Some(TEMPERATURE),
            top_p: Some(TOP_P),
            top_k: Some(TOP_K),
            repetition_penalty: Some(REPETITION_PENALTY),
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
            stream: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One server-sent event payload of a streamed completion.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ChatCompletionChunk {
    /// Text carried by this chunk, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
    }
}
