use serde::{Deserialize, Serialize};

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model name (e.g., "llama3.2", "gemma2")
    pub model: String,

    /// Fully formatted prompt text
    pub prompt: String,

    /// Disable streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Generation options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

/// Generation options
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct GenerateOptions {
    /// Temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// Ollama generate response (one line of the NDJSON stream when streaming)
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Model name
    pub model: String,

    /// Generated text
    pub response: String,

    /// Whether generation is complete
    pub done: bool,
}
