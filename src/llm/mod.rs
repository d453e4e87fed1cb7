// Language model boundary
// Prompt in, text out; every failure is an InferenceError the caller must handle

pub mod chat;

use std::time::Duration;

use thiserror::Error;

pub use chat::ChatCompletionsClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("Language model call exceeded its deadline of {0:?}")]
    Timeout(Duration),
    #[error("Network failure calling language model: {0}")]
    Network(String),
    #[error("Language model service returned HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Malformed language model response: {0}")]
    MalformedResponse(String),
}

/// A single system + user exchange with a bounded output budget
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Abort the call after this long and report `InferenceError::Timeout`
    pub deadline: Option<Duration>,
}

impl GenerationRequest {
    #[inline]
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
            temperature: None,
            deadline: None,
        }
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[inline]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Hosted or local text generation capability
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> String;

    /// Produce a completion for `request`. Implementations must not retry.
    fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError>;
}
