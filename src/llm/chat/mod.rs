
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{GenerationRequest, InferenceError, LanguageModel};
use crate::config::LlmConfig;

/// Longest error body echoed back in `InferenceError::Status`
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Client for OpenAI-compatible `chat/completions` endpoints
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    endpoint: Url,
    model: String,
    token: Option<String>,
    timeout: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .chat_completions_url()
            .context("Failed to build chat completions URL from config")?;

        let token = config.token();
        if token.is_none() {
            warn!(
                "{} is not set; language model requests will be sent without credentials",
                config.token_env
            );
        }

        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            token,
            timeout: config.timeout(),
            agent,
        })
    }

    #[inline]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        serde_json::to_string(&body).map_err(|e| InferenceError::MalformedResponse(e.to_string()))
    }
}

impl LanguageModel for ChatCompletionsClient {
    #[inline]
    fn model_id(&self) -> String {
        self.model.clone()
    }

    #[inline]
    fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let timeout = request.deadline.unwrap_or(self.timeout);
        let body = self.request_body(request)?;

        debug!(
            "Requesting completion from {} (model {}, max_tokens {})",
            self.endpoint, self.model, request.max_tokens
        );

        let mut builder = self
            .agent
            .post(self.endpoint.as_str())
            .config()
            .timeout_global(Some(timeout))
            .build()
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", &format!("Bearer {token}"));
        }

        let mut response = builder
            .send(&body)
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(e, timeout))?;

        if !(200..300).contains(&status) {
            warn!("Language model returned HTTP {}", status);
            return Err(InferenceError::Status {
                code: status,
                message: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        parse_completion(&text)
    }
}

/// Pull the first choice's content out of a chat completion response
fn parse_completion(text: &str) -> Result<String, InferenceError> {
    let response: ChatResponse = serde_json::from_str(text)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".to_string()))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(InferenceError::MalformedResponse(
            "completion is empty".to_string(),
        ));
    }

    Ok(content.to_string())
}

fn transport_error(error: ureq::Error, timeout: Duration) -> InferenceError {
    match error {
        ureq::Error::Timeout(_) => InferenceError::Timeout(timeout),
        ureq::Error::StatusCode(code) => InferenceError::Status {
            code,
            message: String::new(),
        },
        other => InferenceError::Network(other.to_string()),
    }
}
