#[cfg(test)]
mod tests;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Embedding client for a local Ollama server's `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

/// Transient failures are retried with a doubling delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(1 << attempt.saturating_sub(1).min(16))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// A model installed on the Ollama server
#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to build Ollama URL from embedding config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1) as usize,
            agent: agent_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry: RetryPolicy {
                attempts: DEFAULT_RETRY_ATTEMPTS,
                delay: DEFAULT_RETRY_DELAY,
            },
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent_with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; later retries double it
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the server answers and has the configured model installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let models = self.list_models().context("Ollama server is unreachable")?;

        if !models.iter().any(|m| m.name == self.model) {
            let installed: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Embedding model {} is not installed; found {:?}",
                self.model, installed
            );
            anyhow::bail!(
                "Embedding model '{}' is not installed (run `ollama pull {}`)",
                self.model,
                self.model
            );
        }

        info!("Ollama at {} serves {}", self.base_url, self.model);
        Ok(())
    }

    /// Models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build tags URL")?;

        let body = self
            .with_retries(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .map_err(|e| anyhow::anyhow!("Failed to list Ollama models: {e}"))?;

        let tags: TagsResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama tags response")?;
        debug!("Ollama reports {} installed models", tags.models.len());
        Ok(tags.models)
    }

    fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| EmbeddingError::Request(format!("Invalid embed URL: {e}")))?;
        let payload = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: texts,
        })
        .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let body = self
            .with_retries(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&payload)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            EmbeddingError::Request(format!("Unreadable embed response: {e}"))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: response.embeddings.len(),
            });
        }

        Ok(response.embeddings)
    }

    fn with_retries<F>(&self, mut send: F) -> Result<String, ureq::Error>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let error = match send() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if !is_transient(&error) || attempt >= self.retry.attempts {
                warn!(
                    "Ollama request to {} failed on attempt {}/{}: {}",
                    self.base_url, attempt, self.retry.attempts, error
                );
                return Err(error);
            }

            let delay = self.retry.delay_after(attempt);
            debug!(
                "Ollama request failed ({}), retrying in {:?} ({}/{})",
                error, delay, attempt, self.retry.attempts
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }
}

/// Server-side failures and transport hiccups are worth another attempt
fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl Embedder for OllamaClient {
    #[inline]
    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_request(batch)?);
        }

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }

    #[inline]
    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
