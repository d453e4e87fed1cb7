// Retrieval-augmented answering
// Embeds the query, retrieves context, composes the prompt and calls the language model


pub mod composer;

use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::index::{EmbeddingIndex, RetrievalResult};
use crate::llm::{GenerationRequest, InferenceError, LanguageModel};
use crate::patients::PatientRecord;

pub use composer::{NO_PATIENT_DATA, compose};

pub const SYSTEM_PROMPT: &str = "You are a helpful medical assistant.";
pub const FALLBACK_ANSWER: &str = "Sorry, I encountered an issue generating the medical response.";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_TOKENS: u32 = 400;

/// Outcome of one language model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Generated(String),
    /// The call failed; the fallback text stands in for the answer
    Fallback(InferenceError),
}

impl Generation {
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Fallback(_) => FALLBACK_ANSWER,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Grounded answer returned to callers; both text fields are always present
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Retrieved chunk texts, closest first, separated by blank lines
    pub context: String,
    pub answer: String,
    pub sources: Vec<RetrievalResult>,
    /// Set when generation failed and `answer` holds the fallback text
    #[serde(skip)]
    pub degraded: Option<InferenceError>,
}

/// Answering service with injected index and language model
pub struct RagAssistant {
    index: Arc<EmbeddingIndex>,
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
    deadline: Option<Duration>,
}

impl RagAssistant {
    #[inline]
    pub fn new(index: Arc<EmbeddingIndex>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            index,
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            deadline: None,
        }
    }

    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    /// Bound each language model call; exceeding it yields `InferenceError::Timeout`
    #[inline]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[inline]
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Answer without patient personalization
    #[inline]
    pub fn answer(&self, query: &str, k: usize) -> Answer {
        self.answer_for_patient(query, k, None)
    }

    /// Retrieve, compose and generate. Never fails: retrieval problems yield
    /// empty context and generation problems yield the fallback answer.
    #[inline]
    pub fn answer_for_patient(
        &self,
        query: &str,
        k: usize,
        patient: Option<&PatientRecord>,
    ) -> Answer {
        info!(source = "Clinical", "Retrieving medical context for: {}", query);

        let sources = self.retrieve(query, k);
        let context = sources.iter().map(|result| result.text.as_str()).join("\n\n");
        let prompt = compose(query, &context, patient);

        let generation = self.generate(&prompt);
        let answer = generation.text().to_string();
        let degraded = match generation {
            Generation::Generated(_) => None,
            Generation::Fallback(e) => Some(e),
        };

        Answer {
            context,
            answer,
            sources,
            degraded,
        }
    }

    /// Top-k chunks for `query`; failures are logged and produce no results
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        match self.index.search(query, k) {
            Ok(results) => {
                debug!("Retrieved {} chunks", results.len());
                results
            }
            Err(e) => {
                error!(source = "Clinical", "Retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Single language model call with the fixed system prompt, no retry
    #[inline]
    pub fn generate(&self, prompt: &str) -> Generation {
        let request = GenerationRequest::new(SYSTEM_PROMPT, prompt, self.max_tokens)
            .with_deadline(self.deadline);

        match self.model.generate(&request) {
            Ok(text) => {
                info!(source = "Clinical", "Medical response generated");
                Generation::Generated(text)
            }
            Err(e) => {
                error!(source = "Clinical", "Language model call failed: {}", e);
                Generation::Fallback(e)
            }
        }
    }
}
