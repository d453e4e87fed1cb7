// Conversational agents
// Routes each message to the receptionist, the clinical assistant or web research


pub mod intent;
pub mod receptionist;
pub mod web;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::patients::{PatientLookup, PatientRecord};
use crate::rag::{DEFAULT_TOP_K, RagAssistant};

pub use intent::{Intent, classify};
pub use receptionist::{Receptionist, default_greeting};
pub use web::{DuckDuckGoSearch, SearchHit, WebSearch, format_results};

const WEB_RESULT_LIMIT: usize = 5;

/// Agent that produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Receptionist,
    Clinical,
    WebResearch,
}

impl fmt::Display for AgentRole {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Receptionist => "Receptionist",
            Self::Clinical => "Clinical Agent",
            Self::WebResearch => "Web Research",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub role: AgentRole,
    pub intent: Intent,
    pub response: String,
}

pub struct Orchestrator {
    receptionist: Receptionist,
    clinical: Arc<RagAssistant>,
    web: Arc<dyn WebSearch>,
    patients: Arc<dyn PatientLookup>,
    top_k: usize,
}

impl Orchestrator {
    #[inline]
    pub fn new(
        receptionist: Receptionist,
        clinical: Arc<RagAssistant>,
        web: Arc<dyn WebSearch>,
        patients: Arc<dyn PatientLookup>,
    ) -> Self {
        Self {
            receptionist,
            clinical,
            web,
            patients,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Opening line for a session, personalized when the patient is on record
    #[inline]
    pub fn open_session(&self, patient_name: &str) -> String {
        match self.find_patient(patient_name) {
            Some(patient) => self.receptionist.greet(&patient),
            None => default_greeting(patient_name),
        }
    }

    /// Classify and route one message
    #[inline]
    pub fn handle(&self, message: &str, patient_name: Option<&str>) -> AgentReply {
        let intent = classify(message);
        info!(source = "Orchestrator", "Detected intent: {}", intent);

        match intent {
            Intent::Medical => {
                let patient = patient_name.and_then(|name| self.find_patient(name));
                let answer =
                    self.clinical
                        .answer_for_patient(message, self.top_k, patient.as_ref());
                AgentReply {
                    role: AgentRole::Clinical,
                    intent,
                    response: answer.answer,
                }
            }
            Intent::Web => {
                let response = match self.web.search(message, WEB_RESULT_LIMIT) {
                    Ok(hits) => format_results(message, &hits),
                    Err(e) => {
                        warn!(source = "WebSearch", "Web search failed: {:#}", e);
                        format!("Error fetching web data: {e}")
                    }
                };
                AgentReply {
                    role: AgentRole::WebResearch,
                    intent,
                    response,
                }
            }
            Intent::General => AgentReply {
                role: AgentRole::Receptionist,
                intent,
                response: self.receptionist.respond(message),
            },
        }
    }

    fn find_patient(&self, name: &str) -> Option<PatientRecord> {
        match self.patients.lookup(name) {
            Ok(record) => record,
            Err(e) => {
                warn!(source = "Orchestrator", "Patient lookup failed for {}: {:#}", name, e);
                None
            }
        }
    }
}
