use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{GenerationRequest, LanguageModel};
use crate::patients::PatientRecord;

pub const PERSONA: &str = "You are a friendly medical receptionist AI assistant.";
const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.7;
const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

/// Small-talk agent that greets patients and handles non-medical messages
pub struct Receptionist {
    model: Arc<dyn LanguageModel>,
}

impl Receptionist {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Welcome a known patient back, mentioning their discharge
    #[inline]
    pub fn greet(&self, patient: &PatientRecord) -> String {
        let diagnosis = patient.primary_diagnosis.as_deref().unwrap_or("their condition");
        let discharged = patient
            .discharge_date
            .map_or_else(|| "recently".to_string(), |date| format!("on {date}"));

        let prompt = format!(
            "The patient {} was discharged with diagnosis '{}' {}. Greet the patient warmly, \
             mention their discharge, and ask how they are feeling today and if they are \
             following their medication schedule.",
            patient.patient_name, diagnosis, discharged
        );

        info!(source = "Reception", "Greeting {}", patient.patient_name);
        self.call(&prompt)
            .unwrap_or_else(|| default_greeting(&patient.patient_name))
    }

    /// Empathetic reply to a general message
    #[inline]
    pub fn respond(&self, message: &str) -> String {
        let prompt = format!(
            "The patient said: '{message}'. Generate an empathetic receptionist-style reply. \
             If it sounds medical (pain, symptoms, medicine, fever, etc.), gently suggest \
             connecting them to the clinical assistant."
        );

        self.call(&prompt)
            .unwrap_or_else(|| FALLBACK_REPLY.to_string())
    }

    fn call(&self, prompt: &str) -> Option<String> {
        let request =
            GenerationRequest::new(PERSONA, prompt, MAX_TOKENS).with_temperature(TEMPERATURE);

        match self.model.generate(&request) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(source = "Reception", "Receptionist model call failed: {}", e);
                None
            }
        }
    }
}

/// Greeting used when no record or no model reply is available
#[inline]
pub fn default_greeting(name: &str) -> String {
    format!("Hello {name}! How are you feeling today?")
}
