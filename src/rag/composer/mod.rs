#[cfg(test)]
mod tests;

use crate::patients::PatientRecord;

pub const NO_PATIENT_DATA: &str = "No personal data available.";

const PREAMBLE: &str = "You are a compassionate clinical assistant specializing in nephrology post-discharge care.\n\
Use the medical context retrieved from research papers and the patient's medical history below\n\
to generate a helpful, safe, and empathetic response.";

const INSTRUCTION: &str =
    "Now, provide a concise, medically sound answer tailored to the patient's situation.";

/// Assemble the grounded prompt sent to the language model.
///
/// Sections always appear in the same order; an absent patient renders the
/// placeholder and empty context renders an empty section.
#[inline]
pub fn compose(query: &str, domain_context: &str, patient: Option<&PatientRecord>) -> String {
    let patient_section = patient.map_or_else(|| NO_PATIENT_DATA.to_string(), ToString::to_string);

    format!(
        "{PREAMBLE}\n\n\
         === Patient Medical History ===\n{patient_section}\n\n\
         === Medical Context from Knowledge Base ===\n{}\n\n\
         === User Query ===\n{}\n\n\
         {INSTRUCTION}",
        domain_context.trim(),
        query.trim(),
    )
}
