use super::*;

fn section<'a>(prompt: &'a str, header: &str) -> &'a str {
    let start = prompt.find(header).expect("header present") + header.len();
    let rest = &prompt[start..];
    let end = rest.find("\n\n===").or_else(|| rest.find("\n\nNow,")).unwrap_or(rest.len());
    rest[..end].trim()
}

#[test]
fn absent_patient_and_empty_context_use_placeholders() {
    let prompt = compose("How much water should I drink?", "", None);

    assert_eq!(
        section(&prompt, "=== Patient Medical History ==="),
        NO_PATIENT_DATA
    );
    assert_eq!(
        section(&prompt, "=== Medical Context from Knowledge Base ==="),
        ""
    );
    assert_eq!(
        section(&prompt, "=== User Query ==="),
        "How much water should I drink?"
    );
    assert!(prompt.ends_with(INSTRUCTION));
}

#[test]
fn all_empty_inputs_still_produce_every_section() {
    let prompt = compose("", "", None);

    let positions: Vec<usize> = [
        "=== Patient Medical History ===",
        "=== Medical Context from Knowledge Base ===",
        "=== User Query ===",
        INSTRUCTION,
    ]
    .iter()
    .map(|marker| prompt.find(marker).expect("marker present"))
    .collect();

    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn patient_record_is_rendered() {
    let patient = PatientRecord {
        primary_diagnosis: Some("Chronic Kidney Disease Stage 3".to_string()),
        medications: vec!["Amlodipine 5mg".to_string()],
        ..PatientRecord::new("Maria Lopez")
    };

    let prompt = compose(
        "Can I eat bananas?",
        "Potassium intake should be limited in CKD.",
        Some(&patient),
    );
    let history = section(&prompt, "=== Patient Medical History ===");

    assert!(history.contains("- Name: Maria Lopez"));
    assert!(history.contains("Chronic Kidney Disease Stage 3"));
    assert!(history.contains("Amlodipine 5mg"));
    assert!(!prompt.contains(NO_PATIENT_DATA));
    assert_eq!(
        section(&prompt, "=== Medical Context from Knowledge Base ==="),
        "Potassium intake should be limited in CKD."
    );
}

#[test]
fn composition_is_deterministic() {
    assert_eq!(
        compose("q", "context one\n\ncontext two", None),
        compose("q", "context one\n\ncontext two", None)
    );
}
