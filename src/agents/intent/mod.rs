
use std::fmt;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::Serialize;

const WEB_KEYWORDS: &[&str] = &[
    "latest",
    "update",
    "research",
    "news",
    "recent",
    "current treatment",
    "new treatment",
    "recent study",
    "findings",
    "breakthrough",
    "paper",
    "publication",
    "guidelines",
    "discovery",
];

static MEDICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(pain|ache|cramp|swelling|fever|cough|infection|vomit|nausea|edema)\b",
        r"\b(kidney|urine|dialysis|bp|blood pressure|creatinine|urea|glucose)\b",
        r"\b(medicine|tablet|drug|dose|mg|prescription|treatment|therapy)\b",
        r"\b(symptom|diagnosis|disease|condition|disorder)\b",
        r"\b(follow[- ]?up|appointment|check[- ]?up)\b",
        r"\b(report|scan|test|result|x-ray|ultrasound|blood test)\b",
        r"\b(shortness of breath|dizziness|fatigue|numbness|itching)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

static QUESTION_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(should i|can i|do i need|is it okay if)").expect("valid regex")
});

/// Which handler a message is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Medical,
    Web,
    General,
}

impl fmt::Display for Intent {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Medical => "medical",
            Self::Web => "web",
            Self::General => "general",
        })
    }
}

/// Classify a user message.
///
/// Research vocabulary wins over medical vocabulary, so "latest dialysis
/// research" is a web question. Matching is case-insensitive.
#[inline]
pub fn classify(message: &str) -> Intent {
    let text = message.trim().to_lowercase();

    if WEB_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return Intent::Web;
    }

    let medical = MEDICAL_PATTERNS
        .iter()
        .any(|pattern| matches!(pattern.is_match(&text), Ok(true)));
    if medical || matches!(QUESTION_CUES.is_match(&text), Ok(true)) {
        return Intent::Medical;
    }

    Intent::General
}
