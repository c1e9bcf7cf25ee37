//! Keyword fallback classifier.
//!
//! Used only when the external service cannot answer for a batch. It keeps
//! the pipeline moving; it is not meant to be accurate. Confidence is fixed
//! and no extraction is attempted.

use super::{ClassificationResult, SecurityStatus};

/// Confidence reported for every fallback result.
pub const FALLBACK_CONFIDENCE: f32 = 0.6;

/// Lower-case terms that mark a message as housing-related.
const HOUSING_KEYWORDS: &[&str] = &[
    "rent",
    "apartment",
    "apt",
    "housing",
    "room",
    "lease",
    "price",
    "cost",
    "budget",
    "available",
    "sublet",
    "sublease",
    "roommate",
    "bhk",
    "studio",
    "furnished",
    "utilities",
    "accommodation",
    "bedroom",
    "move-in",
    "/month",
];

/// Classify `content` by keyword presence.
pub fn classify(content: &str) -> ClassificationResult {
    let lowered = content.to_lowercase();
    let matched: Vec<&str> = HOUSING_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lowered.contains(kw))
        .collect();

    let reasoning = if matched.is_empty() {
        "Keyword fallback: no housing terms found".to_string()
    } else {
        format!("Keyword fallback matched: {}", matched.join(", "))
    };

    ClassificationResult {
        is_housing: !matched.is_empty(),
        confidence: FALLBACK_CONFIDENCE,
        reasoning,
        security_status: SecurityStatus::Safe,
        threats: Vec::new(),
    }
}
