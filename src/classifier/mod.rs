//! Message classification — external service contract and local fallback.
//!
//! The external extraction service is a black box reached through the
//! [`ExternalClassifier`] trait. It may be slow, unreachable, or answer with
//! an explicit failure; callers see all three as either an `Err` or a
//! `Failure` variant and substitute [`fallback::classify`].

pub mod fallback;
pub mod http;

pub use http::HttpClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// Whether a message passed the security screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityStatus {
    #[default]
    Safe,
    ThreatBlocked,
}

/// Housing classification for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_housing: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub reasoning: String,
    pub security_status: SecurityStatus,
    pub threats: Vec<String>,
}

impl ClassificationResult {
    /// Result for a message rejected by the security filter.
    pub fn threat_blocked(threats: Vec<String>) -> Self {
        Self {
            is_housing: false,
            confidence: 0.0,
            reasoning: "Security threat detected - message rejected".to_string(),
            security_status: SecurityStatus::ThreatBlocked,
            threats,
        }
    }

    /// Whether this message may contribute a listing.
    pub fn is_listing_eligible(&self) -> bool {
        self.is_housing && self.security_status == SecurityStatus::Safe
    }
}

/// Structured fields pulled out of a housing message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub location: Option<String>,
    pub price: Option<String>,
    pub room_type: Option<String>,
    pub availability: Option<String>,
    pub contact_info: Option<String>,
    pub amenities: Option<String>,
    pub confidence: f32,
    pub extraction_method: String,
}

/// Which path produced a message's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    External,
    Fallback,
    SecurityFilter,
}

/// Per-message result from any path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOutcome {
    pub classification: ClassificationResult,
    /// Present only for housing messages the external service extracted.
    pub extraction: Option<ExtractionResult>,
    /// Seconds spent on this message as reported by the producing path.
    pub processing_time: f64,
    pub source: ResultSource,
}

impl MessageOutcome {
    /// Outcome for a message the security filter blocked.
    pub fn blocked(threats: Vec<String>) -> Self {
        Self {
            classification: ClassificationResult::threat_blocked(threats),
            extraction: None,
            processing_time: 0.0,
            source: ResultSource::SecurityFilter,
        }
    }

    /// Outcome from the local keyword classifier.
    pub fn fallback(content: &str) -> Self {
        Self {
            classification: fallback::classify(content),
            extraction: None,
            processing_time: 0.0,
            source: ResultSource::Fallback,
        }
    }
}

/// Response to a single-message call.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageResponse {
    Success { result: MessageOutcome },
    Failure { reason: String },
}

/// Response to a batch call.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResponse {
    /// One result per submitted content, in submission order.
    Success { results: Vec<MessageOutcome> },
    Failure { reason: String },
}

/// External service health as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Contract of the external extraction/classification service.
#[async_trait]
pub trait ExternalClassifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Classify and extract a single message.
    async fn process_message(&self, content: &str) -> Result<MessageResponse, ClassifierError>;

    /// Classify and extract a batch of messages.
    async fn batch_process(&self, contents: &[String]) -> Result<BatchResponse, ClassifierError>;

    /// Ask the service whether it is up.
    async fn health_check(&self) -> Result<HealthStatus, ClassifierError>;
}
