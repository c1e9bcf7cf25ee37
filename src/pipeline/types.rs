//! Shared types for the transcript processing pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::MessageOutcome;

// ── Listing candidate ───────────────────────────────────────────────

/// A structured housing listing ready for hand-off to a listing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub location: Option<String>,
    pub price: Option<String>,
    pub room_type: Option<String>,
    pub availability: Option<String>,
    pub contact_info: Option<String>,
    pub amenities: Option<String>,
    pub confidence: f32,
    /// Amount parsed from `price`, in the price's own currency. `None` when
    /// the price is quoted only per week, day or year.
    pub monthly_rent: Option<f64>,
    pub extraction_method: String,
    /// Position of the source message in the parsed transcript.
    pub message_index: usize,
    pub sender: Option<String>,
    pub posted_at: Option<String>,
    pub original_message: String,
}

// ── Statistics ──────────────────────────────────────────────────────

/// Aggregate numbers for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub total_messages: usize,
    pub housing_messages: usize,
    pub non_housing_messages: usize,
    pub extracted_listings: usize,
    pub threats_blocked: usize,
    pub fallback_messages: usize,
    /// Seconds, summed over every result.
    pub total_processing_time: f64,
    pub average_processing_time: f64,
    /// Mean confidence over housing results only; 0 when there are none.
    pub average_confidence: f64,
    /// Percentage of messages classified as housing, one decimal place.
    pub housing_detection_rate: f64,
}

// ── Batches ─────────────────────────────────────────────────────────

/// Which path produced a batch's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum BatchPath {
    External,
    Fallback { reason: String },
}

impl BatchPath {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Fallback { .. } => "fallback",
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub index: usize,
    /// Indices of the messages in this batch, in submission order.
    pub message_indices: Vec<usize>,
    #[serde(flatten)]
    pub path: BatchPath,
    pub elapsed_ms: u64,
}

/// Output of one orchestration round.
#[derive(Debug, Clone)]
pub struct Orchestration {
    /// One outcome per message, index-aligned with the input. Shorter than
    /// the input only when the run was cancelled.
    pub outcomes: Vec<MessageOutcome>,
    pub batches: Vec<BatchReport>,
    pub cancelled: bool,
}

// ── Run report ──────────────────────────────────────────────────────

/// Caller options for a run.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RunOptions {
    /// Include every per-message outcome in the report.
    #[serde(default)]
    pub include_results: bool,
}

/// Everything a caller gets back from one transcript run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: PipelineStats,
    pub listings: Vec<Listing>,
    pub batches: Vec<BatchReport>,
    pub parsed_messages: usize,
    pub processed_messages: usize,
    pub external_batches: usize,
    pub fallback_batches: usize,
    /// True when at least one batch reached the external service.
    pub external_path_used: bool,
    /// True when any batch fell back to keyword classification.
    pub degraded: bool,
    pub cancelled: bool,
    pub store_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MessageOutcome>>,
}
