//! Batch orchestrator — fans screened messages out to the external service.
//!
//! **Core invariant: one outcome per message, in input order.** Outcomes
//! are written into a buffer indexed by message position, so a failed batch
//! is replaced in place by keyword fallback results without disturbing its
//! neighbours.
//!
//! Flow:
//! 1. Security screen every message; blocked ones are decided immediately
//!    and never sent out
//! 2. Chunk the remaining messages into batches of `batch_size`
//! 3. Submit batches (sequentially by default), falling back per batch on
//!    timeout, transport error, or an explicit failure response
//!
//! Failed batches are not retried here.

use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{BatchResponse, ExternalClassifier, MessageOutcome, MessageResponse};
use crate::config::PipelineConfig;
use crate::error::{ClassifierError, PipelineError};
use crate::pipeline::types::{BatchPath, BatchReport, Orchestration};
use crate::safety::SafetyLayer;
use crate::transcript::ParsedMessage;

/// A group of messages submitted in one external call.
struct Batch {
    index: usize,
    indices: Vec<usize>,
    contents: Vec<String>,
}

/// A batch after its results are known.
struct BatchCompletion {
    indices: Vec<usize>,
    outcomes: Vec<MessageOutcome>,
    report: BatchReport,
}

/// Drives one run's messages through the external classifier.
pub struct BatchOrchestrator {
    classifier: Arc<dyn ExternalClassifier>,
    safety: Arc<SafetyLayer>,
    config: PipelineConfig,
}

impl BatchOrchestrator {
    /// Create an orchestrator. Rejects a zero batch size or zero concurrency.
    pub fn new(
        classifier: Arc<dyn ExternalClassifier>,
        safety: Arc<SafetyLayer>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if config.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }
        if config.max_in_flight == 0 {
            return Err(PipelineError::InvalidConcurrency);
        }
        Ok(Self {
            classifier,
            safety,
            config,
        })
    }

    pub fn safety(&self) -> &SafetyLayer {
        &self.safety
    }

    pub fn classifier(&self) -> &Arc<dyn ExternalClassifier> {
        &self.classifier
    }

    /// Classify every message, in order.
    ///
    /// If `cancel` fires, no further batch is awaited and the outcomes cover
    /// the longest prefix of messages that were already decided.
    pub async fn run(&self, messages: &[ParsedMessage], cancel: &CancellationToken) -> Orchestration {
        let mut slots: Vec<Option<MessageOutcome>> = vec![None; messages.len()];
        let mut pending = Vec::with_capacity(messages.len());

        for (i, message) in messages.iter().enumerate() {
            let scan = self.safety.scan(&message.content);
            if scan.blocked {
                slots[i] = Some(MessageOutcome::blocked(scan.threats));
            } else {
                pending.push(i);
            }
        }

        let batches: Vec<Batch> = pending
            .chunks(self.config.batch_size)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                indices: chunk.to_vec(),
                contents: chunk.iter().map(|&i| messages[i].content.clone()).collect(),
            })
            .collect();

        info!(
            messages = messages.len(),
            blocked = messages.len() - pending.len(),
            batches = batches.len(),
            batch_size = self.config.batch_size,
            classifier = self.classifier.name(),
            "Dispatching batches"
        );

        let mut reports = Vec::with_capacity(batches.len());
        let mut cancelled = false;
        // `buffered` keeps completion order equal to submission order.
        let mut completions = pin!(
            stream::iter(batches)
                .map(|batch| self.dispatch(batch))
                .buffered(self.config.max_in_flight)
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = completions.next() => next,
            };
            let Some(done) = next else { break };

            for (&i, outcome) in done.indices.iter().zip(done.outcomes) {
                slots[i] = Some(outcome);
            }
            reports.push(done.report);
        }

        if cancelled {
            warn!(
                completed_batches = reports.len(),
                "Run cancelled; keeping completed batches"
            );
        }

        let outcomes: Vec<MessageOutcome> = slots.into_iter().map_while(|slot| slot).collect();
        debug_assert!(cancelled || outcomes.len() == messages.len());

        Orchestration {
            outcomes,
            batches: reports,
            cancelled,
        }
    }

    /// Submit one batch, substituting fallback results on any failure.
    async fn dispatch(&self, batch: Batch) -> BatchCompletion {
        let started = Instant::now();
        let expected = batch.contents.len();
        let timeout = self.config.batch_timeout;

        let response =
            match tokio::time::timeout(timeout, self.classifier.batch_process(&batch.contents)).await {
                Ok(Ok(BatchResponse::Success { results })) if results.len() == expected => Ok(results),
                Ok(Ok(BatchResponse::Success { results })) => Err(format!(
                    "expected {expected} results, got {}",
                    results.len()
                )),
                Ok(Ok(BatchResponse::Failure { reason })) => Err(reason),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(ClassifierError::Timeout {
                    operation: "batch_process",
                    timeout,
                }
                .to_string()),
            };

        let (outcomes, path) = match response {
            Ok(results) => (results, BatchPath::External),
            Err(reason) => {
                warn!(
                    batch = batch.index,
                    size = expected,
                    reason = %reason,
                    "Batch failed, substituting keyword fallback"
                );
                let outcomes = batch
                    .contents
                    .iter()
                    .map(|content| MessageOutcome::fallback(content))
                    .collect();
                (outcomes, BatchPath::Fallback { reason })
            }
        };

        let report = BatchReport {
            index: batch.index,
            message_indices: batch.indices.clone(),
            path,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            batch = report.index,
            size = expected,
            path = report.path.label(),
            elapsed_ms = report.elapsed_ms,
            "Batch complete"
        );

        BatchCompletion {
            indices: batch.indices,
            outcomes,
            report,
        }
    }

    /// Screen and classify a single message, falling back locally on failure.
    pub async fn process_one(&self, content: &str) -> MessageOutcome {
        let scan = self.safety.scan(content);
        if scan.blocked {
            return MessageOutcome::blocked(scan.threats);
        }

        let timeout = self.config.message_timeout;
        let reason = match tokio::time::timeout(timeout, self.classifier.process_message(content)).await {
            Ok(Ok(MessageResponse::Success { result })) => return result,
            Ok(Ok(MessageResponse::Failure { reason })) => reason,
            Ok(Err(e)) => e.to_string(),
            Err(_) => ClassifierError::Timeout {
                operation: "process_message",
                timeout,
            }
            .to_string(),
        };

        warn!(reason = %reason, "Single-message classification failed, using keyword fallback");
        MessageOutcome::fallback(content)
    }
}
