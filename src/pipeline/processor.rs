//! Transcript processor — one upload in, one run report out.
//!
//! Flow:
//! 1. Parse the transcript into ordered messages
//! 2. Orchestrate classification (security screen, batches, fallback)
//! 3. Normalize outcomes into listings and stats
//! 4. Hand listings to the configured store, if any
//!
//! A run never fails because the external service misbehaves. Degradation
//! is reported through the batch summary and the `degraded` flag in
//! [`RunReport`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::classifier::{ExternalClassifier, HealthStatus, HttpClassifier, MessageOutcome};
use crate::config::Config;
use crate::error::{ClassifierError, Result};
use crate::pipeline::normalizer;
use crate::pipeline::orchestrator::BatchOrchestrator;
use crate::pipeline::store::{HttpListingStore, ListingStore};
use crate::pipeline::types::{BatchPath, Listing, RunOptions, RunReport};
use crate::safety::SafetyLayer;
use crate::transcript;

/// Runs whole transcripts through the pipeline.
pub struct TranscriptProcessor {
    orchestrator: BatchOrchestrator,
    store: Option<Arc<dyn ListingStore>>,
    run_timeout: Option<Duration>,
}

impl TranscriptProcessor {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            orchestrator,
            store: None,
            run_timeout: None,
        }
    }

    /// Hand normalized listings to `store` after each run.
    pub fn with_store(mut self, store: Arc<dyn ListingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cancel runs that take longer than `timeout`, keeping partial results.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Wire up the HTTP classifier, the default safety rules, and the
    /// optional remote listing store from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let classifier: Arc<dyn ExternalClassifier> = Arc::new(HttpClassifier::new(&config.classifier));
        let orchestrator = BatchOrchestrator::new(
            classifier,
            Arc::new(SafetyLayer::new()),
            config.pipeline.clone(),
        )?;

        let mut processor = Self::new(orchestrator).with_run_timeout(config.pipeline.run_timeout);
        if let Some(url) = &config.server.listing_store_url {
            processor = processor.with_store(Arc::new(HttpListingStore::new(url.as_str())?));
        }
        Ok(processor)
    }

    pub fn safety(&self) -> &SafetyLayer {
        self.orchestrator.safety()
    }

    /// Process one transcript to completion (or until the run deadline).
    pub async fn process(&self, text: &str, options: RunOptions) -> RunReport {
        self.process_with_cancel(text, options, CancellationToken::new())
            .await
    }

    /// Read a transcript file and process it, stopping early if `cancel`
    /// fires. Only the read can fail.
    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let text = transcript::load(path).await?;
        Ok(self.process_with_cancel(&text, options, cancel).await)
    }

    /// Process one transcript, stopping early if `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        text: &str,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let messages = transcript::parse(text);
        info!(%run_id, messages = messages.len(), "Starting transcript run");

        let run_cancel = cancel.child_token();
        let deadline = self.run_timeout.map(|timeout| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(%run_id, ?timeout, "Run deadline reached, cancelling");
                token.cancel();
            })
        });

        let orchestration = self.orchestrator.run(&messages, &run_cancel).await;
        if let Some(handle) = deadline {
            handle.abort();
        }

        let normalized = normalizer::normalize(&messages, &orchestration.outcomes);
        let store_failures = self.hand_off(run_id, &normalized.listings).await;

        let external_batches = orchestration
            .batches
            .iter()
            .filter(|b| b.path == BatchPath::External)
            .count();
        let fallback_batches = orchestration.batches.len() - external_batches;
        let degraded = fallback_batches > 0 || normalized.stats.fallback_messages > 0;

        let report = RunReport {
            run_id,
            stats: normalized.stats,
            listings: normalized.listings,
            parsed_messages: messages.len(),
            processed_messages: orchestration.outcomes.len(),
            external_batches,
            fallback_batches,
            external_path_used: external_batches > 0,
            degraded,
            cancelled: orchestration.cancelled,
            store_failures,
            batches: orchestration.batches,
            results: options.include_results.then_some(orchestration.outcomes),
        };

        info!(
            %run_id,
            total = report.stats.total_messages,
            housing = report.stats.housing_messages,
            listings = report.stats.extracted_listings,
            blocked = report.stats.threats_blocked,
            external_batches,
            fallback_batches,
            cancelled = report.cancelled,
            "Transcript run complete"
        );
        report
    }

    /// Save each listing; returns how many saves failed.
    async fn hand_off(&self, run_id: Uuid, listings: &[Listing]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut failures = 0;
        for listing in listings {
            if let Err(e) = store.save(listing).await {
                error!(
                    %run_id,
                    message_index = listing.message_index,
                    error = %e,
                    "Failed to hand off listing"
                );
                failures += 1;
            }
        }
        failures
    }

    /// Classify a single message outside of a run.
    pub async fn classify_one(&self, content: &str) -> MessageOutcome {
        self.orchestrator.process_one(content).await
    }

    /// Health of the external service.
    pub async fn classifier_health(&self) -> Result<HealthStatus, ClassifierError> {
        self.orchestrator.classifier().health_check().await
    }
}
