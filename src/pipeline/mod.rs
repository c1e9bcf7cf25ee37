//! Transcript ingestion pipeline.
//!
//! Every uploaded transcript flows through:
//! 1. `transcript::parse()` — ordered message records
//! 2. `SafetyLayer::scan()` — adversarial messages are decided locally
//! 3. `BatchOrchestrator::run()` — external classification with per-batch
//!    keyword fallback
//! 4. `normalizer::normalize()` — listing candidates and run statistics
//! 5. `ListingStore::save()` — hand-off of each listing
//!
//! **No message is dropped.** Each parsed message gets exactly one outcome,
//! in order, unless the run is cancelled.

pub mod normalizer;
pub mod orchestrator;
pub mod processor;
pub mod store;
pub mod types;
