//! Listing store hand-off.
//!
//! The pipeline does not own persistence. Normalized listings are handed to a
//! [`ListingStore`]; a failed hand-off is logged and counted, never fatal.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::pipeline::types::Listing;

/// Destination for normalized listings.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn save(&self, listing: &Listing) -> Result<(), StoreError>;
}

/// Keeps listings in memory, in save order, for callers that read them
/// back after a run.
#[derive(Default)]
pub struct MemoryListingStore {
    listings: Mutex<Vec<Listing>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far.
    pub async fn listings(&self) -> Vec<Listing> {
        self.listings.lock().await.clone()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn save(&self, listing: &Listing) -> Result<(), StoreError> {
        self.listings.lock().await.push(listing.clone());
        Ok(())
    }
}

/// Posts each listing as JSON to a remote endpoint.
pub struct HttpListingStore {
    client: reqwest::Client,
    url: String,
}

impl HttpListingStore {
    pub fn new(url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ListingStore for HttpListingStore {
    async fn save(&self, listing: &Listing) -> Result<(), StoreError> {
        let response = self
            .client
            .post(&self.url)
            .json(listing)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %self.url, message_index = listing.message_index, "Listing stored");
        Ok(())
    }
}
