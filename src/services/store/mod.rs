//! Remote draft store: the only component that performs network I/O.
//!
//! [`RemoteStore`] is the seam between the engine and wherever drafts live.
//! [`HttpDraftStore`] talks to the draft API over HTTP; [`InMemoryDraftStore`]
//! keeps drafts in process and can inject latency, failures and concurrent
//! writers.

pub mod http;
pub mod memory;

pub use http::HttpDraftStore;
pub use memory::InMemoryDraftStore;

use crate::models::{RemoteDraft, SaveAck, SavePayload};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a remote store can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Draft {0} not found")]
    NotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Timeouts, connection failures and 5xx responses may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }
}

/// Load and save drafts against a remote copy.
///
/// `save_draft` must be idempotent: re-sending the same payload after a
/// failed attempt may not corrupt the stored draft.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the current server copy of a draft
    async fn load_draft(&self, id: &str) -> Result<RemoteDraft, StoreError>;

    /// Persist a full copy of a draft
    async fn save_draft(&self, payload: &SavePayload) -> Result<SaveAck, StoreError>;
}
