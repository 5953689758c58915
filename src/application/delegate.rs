//! The seam to the remote scraping engine.
//!
//! Failures are typed at the site where they occur rather than classified
//! after the fact from message text, so the HTTP layer can map timeouts,
//! unreachable engines, and malformed replies to distinct statuses.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("scrape delegate timed out")]
    Timeout,
    #[error("scrape delegate unreachable: {message}")]
    Unreachable { message: String },
    #[error("scrape delegate returned status {status}")]
    Upstream { status: u16 },
    #[error("scrape delegate response could not be decoded: {message}")]
    Decode { message: String },
}

/// One fully-resolved scrape request as sent to the engine.
///
/// The orchestrator always asks for both representations regardless of what
/// the caller requested, so a complete entry can be cached.
#[derive(Debug, Clone)]
pub struct DelegateRequest {
    pub url: String,
    pub only_main_content: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub wait_for_selector: Option<String>,
    pub timeout: Duration,
}

/// One per-URL result from the engine.
#[derive(Debug, Clone, Default)]
pub struct DelegateDocument {
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait ReaderDelegate: Send + Sync {
    /// Scrape a single URL. Exactly one document is expected for the one
    /// URL requested; an empty list is surfaced by the orchestrator as a
    /// hard failure rather than a miss.
    async fn scrape(&self, request: DelegateRequest) -> Result<Vec<DelegateDocument>, DelegateError>;
}
