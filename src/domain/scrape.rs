use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Output representations the gateway can serve.
///
/// Both are always requested from the delegate and stored together; callers
/// pick the subset they want per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeFormat {
    Markdown,
    Html,
}

/// Caller-supplied scrape options as received on the wire.
///
/// Every field is optional; [`crate::application::cache_key`] substitutes
/// explicit defaults before fingerprinting so that omitted fields and
/// explicitly-defaulted fields produce the same cache key.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    pub only_main_content: Option<bool>,
    pub include_tags: Option<Vec<String>>,
    pub exclude_tags: Option<Vec<String>>,
    pub wait_for_selector: Option<String>,
}

/// Metadata captured alongside a scraped page.
#[derive(Debug, Clone)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_ms: u64,
    pub scraped_at: OffsetDateTime,
}

/// A complete cached scrape result.
///
/// Invariant: both representations are always populated together; a partial
/// entry is never stored.
#[derive(Debug, Clone)]
pub struct CacheEntryRecord {
    pub cache_key: String,
    pub url: String,
    pub markdown: String,
    pub html: String,
    pub metadata: PageMetadata,
    pub created_at: OffsetDateTime,
}
