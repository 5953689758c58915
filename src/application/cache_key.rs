//! Canonical cache-key derivation.
//!
//! A fingerprint is the raw URL concatenated with a truncated SHA-256 digest
//! of the normalized options, keeping keys human-traceable while remaining
//! sensitive to every option. Explicit defaults are substituted for omitted
//! fields before hashing, so `{}` and `{ onlyMainContent: true }` collide.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::scrape::ScrapeOptions;

const DIGEST_PREFIX_LEN: usize = 16;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalKey<'a> {
    url: &'a str,
    only_main_content: bool,
    include_tags: &'a [String],
    exclude_tags: &'a [String],
    wait_for_selector: Option<&'a str>,
}

/// Derive the cache fingerprint for a URL and its scrape options.
pub fn fingerprint(url: &str, options: &ScrapeOptions) -> String {
    let canonical = CanonicalKey {
        url,
        only_main_content: options.only_main_content.unwrap_or(true),
        include_tags: options.include_tags.as_deref().unwrap_or(&[]),
        exclude_tags: options.exclude_tags.as_deref().unwrap_or(&[]),
        wait_for_selector: options.wait_for_selector.as_deref(),
    };

    // Field order in `CanonicalKey` is fixed, so the encoding is stable.
    let encoded = serde_json::to_vec(&canonical).expect("canonical key serializes");
    let digest = hex::encode(Sha256::digest(&encoded));

    format!("{url}::{}", &digest[..DIGEST_PREFIX_LEN])
}
