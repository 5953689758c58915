//! Wire models for the scrape endpoint.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::application::scrape::{ScrapeCommand, ScrapeOutcome};
use crate::domain::scrape::{ScrapeFormat, ScrapeOptions};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequestBody {
    pub url: Option<String>,
    pub formats: Option<Vec<ScrapeFormat>>,
    pub only_main_content: Option<bool>,
    pub include_tags: Option<Vec<String>>,
    pub exclude_tags: Option<Vec<String>>,
    pub wait_for_selector: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl From<ScrapeRequestBody> for ScrapeCommand {
    fn from(body: ScrapeRequestBody) -> Self {
        let formats = match body.formats {
            Some(formats) if !formats.is_empty() => formats,
            _ => vec![ScrapeFormat::Markdown],
        };
        Self {
            url: body.url,
            formats,
            options: ScrapeOptions {
                only_main_content: body.only_main_content,
                include_tags: body.include_tags,
                exclude_tags: body.exclude_tags,
                wait_for_selector: body.wait_for_selector,
            },
            timeout_ms: body.timeout_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponseBody {
    pub success: bool,
    pub cached: bool,
    pub data: ScrapeResponseData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub metadata: ScrapeResponseMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponseMetadata {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub scraped_at: OffsetDateTime,
}

impl From<ScrapeOutcome> for ScrapeResponseBody {
    fn from(outcome: ScrapeOutcome) -> Self {
        Self {
            success: true,
            cached: outcome.cached,
            data: ScrapeResponseData {
                markdown: outcome.markdown,
                html: outcome.html,
                metadata: ScrapeResponseMetadata {
                    url: outcome.url,
                    title: outcome.metadata.title,
                    description: outcome.metadata.description,
                    duration: outcome.metadata.duration_ms,
                    scraped_at: outcome.metadata.scraped_at,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrequested_formats_are_omitted_from_the_wire() {
        let body = ScrapeResponseBody {
            success: true,
            cached: true,
            data: ScrapeResponseData {
                markdown: None,
                html: Some("<p>hi</p>".into()),
                metadata: ScrapeResponseMetadata {
                    url: "https://example.com".into(),
                    title: None,
                    description: None,
                    duration: 12,
                    scraped_at: OffsetDateTime::UNIX_EPOCH,
                },
            },
        };

        let encoded = serde_json::to_value(&body).expect("serializes");
        let data = encoded.get("data").expect("data present");
        assert!(data.get("markdown").is_none());
        assert!(data.get("html").is_some());
        // Metadata nulls stay visible for absent title/description.
        assert!(data["metadata"]["title"].is_null());
    }

    #[test]
    fn formats_default_to_markdown() {
        let body: ScrapeRequestBody =
            serde_json::from_value(serde_json::json!({ "url": "https://example.com" }))
                .expect("decodes");
        let command = ScrapeCommand::from(body);
        assert_eq!(command.formats, vec![ScrapeFormat::Markdown]);
    }
}
