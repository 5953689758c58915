//! HTTP client for the remote reader engine.
//!
//! One `ReaderClient` is built at startup and shared for the life of the
//! process; reqwest pools connections internally. Failures are classified at
//! this boundary into typed [`DelegateError`] variants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::delegate::{
    DelegateDocument, DelegateError, DelegateRequest, ReaderDelegate,
};
use crate::config::ReaderSettings;
use crate::infra::error::InfraError;

pub struct ReaderClient {
    http: reqwest::Client,
    scrape_endpoint: String,
}

impl ReaderClient {
    pub fn new(settings: &ReaderSettings) -> Result<Self, InfraError> {
        let http = reqwest::Client::builder().build().map_err(|err| {
            InfraError::configuration(format!("failed to build reader client: {err}"))
        })?;
        let scrape_endpoint = format!("{}/scrape", settings.base_url.trim_end_matches('/'));

        info!(
            target = "lettura::reader",
            endpoint = %scrape_endpoint,
            "reader client initialized"
        );

        Ok(Self {
            http,
            scrape_endpoint,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReaderRequestBody {
    urls: Vec<String>,
    formats: Vec<&'static str>,
    only_main_content: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_selector: Option<String>,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ReaderResponseBody {
    #[serde(default)]
    data: Vec<ReaderPage>,
}

#[derive(Debug, Deserialize)]
struct ReaderPage {
    markdown: Option<String>,
    html: Option<String>,
    metadata: Option<ReaderPageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ReaderPageMetadata {
    title: Option<String>,
    description: Option<String>,
}

impl From<ReaderPage> for DelegateDocument {
    fn from(page: ReaderPage) -> Self {
        let (title, description) = page
            .metadata
            .map(|meta| (meta.title, meta.description))
            .unwrap_or((None, None));
        Self {
            markdown: page.markdown,
            html: page.html,
            title,
            description,
        }
    }
}

#[async_trait]
impl ReaderDelegate for ReaderClient {
    async fn scrape(
        &self,
        request: DelegateRequest,
    ) -> Result<Vec<DelegateDocument>, DelegateError> {
        let timeout = request.timeout;
        let body = ReaderRequestBody {
            urls: vec![request.url],
            formats: vec!["markdown", "html"],
            only_main_content: request.only_main_content,
            include_tags: request.include_tags,
            exclude_tags: request.exclude_tags,
            wait_for_selector: request.wait_for_selector,
            timeout_ms: timeout.as_millis() as u64,
        };

        let response = self
            .http
            .post(&self.scrape_endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DelegateError::Upstream {
                status: status.as_u16(),
            });
        }

        let parsed: ReaderResponseBody = response.json().await.map_err(|err| {
            if err.is_timeout() {
                DelegateError::Timeout
            } else {
                DelegateError::Decode {
                    message: err.to_string(),
                }
            }
        })?;

        Ok(parsed.data.into_iter().map(DelegateDocument::from).collect())
    }
}

fn classify_send_error(err: reqwest::Error) -> DelegateError {
    if err.is_timeout() {
        DelegateError::Timeout
    } else {
        DelegateError::Unreachable {
            message: err.to_string(),
        }
    }
}
