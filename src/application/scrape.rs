//! The cache-aside orchestrator.
//!
//! One request flows validate → fingerprint → cache lookup → (hit | delegate
//! call → cache write) → usage record → response. Cache reads degrade to a
//! live fetch on failure; cache writes and usage records are dispatched as
//! background tasks whose own failures are logged and swallowed, so they can
//! never turn a successful scrape into a failed response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::application::cache_key;
use crate::application::delegate::{DelegateError, DelegateRequest, ReaderDelegate};
use crate::application::repos::{CacheRepo, UsageRepo};
use crate::domain::scrape::{CacheEntryRecord, PageMetadata, ScrapeFormat, ScrapeOptions};
use crate::domain::usage::{UsageRecord, UsageStatus};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("{0}")]
    Validation(String),
    #[error("scrape timed out")]
    Timeout,
    #[error("failed to reach target URL: {0}")]
    Unreachable(String),
    #[error("scrape returned no data")]
    EmptyResult,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DelegateError> for ScrapeError {
    fn from(err: DelegateError) -> Self {
        match err {
            DelegateError::Timeout => ScrapeError::Timeout,
            DelegateError::Unreachable { message } => ScrapeError::Unreachable(message),
            DelegateError::Upstream { status } => {
                ScrapeError::Internal(format!("delegate returned status {status}"))
            }
            DelegateError::Decode { message } => ScrapeError::Internal(message),
        }
    }
}

/// One request as handed to the orchestrator, after JSON decoding but before
/// validation.
#[derive(Debug, Clone)]
pub struct ScrapeCommand {
    pub url: Option<String>,
    pub formats: Vec<ScrapeFormat>,
    pub options: ScrapeOptions,
    pub timeout_ms: Option<u64>,
}

/// A successful outcome with only the caller-requested formats populated.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub cached: bool,
    pub url: String,
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone)]
pub struct ScrapeServiceConfig {
    pub cache_ttl: Duration,
    pub default_timeout: Duration,
}

#[derive(Clone)]
pub struct ScrapeService {
    cache: Arc<dyn CacheRepo>,
    usage: Arc<dyn UsageRepo>,
    delegate: Arc<dyn ReaderDelegate>,
    config: ScrapeServiceConfig,
}

impl ScrapeService {
    pub fn new(
        cache: Arc<dyn CacheRepo>,
        usage: Arc<dyn UsageRepo>,
        delegate: Arc<dyn ReaderDelegate>,
        config: ScrapeServiceConfig,
    ) -> Self {
        Self {
            cache,
            usage,
            delegate,
            config,
        }
    }

    pub async fn execute(
        &self,
        principal: &ApiPrincipal,
        command: ScrapeCommand,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let start = Instant::now();

        let url = match validate_url(command.url.as_deref()) {
            Ok(url) => url,
            Err(err) => {
                self.record_usage(
                    principal,
                    command.url.clone().unwrap_or_default(),
                    start,
                    UsageStatus::Error,
                    false,
                    Some(err.to_string()),
                );
                return Err(err);
            }
        };

        let fingerprint = cache_key::fingerprint(&url, &command.options);

        // A failed cache read degrades to a live fetch, never to an error.
        let hit = match self.cache.lookup(&fingerprint, self.config.cache_ttl).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    target = "lettura::scrape",
                    error = %err,
                    cache_key = %fingerprint,
                    "cache lookup failed; treating as miss"
                );
                None
            }
        };

        if let Some(entry) = hit {
            counter!("lettura_cache_hit_total").increment(1);
            let duration_ms = elapsed_ms(start);
            self.record_usage(principal, url.clone(), start, UsageStatus::Success, true, None);
            return Ok(filter_formats(
                &command.formats,
                entry.markdown,
                entry.html,
                ScrapeOutcomeMeta {
                    cached: true,
                    url,
                    title: entry.metadata.title,
                    description: entry.metadata.description,
                    duration_ms,
                    scraped_at: entry.metadata.scraped_at,
                },
            ));
        }

        counter!("lettura_cache_miss_total").increment(1);

        // Always fetch both representations so the stored entry is complete
        // and a later request for the other format needs no second call.
        let request = DelegateRequest {
            url: url.clone(),
            only_main_content: command.options.only_main_content.unwrap_or(true),
            include_tags: command.options.include_tags.clone().unwrap_or_default(),
            exclude_tags: command.options.exclude_tags.clone().unwrap_or_default(),
            wait_for_selector: command.options.wait_for_selector.clone(),
            timeout: command
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.default_timeout),
        };

        let pages = match self.delegate.scrape(request).await {
            Ok(pages) => pages,
            Err(err) => {
                let err = ScrapeError::from(err);
                counter!("lettura_scrape_error_total").increment(1);
                self.record_usage(
                    principal,
                    url,
                    start,
                    UsageStatus::Error,
                    false,
                    Some(err.to_string()),
                );
                return Err(err);
            }
        };

        let Some(page) = pages.into_iter().next() else {
            let err = ScrapeError::EmptyResult;
            counter!("lettura_scrape_error_total").increment(1);
            self.record_usage(
                principal,
                url,
                start,
                UsageStatus::Error,
                false,
                Some(err.to_string()),
            );
            return Err(err);
        };

        let duration_ms = elapsed_ms(start);
        let scraped_at = OffsetDateTime::now_utc();
        histogram!("lettura_scrape_duration_ms").record(duration_ms as f64);

        let entry = CacheEntryRecord {
            cache_key: fingerprint,
            url: url.clone(),
            markdown: page.markdown.unwrap_or_default(),
            html: page.html.unwrap_or_default(),
            metadata: PageMetadata {
                title: page.title,
                description: page.description,
                duration_ms,
                scraped_at,
            },
            created_at: scraped_at,
        };

        self.store_entry(entry.clone());
        self.record_usage(principal, url.clone(), start, UsageStatus::Success, false, None);

        Ok(filter_formats(
            &command.formats,
            entry.markdown,
            entry.html,
            ScrapeOutcomeMeta {
                cached: false,
                url,
                title: entry.metadata.title,
                description: entry.metadata.description,
                duration_ms,
                scraped_at,
            },
        ))
    }

    /// Fire-and-forget cache write. A failure is logged, never surfaced.
    fn store_entry(&self, entry: CacheEntryRecord) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let cache_key = entry.cache_key.clone();
            if let Err(err) = cache.upsert(entry).await {
                warn!(
                    target = "lettura::scrape",
                    error = %err,
                    cache_key = %cache_key,
                    "cache write failed"
                );
            }
        });
    }

    /// Fire-and-forget usage record. Its failure must never fail the request.
    fn record_usage(
        &self,
        principal: &ApiPrincipal,
        url: String,
        start: Instant,
        status: UsageStatus,
        cached: bool,
        error: Option<String>,
    ) {
        let record = UsageRecord {
            id: Uuid::new_v4(),
            api_key_id: principal.key_id,
            url,
            duration_ms: elapsed_ms(start),
            status,
            cached,
            error,
            created_at: OffsetDateTime::now_utc(),
        };
        let usage = self.usage.clone();
        tokio::spawn(async move {
            if let Err(err) = usage.append(record).await {
                warn!(target = "lettura::scrape", error = %err, "failed to record usage");
            }
        });
    }
}

struct ScrapeOutcomeMeta {
    cached: bool,
    url: String,
    title: Option<String>,
    description: Option<String>,
    duration_ms: u64,
    scraped_at: OffsetDateTime,
}

fn filter_formats(
    formats: &[ScrapeFormat],
    markdown: String,
    html: String,
    meta: ScrapeOutcomeMeta,
) -> ScrapeOutcome {
    ScrapeOutcome {
        cached: meta.cached,
        url: meta.url,
        markdown: formats.contains(&ScrapeFormat::Markdown).then_some(markdown),
        html: formats.contains(&ScrapeFormat::Html).then_some(html),
        metadata: PageMetadata {
            title: meta.title,
            description: meta.description,
            duration_ms: meta.duration_ms,
            scraped_at: meta.scraped_at,
        },
    }
}

fn validate_url(raw: Option<&str>) -> Result<String, ScrapeError> {
    let raw = raw
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ScrapeError::Validation("url is required".to_string()))?;

    let parsed = Url::parse(raw)
        .map_err(|_| ScrapeError::Validation(format!("Invalid url: {raw}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScrapeError::Validation(format!(
            "Invalid url scheme: {}",
            parsed.scheme()
        )));
    }

    Ok(raw.to_string())
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::delegate::DelegateDocument;
    use crate::application::repos::RepoError;

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<String, CacheEntryRecord>>,
        fail_lookup: AtomicBool,
    }

    #[async_trait]
    impl CacheRepo for MemoryCache {
        async fn lookup(
            &self,
            cache_key: &str,
            ttl: Duration,
        ) -> Result<Option<CacheEntryRecord>, RepoError> {
            if self.fail_lookup.load(Ordering::SeqCst) {
                return Err(RepoError::Persistence("store unavailable".into()));
            }
            let cutoff = OffsetDateTime::now_utc() - ttl;
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(cache_key)
                .filter(|entry| entry.created_at > cutoff)
                .cloned())
        }

        async fn upsert(&self, entry: CacheEntryRecord) -> Result<(), RepoError> {
            self.entries
                .lock()
                .unwrap()
                .insert(entry.cache_key.clone(), entry);
            Ok(())
        }

        async fn purge_expired(&self, _ttl: Duration) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct MemoryUsage {
        records: Mutex<Vec<UsageRecord>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl UsageRepo for MemoryUsage {
        async fn append(&self, record: UsageRecord) -> Result<(), RepoError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepoError::Persistence("ledger down".into()));
            }
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    enum DelegateMode {
        Page,
        Empty,
        Timeout,
    }

    struct StubDelegate {
        mode: DelegateMode,
        calls: AtomicUsize,
        last_request: Mutex<Option<DelegateRequest>>,
    }

    impl StubDelegate {
        fn new(mode: DelegateMode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ReaderDelegate for StubDelegate {
        async fn scrape(
            &self,
            request: DelegateRequest,
        ) -> Result<Vec<DelegateDocument>, DelegateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            match self.mode {
                DelegateMode::Page => Ok(vec![DelegateDocument {
                    markdown: Some("# Title".into()),
                    html: Some("<h1>Title</h1>".into()),
                    title: Some("Title".into()),
                    description: None,
                }]),
                DelegateMode::Empty => Ok(Vec::new()),
                DelegateMode::Timeout => Err(DelegateError::Timeout),
            }
        }
    }

    struct Fixture {
        cache: Arc<MemoryCache>,
        usage: Arc<MemoryUsage>,
        delegate: Arc<StubDelegate>,
        service: ScrapeService,
    }

    fn fixture(mode: DelegateMode) -> Fixture {
        let cache = Arc::new(MemoryCache::default());
        let usage = Arc::new(MemoryUsage::default());
        let delegate = Arc::new(StubDelegate::new(mode));
        let service = ScrapeService::new(
            cache.clone(),
            usage.clone(),
            delegate.clone(),
            ScrapeServiceConfig {
                cache_ttl: Duration::from_secs(86_400),
                default_timeout: Duration::from_secs(30),
            },
        );
        Fixture {
            cache,
            usage,
            delegate,
            service,
        }
    }

    fn principal() -> ApiPrincipal {
        ApiPrincipal {
            key_id: Uuid::new_v4(),
            name: "test".into(),
            rate_limit: None,
        }
    }

    fn command(url: &str, formats: Vec<ScrapeFormat>) -> ScrapeCommand {
        ScrapeCommand {
            url: Some(url.to_string()),
            formats,
            options: ScrapeOptions::default(),
            timeout_ms: None,
        }
    }

    async fn settle() {
        // Let fire-and-forget tasks run.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn miss_fetches_both_formats_and_fills_the_cache() {
        let fx = fixture(DelegateMode::Page);
        let outcome = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect("scrape succeeds");

        assert!(!outcome.cached);
        assert_eq!(outcome.markdown.as_deref(), Some("# Title"));
        assert!(outcome.html.is_none());

        let request = fx.delegate.last_request.lock().unwrap().clone().unwrap();
        assert!(request.only_main_content);
        assert_eq!(request.timeout, Duration::from_secs(30));

        settle().await;
        let entries = fx.cache.entries.lock().unwrap();
        let entry = entries.values().next().expect("entry stored");
        assert_eq!(entry.markdown, "# Title");
        assert_eq!(entry.html, "<h1>Title</h1>");

        let records = fx.usage.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UsageStatus::Success);
        assert!(!records[0].cached);
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let fx = fixture(DelegateMode::Page);
        let first = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect("first scrape");
        assert!(!first.cached);
        settle().await;

        let second = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Html]),
            )
            .await
            .expect("second scrape");

        assert!(second.cached);
        assert_eq!(fx.delegate.calls.load(Ordering::SeqCst), 1);
        // Only the requested format is populated, even though both are cached.
        assert!(second.markdown.is_none());
        assert_eq!(second.html.as_deref(), Some("<h1>Title</h1>"));

        settle().await;
        let records = fx.usage.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.cached));
    }

    #[tokio::test]
    async fn entries_older_than_the_ttl_behave_as_a_miss() {
        let fx = fixture(DelegateMode::Page);
        let first = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect("first scrape");
        assert!(!first.cached);
        settle().await;

        // Age the stored entry past the configured retention window.
        {
            let mut entries = fx.cache.entries.lock().unwrap();
            for entry in entries.values_mut() {
                entry.created_at = OffsetDateTime::now_utc() - Duration::from_secs(2 * 86_400);
            }
        }

        let second = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect("second scrape");

        assert!(!second.cached);
        assert_eq!(fx.delegate.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_read_failure_degrades_to_a_live_fetch() {
        let fx = fixture(DelegateMode::Page);
        fx.cache.fail_lookup.store(true, Ordering::SeqCst);

        let outcome = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect("degrades to fetch");

        assert!(!outcome.cached);
        assert_eq!(fx.delegate.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_delegate_result_is_a_hard_failure() {
        let fx = fixture(DelegateMode::Empty);
        let err = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect_err("empty result fails");
        assert!(matches!(err, ScrapeError::EmptyResult));

        settle().await;
        let records = fx.usage.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UsageStatus::Error);
    }

    #[tokio::test]
    async fn delegate_timeout_is_surfaced_distinctly() {
        let fx = fixture(DelegateMode::Timeout);
        let err = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await
            .expect_err("timeout fails");
        assert!(matches!(err, ScrapeError::Timeout));
    }

    #[tokio::test]
    async fn missing_url_is_rejected_before_any_delegate_work() {
        let fx = fixture(DelegateMode::Page);
        let err = fx
            .service
            .execute(
                &principal(),
                ScrapeCommand {
                    url: None,
                    formats: vec![ScrapeFormat::Markdown],
                    options: ScrapeOptions::default(),
                    timeout_ms: None,
                },
            )
            .await
            .expect_err("validation fails");
        assert!(matches!(err, ScrapeError::Validation(_)));
        assert_eq!(fx.delegate.calls.load(Ordering::SeqCst), 0);

        settle().await;
        // Validation failures still land in the ledger.
        let records = fx.usage.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UsageStatus::Error);
    }

    #[tokio::test]
    async fn usage_ledger_failures_never_fail_the_request() {
        let fx = fixture(DelegateMode::Page);
        fx.usage.fail.store(true, Ordering::SeqCst);

        let outcome = fx
            .service
            .execute(
                &principal(),
                command("https://example.com", vec![ScrapeFormat::Markdown]),
            )
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn caller_timeout_override_reaches_the_delegate() {
        let fx = fixture(DelegateMode::Page);
        let mut cmd = command("https://example.com", vec![ScrapeFormat::Markdown]);
        cmd.timeout_ms = Some(5_000);
        fx.service
            .execute(&principal(), cmd)
            .await
            .expect("scrape succeeds");

        let request = fx.delegate.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.timeout, Duration::from_millis(5_000));
    }
}
