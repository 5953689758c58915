use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CacheRepo, RepoError};
use crate::domain::scrape::{CacheEntryRecord, PageMetadata};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CacheRow {
    cache_key: String,
    url: String,
    markdown: String,
    html: String,
    title: Option<String>,
    description: Option<String>,
    duration_ms: i64,
    scraped_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<CacheRow> for CacheEntryRecord {
    fn from(row: CacheRow) -> Self {
        Self {
            cache_key: row.cache_key,
            url: row.url,
            markdown: row.markdown,
            html: row.html,
            metadata: PageMetadata {
                title: row.title,
                description: row.description,
                duration_ms: row.duration_ms.max(0) as u64,
                scraped_at: row.scraped_at,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CacheRepo for PostgresRepositories {
    async fn lookup(
        &self,
        cache_key: &str,
        ttl: Duration,
    ) -> Result<Option<CacheEntryRecord>, RepoError> {
        // TTL is enforced at read time; the sweeper reclaims rows later.
        let cutoff = OffsetDateTime::now_utc() - ttl;
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT cache_key, url, markdown, html, title, description,
                   duration_ms, scraped_at, created_at
            FROM cache_entries
            WHERE cache_key = $1 AND created_at > $2
            "#,
        )
        .bind(cache_key)
        .bind(cutoff)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CacheEntryRecord::from))
    }

    async fn upsert(&self, entry: CacheEntryRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries
                (cache_key, url, markdown, html, title, description,
                 duration_ms, scraped_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (cache_key) DO UPDATE SET
                url = EXCLUDED.url,
                markdown = EXCLUDED.markdown,
                html = EXCLUDED.html,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                duration_ms = EXCLUDED.duration_ms,
                scraped_at = EXCLUDED.scraped_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.url)
        .bind(&entry.markdown)
        .bind(&entry.html)
        .bind(&entry.metadata.title)
        .bind(&entry.metadata.description)
        .bind(entry.metadata.duration_ms as i64)
        .bind(entry.metadata.scraped_at)
        .bind(entry.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<u64, RepoError> {
        let cutoff = OffsetDateTime::now_utc() - ttl;
        let result = sqlx::query("DELETE FROM cache_entries WHERE created_at <= $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
