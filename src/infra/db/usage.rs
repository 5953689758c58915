use async_trait::async_trait;

use crate::application::repos::{RepoError, UsageRepo};
use crate::domain::usage::UsageRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl UsageRepo for PostgresRepositories {
    async fn append(&self, record: UsageRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO usage_logs
                (id, api_key_id, url, duration_ms, status, cached, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.api_key_id)
        .bind(&record.url)
        .bind(record.duration_ms as i64)
        .bind(record.status.as_str())
        .bind(record.cached)
        .bind(&record.error)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
