use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ApiKeysRepo, CreateApiKeyParams, RepoError};
use crate::domain::api_keys::ApiKeyRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    key: String,
    name: String,
    active: bool,
    rate_limit: Option<i32>,
    created_at: OffsetDateTime,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            key: row.key,
            name: row.name,
            active: row.active,
            rate_limit: row.rate_limit.and_then(|v| u32::try_from(v).ok()),
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ApiKeysRepo for PostgresRepositories {
    async fn find_active_by_key(&self, key: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, key, name, active, rate_limit, created_at
            FROM api_keys
            WHERE key = $1 AND active
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ApiKeyRecord::from))
    }

    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            INSERT INTO api_keys (id, key, name, active, rate_limit, created_at)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            RETURNING id, key, name, active, rate_limit, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.key)
        .bind(&params.name)
        .bind(params.rate_limit.map(|v| v as i32))
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ApiKeyRecord::from(row))
    }
}
