//! Repository traits describing persistence adapters.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::api_keys::ApiKeyRecord;
use crate::domain::scrape::CacheEntryRecord;
use crate::domain::usage::UsageRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateApiKeyParams {
    pub key: String,
    pub name: String,
    pub rate_limit: Option<u32>,
}

#[async_trait]
pub trait ApiKeysRepo: Send + Sync {
    /// Resolve a credential to its record, ignoring inactive keys.
    async fn find_active_by_key(&self, key: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError>;
}

#[async_trait]
pub trait CacheRepo: Send + Sync {
    /// Look up a fingerprint, treating entries older than `ttl` as absent.
    async fn lookup(
        &self,
        cache_key: &str,
        ttl: Duration,
    ) -> Result<Option<CacheEntryRecord>, RepoError>;

    /// Insert or replace the entry for its fingerprint, resetting the
    /// expiry clock.
    async fn upsert(&self, entry: CacheEntryRecord) -> Result<(), RepoError>;

    /// Delete entries older than `ttl`. Returns the number of rows removed.
    async fn purge_expired(&self, ttl: Duration) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<(), RepoError>;
}
