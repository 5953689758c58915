use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{ApiKeysRepo, CreateApiKeyParams, RepoError};
use crate::domain::api_keys::ApiKeyRecord;

const TOKEN_PREFIX: &str = "rdr";

#[derive(Debug, Error)]
pub enum ApiAuthError {
    #[error("missing api key")]
    Missing,
    #[error("invalid or inactive api key")]
    Invalid,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// The authenticated caller attached to a request after the auth middleware
/// has resolved the credential.
#[derive(Debug, Clone)]
pub struct ApiPrincipal {
    pub key_id: Uuid,
    pub name: String,
    /// Per-minute budget override; `None` uses the gateway default.
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ApiKeyIssued {
    pub record: ApiKeyRecord,
    pub token: String,
}

#[derive(Clone)]
pub struct ApiKeyService {
    repo: Arc<dyn ApiKeysRepo>,
}

impl ApiKeyService {
    pub fn new(repo: Arc<dyn ApiKeysRepo>) -> Self {
        Self { repo }
    }

    /// Resolve a credential to a principal, rejecting unknown and inactive
    /// keys alike. No side effects beyond the lookup.
    pub async fn authenticate(&self, key: &str) -> Result<ApiPrincipal, ApiAuthError> {
        if key.is_empty() {
            return Err(ApiAuthError::Missing);
        }

        let record = self
            .repo
            .find_active_by_key(key)
            .await?
            .ok_or(ApiAuthError::Invalid)?;

        Ok(ApiPrincipal {
            key_id: record.id,
            name: record.name,
            rate_limit: record.rate_limit,
        })
    }

    /// Provision a fresh credential. Used by the `seed-key` subcommand, not
    /// by the request pipeline.
    pub async fn issue(
        &self,
        name: String,
        rate_limit: Option<u32>,
    ) -> Result<ApiKeyIssued, ApiKeyError> {
        let token = Self::generate_token();
        let record = self
            .repo
            .create_key(CreateApiKeyParams {
                key: token.clone(),
                name,
                rate_limit,
            })
            .await?;

        Ok(ApiKeyIssued { record, token })
    }

    fn generate_token() -> String {
        format!(
            "{TOKEN_PREFIX}_{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        )
    }
}
