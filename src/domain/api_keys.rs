use time::OffsetDateTime;
use uuid::Uuid;

/// A caller identity as provisioned in the principal store.
///
/// Inactive keys are invisible to authentication; the request pipeline never
/// mutates a key record.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    /// Opaque credential presented in the `X-API-Key` header. Unique.
    pub key: String,
    pub name: String,
    pub active: bool,
    /// Per-minute request budget. `None` falls back to the configured
    /// gateway-wide default.
    pub rate_limit: Option<u32>,
    pub created_at: OffsetDateTime,
}
