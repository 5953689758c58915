use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    Success,
    Error,
}

impl UsageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageStatus::Success => "success",
            UsageStatus::Error => "error",
        }
    }
}

/// One ledger entry per request admitted into the orchestrator.
///
/// Written fire-and-forget after the outcome is known; immutable afterward
/// and never read back by the request pipeline.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub url: String,
    pub duration_ms: u64,
    pub status: UsageStatus,
    pub cached: bool,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
}
