use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reserved token standing for "no scan" on generated and manual rows.
pub const MANUAL_MARK_TOKEN: &str = "MANUAL_MARK";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "token": "6f1c2b8e-4a7d-4f0e-9f5e-0c2d1b3a4e5f",
    "active": true,
    "created_at": "2025-03-03T12:00:00Z",
    "expires_at": "2025-03-04T12:00:00Z"
}))]
pub struct Credential {
    pub id: u64,
    pub token: String,
    pub active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expires| expires > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
