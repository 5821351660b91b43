use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

pub const MIN_REJECTION_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Why the employee was away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AbsenceReason {
    Illness,
    Emergency,
    Permit,
    Holiday,
    Other,
}

impl AbsenceReason {
    pub fn label(self) -> &'static str {
        match self {
            AbsenceReason::Illness => "Illness",
            AbsenceReason::Emergency => "Personal emergency",
            AbsenceReason::Permit => "Administrative permit",
            AbsenceReason::Holiday => "Holiday",
            AbsenceReason::Other => "Other",
        }
    }
}

/// An employee's request to have one day's absence justified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 5,
    "employee_id": 7,
    "absence_date": "2025-03-03",
    "reason": "illness",
    "description": "Fever, medical certificate attached",
    "status": "pending",
    "reviewed_by": null,
    "rejection_reason": null,
    "created_at": "2025-03-04T09:12:00Z",
    "reviewed_at": null
}))]
pub struct JustificationRequest {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub absence_date: NaiveDate,
    #[schema(value_type = String, example = "illness")]
    pub reason: String,
    pub description: String,
    #[schema(value_type = String, example = "pending")]
    pub status: String,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl JustificationRequest {
    pub fn status(&self) -> Option<RequestStatus> {
        self.status.parse().ok()
    }

    pub fn absence_reason(&self) -> AbsenceReason {
        self.reason.parse().unwrap_or(AbsenceReason::Other)
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Some(RequestStatus::Pending)
    }

    /// Text written onto the attendance row once approved.
    pub fn attendance_text(&self) -> String {
        format!("{}: {}", self.absence_reason().label(), self.description)
    }
}

#[derive(Debug, Clone)]
pub struct NewJustificationRequest {
    pub employee_id: u64,
    pub absence_date: NaiveDate,
    pub reason: AbsenceReason,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome written by an approval or a rejection.
#[derive(Debug, Clone)]
pub struct Review {
    pub status: RequestStatus,
    pub reviewed_by: String,
    pub rejection_reason: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}
