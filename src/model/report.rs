use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attendance::AttendanceRecord;

/// Per-day projection of one attendance row. Rebuildable from `attendances` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceReport {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date", example = "2025-03-03")]
    pub fecha: NaiveDate,
    pub year: i32,
    pub month: i32,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub entry_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub exit_time: Option<DateTime<Utc>>,
    pub activity: Option<String>,
    pub is_manual: bool,
    pub marked_by: Option<String>,
    pub justification: Option<String>,
    pub attendance_id: Option<u64>,
    pub is_late: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl AttendanceReport {
    pub fn derive(record: &AttendanceRecord, fecha: NaiveDate) -> Self {
        Self {
            id: 0,
            employee_id: record.employee_id,
            fecha,
            year: fecha.year(),
            month: fecha.month() as i32,
            entry_time: record.entry_time,
            exit_time: record.exit_time,
            activity: record.activity.clone(),
            is_manual: record.is_manual,
            marked_by: record.marked_by.clone(),
            justification: record.justification.clone(),
            attendance_id: Some(record.id),
            is_late: record.is_late,
            created_at: record.created_at,
        }
    }

    /// Copies the derived fields onto an existing row, keeping its id.
    pub fn refresh_from(&mut self, derived: &AttendanceReport) {
        let id = self.id;
        *self = derived.clone();
        self.id = id;
    }

    pub fn has_consistent_period(&self) -> bool {
        self.year == self.fecha.year() && self.month == self.fecha.month() as i32
    }

    pub fn stamp_period(&mut self) {
        self.year = self.fecha.year();
        self.month = self.fecha.month() as i32;
    }
}
