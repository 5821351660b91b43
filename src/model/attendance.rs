use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::day_bounds::DayCalendar;

/// `marked_by` value of rows created by the sheet generator.
pub const SYSTEM_TAG: &str = "Sistema";
/// `marked_by` value of rows backed by a QR scan.
pub const SCAN_TAG: &str = "QR";
/// Leading text of the justification stamped on generated sheets.
pub const AUTO_SHEET_MARKER: &str = "Attendance sheet generated automatically";
pub const DEFAULT_MANUAL_JUSTIFICATION: &str = "Manual mark by administrator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "employee_id": 7,
    "credential_id": 3,
    "entry_time": "2025-03-03T13:20:00Z",
    "exit_time": null,
    "activity": null,
    "is_manual": false,
    "marked_by": "QR",
    "justification": null,
    "is_late": true,
    "created_at": "2025-03-03T13:20:00Z"
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub credential_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub entry_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub exit_time: Option<DateTime<Utc>>,
    pub activity: Option<String>,
    pub is_manual: bool,
    pub marked_by: Option<String>,
    pub justification: Option<String>,
    pub is_late: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Who produced a row, decoded from `marked_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    System,
    ScanVerified,
    ManualBy(String),
}

impl Origin {
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case(SYSTEM_TAG) {
            Origin::System
        } else if tag == SCAN_TAG {
            Origin::ScanVerified
        } else {
            Origin::ManualBy(tag.to_string())
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Origin::System => SYSTEM_TAG,
            Origin::ScanVerified => SCAN_TAG,
            Origin::ManualBy(actor) => actor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceState {
    Placeholder,
    ScanRecorded {
        entry: DateTime<Utc>,
        exit: Option<DateTime<Utc>>,
    },
    ManualOverride {
        entry: Option<DateTime<Utc>>,
        exit: Option<DateTime<Utc>>,
        reason: Option<String>,
    },
    Justified {
        reason: String,
    },
}

/// True for text a person wrote, false for the stamps the system leaves behind.
pub fn is_valid_justification(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && !text.contains(AUTO_SHEET_MARKER) && text != DEFAULT_MANUAL_JUSTIFICATION
}

impl AttendanceRecord {
    /// Unsaved row; the repository assigns the id.
    pub fn draft(employee_id: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            employee_id,
            credential_id: None,
            entry_time: None,
            exit_time: None,
            activity: None,
            is_manual: false,
            marked_by: None,
            justification: None,
            is_late: false,
            created_at,
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        self.marked_by.as_deref().map(Origin::from_tag)
    }

    pub fn set_origin(&mut self, origin: Origin) {
        self.marked_by = Some(origin.tag().to_string());
    }

    pub fn is_system(&self) -> bool {
        matches!(self.origin(), Some(Origin::System))
    }

    pub fn is_scan(&self) -> bool {
        matches!(self.origin(), Some(Origin::ScanVerified))
    }

    pub fn has_valid_justification(&self) -> bool {
        self.justification
            .as_deref()
            .is_some_and(is_valid_justification)
    }

    /// System row whose entry sits in the first seconds of its local day.
    pub fn is_placeholder(&self, calendar: &DayCalendar) -> bool {
        self.is_system()
            && self
                .entry_time
                .is_some_and(|entry| calendar.is_day_start(entry))
    }

    pub fn has_real_entry(&self, calendar: &DayCalendar) -> bool {
        self.entry_time.is_some_and(|t| !calendar.is_midnight(t))
    }

    pub fn has_real_exit(&self, calendar: &DayCalendar) -> bool {
        self.exit_time.is_some_and(|t| !calendar.is_midnight(t))
    }

    pub fn has_real_time(&self, calendar: &DayCalendar) -> bool {
        self.has_real_entry(calendar) || self.has_real_exit(calendar)
    }

    pub fn has_real_entry_on(&self, day: NaiveDate, calendar: &DayCalendar) -> bool {
        self.entry_time
            .is_some_and(|t| calendar.day_of(t) == day && !calendar.is_midnight(t))
    }

    pub fn has_real_exit_on(&self, day: NaiveDate, calendar: &DayCalendar) -> bool {
        self.exit_time
            .is_some_and(|t| calendar.day_of(t) == day && !calendar.is_midnight(t))
    }

    /// A scan-backed row with an observed clock time on `day`.
    pub fn is_verified_scan_on(&self, day: NaiveDate, calendar: &DayCalendar) -> bool {
        self.is_scan() && (self.has_real_entry_on(day, calendar) || self.has_real_exit_on(day, calendar))
    }

    /// Entry, else exit, else creation time.
    pub fn anchor_instant(&self) -> DateTime<Utc> {
        self.entry_time.or(self.exit_time).unwrap_or(self.created_at)
    }

    pub fn state(&self, calendar: &DayCalendar) -> AttendanceState {
        let untimed = self.entry_time.is_none() && self.exit_time.is_none();
        if self.is_system() && (untimed || self.is_placeholder(calendar)) {
            return AttendanceState::Placeholder;
        }
        if let (true, Some(entry)) = (self.is_scan(), self.entry_time) {
            return AttendanceState::ScanRecorded {
                entry,
                exit: self.exit_time,
            };
        }
        if self.has_valid_justification() && !self.has_real_time(calendar) {
            return AttendanceState::Justified {
                reason: self.justification.clone().unwrap_or_default(),
            };
        }
        AttendanceState::ManualOverride {
            entry: self.entry_time,
            exit: self.exit_time,
            reason: self.justification.clone(),
        }
    }
}
