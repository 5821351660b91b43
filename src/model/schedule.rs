use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

pub const DEFAULT_ENTRY_TOLERANCE: i32 = 30;
pub const MAX_ENTRY_TOLERANCE: i32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ScheduleDefinition {
    pub id: u64,
    #[schema(value_type = String, example = "08:00:00")]
    pub entry_time: NaiveTime,
    #[schema(value_type = String, example = "17:00:00")]
    pub exit_time: NaiveTime,
    /// Minutes after `entry_time` that still count as on time.
    #[schema(example = 30)]
    pub entry_tolerance: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSchedule {
    #[schema(example = "08:00")]
    pub entry_time: String,
    #[schema(example = "17:00")]
    pub exit_time: String,
    #[schema(example = 30, nullable = true)]
    pub entry_tolerance: Option<i32>,
}

/// Validated schedule ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub entry_time: NaiveTime,
    pub exit_time: NaiveTime,
    pub entry_tolerance: i32,
}

/// Strict `HH:mm`, 24-hour clock.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, AppError> {
    let invalid = || AppError::invalid(format!("Invalid time '{value}', expected HH:mm"));
    let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

impl CreateSchedule {
    pub fn validate(&self) -> Result<NewSchedule, AppError> {
        let entry_time = parse_hhmm(self.entry_time.trim())?;
        let exit_time = parse_hhmm(self.exit_time.trim())?;
        if entry_time >= exit_time {
            return Err(AppError::invalid("Entry time must be earlier than exit time"));
        }
        let entry_tolerance = self.entry_tolerance.unwrap_or(DEFAULT_ENTRY_TOLERANCE);
        if !(0..=MAX_ENTRY_TOLERANCE).contains(&entry_tolerance) {
            return Err(AppError::invalid(format!(
                "Entry tolerance must be between 0 and {MAX_ENTRY_TOLERANCE} minutes"
            )));
        }
        Ok(NewSchedule {
            entry_time,
            exit_time,
            entry_tolerance,
        })
    }
}
