use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::locator::{day_key, precedence};
use crate::error::AppError;
use crate::model::attendance::AttendanceRecord;
use crate::store::{AttendanceRepository, Stores};
use crate::utils::day_bounds::DayCalendar;

pub const DELETE_BATCH: usize = 100;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CollapseRun {
    pub removed: u64,
    pub kept: u64,
    pub errors: Vec<String>,
}

/// Keeps one record per (employee, local day) and deletes the rest.
pub struct DuplicateCollapser {
    attendances: Arc<dyn AttendanceRepository>,
    calendar: DayCalendar,
}

impl DuplicateCollapser {
    pub fn new(stores: &Stores, calendar: DayCalendar) -> Self {
        Self {
            attendances: stores.attendances.clone(),
            calendar,
        }
    }

    /// Ids of every record that loses to another record of its (employee, day).
    pub fn losers(&self, records: &[AttendanceRecord]) -> (usize, Vec<u64>) {
        let mut winners: HashMap<_, &AttendanceRecord> = HashMap::new();
        let mut losers = Vec::new();
        for record in records {
            let key = (record.employee_id, day_key(record, &self.calendar));
            match winners.get(&key).copied() {
                None => {
                    winners.insert(key, record);
                }
                Some(current) => {
                    let rank = |r: &AttendanceRecord| (precedence(r, &self.calendar), r.id);
                    if rank(record) > rank(current) {
                        losers.push(current.id);
                        winners.insert(key, record);
                    } else {
                        losers.push(record.id);
                    }
                }
            }
        }
        (winners.len(), losers)
    }

    pub async fn remove_duplicates(&self) -> Result<CollapseRun, AppError> {
        let records = self.attendances.list_all().await?;
        let (kept, losers) = self.losers(&records);

        let mut run = CollapseRun {
            kept: kept as u64,
            ..Default::default()
        };
        for batch in losers.chunks(DELETE_BATCH) {
            match self.attendances.delete_many(batch).await {
                Ok(deleted) => run.removed += deleted,
                Err(e) => {
                    tracing::error!(error = %e, rows = batch.len(), "Duplicate batch delete failed");
                    run.errors.push(format!("batch of {} rows: {e}", batch.len()));
                }
            }
        }
        tracing::info!(removed = run.removed, kept = run.kept, "Duplicate collapse finished");
        Ok(run)
    }
}
