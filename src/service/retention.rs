use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::store::{AttendanceRepository, Stores};
use crate::utils::day_bounds::{Clock, DayCalendar};

/// Local hour at which the monthly sweep runs, on the first day of the month.
const SWEEP_HOUR: u32 = 2;

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupRun {
    pub deleted: u64,
    pub message: String,
}

pub struct RetentionSweeper {
    attendances: Arc<dyn AttendanceRepository>,
    calendar: DayCalendar,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    pub fn new(stores: &Stores, calendar: DayCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            attendances: stores.attendances.clone(),
            calendar,
            clock,
        }
    }

    /// Local midnight of the same day one calendar month ago.
    pub fn cutoff(&self) -> DateTime<Utc> {
        let today = self.calendar.day_of(self.clock.now());
        let month_ago = today.checked_sub_months(Months::new(1)).unwrap_or(today);
        self.calendar.start_of(month_ago)
    }

    pub async fn cleanup_old_attendances(&self) -> Result<CleanupRun, AppError> {
        let cutoff = self.cutoff();
        let deleted = self.attendances.delete_created_before(cutoff).await?;
        let message = format!(
            "Deleted {deleted} attendance records older than {}",
            self.calendar.day_of(cutoff)
        );
        tracing::info!(deleted, %cutoff, "Attendance retention sweep");
        Ok(CleanupRun { deleted, message })
    }

    /// Next first-of-month 02:00 local strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let at = NaiveTime::from_hms_opt(SWEEP_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
        let today = self.calendar.day_of(now);
        let this_month = today.with_day(1).unwrap_or(today);
        let candidate = self.calendar.anchor(this_month, at);
        if candidate > now {
            return candidate;
        }
        let next_month = this_month
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        self.calendar.anchor(next_month, at)
    }

    async fn run_scheduled(&self) {
        match self.cleanup_old_attendances().await {
            Ok(run) => tracing::info!(deleted = run.deleted, "Scheduled retention sweep finished"),
            Err(e) => tracing::error!(error = %e, "Scheduled retention sweep failed"),
        }
    }

    /// Sleeps until each monthly slot and sweeps, until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.clock.now();
            let wait = (self.next_run_after(now) - now)
                .to_std()
                .unwrap_or_default();
            tracing::debug!(wait_secs = wait.as_secs(), "Retention sweeper sleeping");
            tokio::select! {
                _ = tokio::time::sleep(wait) => self.run_scheduled().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Retention sweeper stopped");
                        return;
                    }
                }
            }
        }
    }
}
