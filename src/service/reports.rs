use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::{
    attendance::{AttendanceRecord, is_valid_justification},
    report::AttendanceReport,
};
use crate::store::{AttendanceRepository, EmployeeDirectory, ReportRepository, StoreError, Stores};
use crate::utils::day_bounds::{Clock, DayCalendar, month_range};

pub const SYNC_CHUNK: usize = 100;
/// Window used by `get_by_employee` when no year is given.
const EMPLOYEE_HISTORY_YEARS: i32 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportStats {
    pub total_reports: usize,
    pub with_entry: usize,
    pub with_exit: usize,
    pub justified: usize,
    pub absences: usize,
    pub manual: usize,
    pub late: usize,
    pub reports: Vec<AttendanceReport>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SyncRun {
    pub synced: u64,
    pub errors: u64,
    pub skipped: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatus {
    pub total_attendances: u64,
    pub total_reports: u64,
    pub pending: i64,
    /// Reports over attendances, two decimals.
    pub percentage: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct FixRun {
    pub fixed: u64,
    pub errors: u64,
}

/// Local day a record is reported under.
///
/// Entry, else exit, else creation day. A manual justification pinned to
/// midnight and written within 24 hours of that midnight is filed under the
/// day it was written.
pub fn report_day(record: &AttendanceRecord, calendar: &DayCalendar) -> NaiveDate {
    let day = calendar.day_of(record.anchor_instant());
    let justified = record
        .justification
        .as_deref()
        .is_some_and(is_valid_justification);
    match record.entry_time {
        Some(entry) if justified && record.is_manual && calendar.is_midnight(entry) => {
            if (record.created_at - entry).num_milliseconds().abs() < Duration::hours(24).num_milliseconds() {
                calendar.day_of(record.created_at)
            } else {
                day
            }
        }
        _ => day,
    }
}

pub struct ReportMaterializer {
    attendances: Arc<dyn AttendanceRepository>,
    reports: Arc<dyn ReportRepository>,
    employees: Arc<dyn EmployeeDirectory>,
    calendar: DayCalendar,
    clock: Arc<dyn Clock>,
}

impl ReportMaterializer {
    pub fn new(stores: &Stores, calendar: DayCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            attendances: stores.attendances.clone(),
            reports: stores.reports.clone(),
            employees: stores.employees.clone(),
            calendar,
            clock,
        }
    }

    pub fn derive(&self, record: &AttendanceRecord) -> AttendanceReport {
        AttendanceReport::derive(record, report_day(record, &self.calendar))
    }

    /// Upserts the report of one record. Never fails; errors are logged.
    pub async fn save_report(&self, record: &AttendanceRecord) -> Option<AttendanceReport> {
        match self.upsert(self.derive(record)).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, attendance_id = record.id, employee_id = record.employee_id, "Report materialization failed");
                None
            }
        }
    }

    async fn upsert(&self, derived: AttendanceReport) -> Result<AttendanceReport, StoreError> {
        let existing = match derived.attendance_id {
            Some(attendance_id) => self.reports.find_by_attendance(attendance_id).await?,
            None => None,
        };
        let existing = match existing {
            Some(report) => Some(report),
            None => {
                self.reports
                    .find_by_employee_day(derived.employee_id, derived.fecha)
                    .await?
            }
        };
        match existing {
            Some(mut report) => {
                report.refresh_from(&derived);
                self.reports.update(&report).await
            }
            None => self.reports.insert(&derived).await,
        }
    }

    /// Derives reports for `[start, end]` straight from attendance rows.
    pub async fn compute_reports(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceReport>, AppError> {
        if start > end {
            return Err(AppError::invalid("Start date must not be after end date"));
        }
        let from = self.calendar.start_of(start - Duration::days(1));
        let to = self.calendar.end_of(end + Duration::days(1));
        let mut records = self.attendances.list_touching(from, to, employee_id).await?;
        records.sort_by_key(|r| (r.anchor_instant(), r.id));

        Ok(records
            .iter()
            .map(|record| self.derive(record))
            .filter(|report| report.fecha >= start && report.fecha <= end)
            .collect())
    }

    /// Best-effort repair of the stored projection. Rows that fail keep their derived form.
    pub async fn persist_reports(&self, derived: Vec<AttendanceReport>) -> Vec<AttendanceReport> {
        let mut persisted = Vec::with_capacity(derived.len());
        for report in derived {
            match self.upsert(report.clone()).await {
                Ok(saved) => persisted.push(saved),
                Err(e) => {
                    tracing::warn!(error = %e, attendance_id = ?report.attendance_id, "Report repair skipped");
                    persisted.push(report);
                }
            }
        }
        persisted
    }

    pub async fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceReport>, AppError> {
        let derived = self.compute_reports(start, end, employee_id).await?;
        Ok(self.persist_reports(derived).await)
    }

    pub async fn get_by_year_month(
        &self,
        year: i32,
        month: u32,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceReport>, AppError> {
        let (first, last) = month_range(year, month)
            .ok_or_else(|| AppError::invalid(format!("Invalid month {month} for year {year}")))?;
        self.get_by_date_range(first, last, employee_id).await
    }

    pub async fn get_by_year(
        &self,
        year: i32,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceReport>, AppError> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| AppError::invalid(format!("Invalid year {year}")))?;
        let last = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| AppError::invalid(format!("Invalid year {year}")))?;
        self.get_by_date_range(first, last, employee_id).await
    }

    /// Newest first.
    pub async fn get_by_employee(
        &self,
        employee_id: u64,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Vec<AttendanceReport>, AppError> {
        let mut reports = match (year, month) {
            (Some(year), Some(month)) => {
                self.get_by_year_month(year, month, Some(employee_id)).await?
            }
            (Some(year), None) => self.get_by_year(year, Some(employee_id)).await?,
            (None, Some(_)) => return Err(AppError::invalid("A month filter needs a year")),
            (None, None) => {
                let today = self.calendar.day_of(self.clock.now());
                let start = today
                    .with_year(today.year() - EMPLOYEE_HISTORY_YEARS)
                    .unwrap_or(today - Duration::days(365 * EMPLOYEE_HISTORY_YEARS as i64));
                self.get_by_date_range(start, today, Some(employee_id)).await?
            }
        };
        reports.sort_by(|a, b| b.fecha.cmp(&a.fecha).then(b.id.cmp(&a.id)));
        Ok(reports)
    }

    pub async fn get_stats_by_year_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<ReportStats, AppError> {
        let reports = self.get_by_year_month(year, month, None).await?;
        let calendar = self.calendar;
        let real = |r: &AttendanceReport| {
            r.entry_time.is_some_and(|t| !calendar.is_midnight(t))
                || r.exit_time.is_some_and(|t| !calendar.is_midnight(t))
        };
        let valid = |r: &AttendanceReport| {
            r.justification
                .as_deref()
                .is_some_and(is_valid_justification)
        };

        Ok(ReportStats {
            total_reports: reports.len(),
            with_entry: reports.iter().filter(|r| r.entry_time.is_some()).count(),
            with_exit: reports.iter().filter(|r| r.exit_time.is_some()).count(),
            justified: reports.iter().filter(|r| valid(r) && !real(r)).count(),
            absences: reports
                .iter()
                .filter(|r| r.entry_time.is_none() && r.exit_time.is_none() && !valid(r))
                .count(),
            manual: reports.iter().filter(|r| r.is_manual).count(),
            late: reports.iter().filter(|r| r.is_late).count(),
            reports,
        })
    }

    /// Rebuilds every report in creation order. Rows of unknown employees are skipped.
    pub async fn sync_all_attendances(&self) -> Result<SyncRun, AppError> {
        let records = self.attendances.list_all().await?;
        let known: HashSet<u64> = self
            .employees
            .list_all()
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();

        let mut run = SyncRun::default();
        for (index, chunk) in records.chunks(SYNC_CHUNK).enumerate() {
            for record in chunk {
                if !known.contains(&record.employee_id) {
                    run.skipped += 1;
                    continue;
                }
                match self.upsert(self.derive(record)).await {
                    Ok(_) => run.synced += 1,
                    Err(e) => {
                        run.errors += 1;
                        tracing::error!(error = %e, attendance_id = record.id, "Report sync failed");
                    }
                }
            }
            tracing::debug!(chunk = index + 1, synced = run.synced, "Report sync progress");
        }
        tracing::info!(synced = run.synced, errors = run.errors, skipped = run.skipped, "Report sync finished");
        Ok(run)
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus, AppError> {
        let total_attendances = self.attendances.count().await?;
        let total_reports = self.reports.count().await?;
        let percentage = if total_attendances == 0 {
            0.0
        } else {
            total_reports as f64 / total_attendances as f64 * 100.0
        };
        Ok(SyncStatus {
            total_attendances,
            total_reports,
            pending: total_attendances as i64 - total_reports as i64,
            percentage: format!("{percentage:.2}"),
        })
    }

    pub async fn fix_incorrect_months(&self) -> Result<FixRun, AppError> {
        let mut run = FixRun::default();
        for mut report in self.reports.list_all().await? {
            if report.has_consistent_period() {
                continue;
            }
            report.stamp_period();
            match self.reports.update(&report).await {
                Ok(_) => run.fixed += 1,
                Err(e) => {
                    run.errors += 1;
                    tracing::error!(error = %e, report_id = report.id, "Report period repair failed");
                }
            }
        }
        tracing::info!(fixed = run.fixed, errors = run.errors, "Report periods repaired");
        Ok(run)
    }
}
