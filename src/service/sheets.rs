use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use super::locator;
use crate::error::AppError;
use crate::model::{
    attendance::{AUTO_SHEET_MARKER, AttendanceRecord, Origin},
    credential::{Credential, MANUAL_MARK_TOKEN, NewCredential},
    employee::Employee,
};
use crate::store::{AttendanceRepository, CredentialStore, EmployeeDirectory, Stores};
use crate::utils::day_bounds::{Clock, DayCalendar, business_days, month_range};

pub const SHEET_BATCH: usize = 100;
const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SheetRun {
    pub created: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

pub fn sheet_justification(day: NaiveDate) -> String {
    format!(
        "{AUTO_SHEET_MARKER} for {}. Replaced when the employee scans in.",
        day.format("%d/%m/%Y")
    )
}

/// Pre-creates one placeholder per employee and weekday of a month.
pub struct SheetGenerator {
    attendances: Arc<dyn AttendanceRepository>,
    employees: Arc<dyn EmployeeDirectory>,
    credentials: Arc<dyn CredentialStore>,
    calendar: DayCalendar,
    clock: Arc<dyn Clock>,
}

impl SheetGenerator {
    pub fn new(stores: &Stores, calendar: DayCalendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            attendances: stores.attendances.clone(),
            employees: stores.employees.clone(),
            credentials: stores.credentials.clone(),
            calendar,
            clock,
        }
    }

    async fn manual_mark_credential(&self) -> Result<Credential, AppError> {
        if let Some(existing) = self.credentials.find_by_token(MANUAL_MARK_TOKEN).await? {
            return Ok(existing);
        }
        let created = self
            .credentials
            .create(&NewCredential {
                token: MANUAL_MARK_TOKEN.to_string(),
                created_at: self.clock.now(),
                expires_at: None,
            })
            .await?;
        tracing::info!(credential_id = created.id, "Reserved manual-mark credential created");
        Ok(created)
    }

    async fn targets(&self, employee_ids: Option<&[u64]>) -> Result<Vec<Employee>, AppError> {
        let employees = match employee_ids {
            Some(ids) if !ids.is_empty() => self.employees.find_many(ids).await?,
            _ => self.employees.list_all().await?,
        };
        if employees.is_empty() {
            return Err(AppError::not_found("No employees to generate sheets for"));
        }
        Ok(employees)
    }

    pub async fn create_monthly_sheets(
        &self,
        year: i32,
        month: u32,
        employee_ids: Option<&[u64]>,
    ) -> Result<SheetRun, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::invalid("Month must be between 1 and 12"));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(AppError::invalid(format!(
                "Year must be between {MIN_YEAR} and {MAX_YEAR}"
            )));
        }
        let (first, last) = month_range(year, month)
            .ok_or_else(|| AppError::invalid(format!("Invalid month {month} for year {year}")))?;
        let employees = self.targets(employee_ids).await?;
        let credential = self.manual_mark_credential().await?;
        let days = business_days(year, month);
        let now = self.clock.now();

        let mut run = SheetRun::default();
        let mut queued = Vec::new();
        for employee in &employees {
            let existing = self
                .attendances
                .list_touching(
                    self.calendar.start_of(first),
                    self.calendar.end_of(last),
                    Some(employee.id),
                )
                .await?;
            for day in &days {
                if existing
                    .iter()
                    .any(|r| locator::classify(r, *day, &self.calendar).is_some())
                {
                    run.skipped += 1;
                    continue;
                }
                let mut sheet = AttendanceRecord::draft(employee.id, now);
                sheet.entry_time = Some(self.calendar.start_of(*day));
                sheet.credential_id = Some(credential.id);
                sheet.is_manual = true;
                sheet.set_origin(Origin::System);
                sheet.justification = Some(sheet_justification(*day));
                queued.push(sheet);
            }
        }

        for batch in queued.chunks(SHEET_BATCH) {
            match self.attendances.insert_batch(batch).await {
                Ok(written) => run.created += written,
                Err(e) => {
                    tracing::warn!(error = %e, rows = batch.len(), "Sheet batch failed, retrying row by row");
                    for sheet in batch {
                        match self.attendances.insert(sheet).await {
                            Ok(_) => run.created += 1,
                            Err(e) => run.errors.push(format!(
                                "employee {} on {}: {e}",
                                sheet.employee_id,
                                self.calendar.day_of(sheet.anchor_instant())
                            )),
                        }
                    }
                }
            }
        }

        tracing::info!(year, month, created = run.created, skipped = run.skipped, errors = run.errors.len(), "Monthly sheets generated");
        Ok(run)
    }
}

#[cfg(test)]
mod sheet_generator_tests {
    use super::*;
    use crate::model::attendance::{AttendanceState, SCAN_TAG};
    use crate::test_support::{Harness, utc};
    use rstest::rstest;

    #[tokio::test]
    async fn it_should_fill_every_weekday_once() {
        let h = Harness::new();
        h.employee(1, None).await;
        h.employee(2, None).await;

        let first = h.sheets.create_monthly_sheets(2025, 6, None).await.unwrap();
        assert_eq!(first.created, 42);
        assert_eq!(first.skipped, 0);
        assert!(first.errors.is_empty());

        let second = h.sheets.create_monthly_sheets(2025, 6, None).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 42);

        let rows = h.all_records().await;
        assert!(rows.iter().all(|r| r.state(&h.calendar) == AttendanceState::Placeholder));
        assert!(rows.iter().all(|r| r.is_manual && r.exit_time.is_none()));
    }

    #[tokio::test]
    async fn it_should_skip_days_that_already_have_records() {
        let h = Harness::new();
        h.employee(1, None).await;
        let mut scan = AttendanceRecord::draft(1, utc(2025, 6, 2, 8, 0, 0));
        scan.entry_time = Some(utc(2025, 6, 2, 8, 0, 0));
        scan.marked_by = Some(SCAN_TAG.into());
        h.seed(scan).await;

        let run = h.sheets.create_monthly_sheets(2025, 6, Some(&[1])).await.unwrap();
        assert_eq!(run.created, 20);
        assert_eq!(run.skipped, 1);
    }

    #[tokio::test]
    async fn it_should_reuse_the_manual_mark_credential() {
        let h = Harness::new();
        h.employee(1, None).await;
        h.sheets.create_monthly_sheets(2025, 6, None).await.unwrap();
        h.sheets.create_monthly_sheets(2025, 7, None).await.unwrap();

        let credential_ids: std::collections::HashSet<_> = h
            .all_records()
            .await
            .iter()
            .map(|r| r.credential_id)
            .collect();
        assert_eq!(credential_ids.len(), 1);
        assert!(h.issuer.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_should_fall_back_to_single_inserts_when_a_batch_fails() {
        let h = Harness::new();
        h.employee(1, None).await;
        h.store.toggle_batch_rejection();
        let run = h.sheets.create_monthly_sheets(2025, 6, None).await.unwrap();
        assert_eq!(run.created, 21);
        assert!(run.errors.is_empty());
    }

    #[rstest]
    #[case(2025, 0)]
    #[case(2025, 13)]
    #[case(1999, 6)]
    #[case(2101, 6)]
    #[tokio::test]
    async fn it_should_reject_out_of_range_periods(#[case] year: i32, #[case] month: u32) {
        let h = Harness::new();
        h.employee(1, None).await;
        let result = h.sheets.create_monthly_sheets(year, month, None).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn it_should_report_an_empty_directory() {
        let h = Harness::new();
        let result = h.sheets.create_monthly_sheets(2025, 6, None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
