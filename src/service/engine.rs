use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::events::{Change, EventFanout};
use super::locator::{self, DayMatch};
use super::reports::ReportMaterializer;
use super::schedule::ScheduleResolver;
use crate::error::AppError;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceState, DEFAULT_MANUAL_JUSTIFICATION, Origin},
    credential::{Credential, MANUAL_MARK_TOKEN},
    employee::Employee,
};
use crate::store::{AttendanceRepository, CredentialStore, EmployeeDirectory, Stores};
use crate::utils::day_bounds::{Clock, DayCalendar, days_in_month, month_range};

pub const MIN_JUSTIFICATION_CHARS: usize = 10;
/// Days before today covered by `get_unjustified_days`.
const UNJUSTIFIED_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ManualDirection {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JustificationKind {
    Absence,
    Delay,
    EarlyExit,
}

impl JustificationKind {
    pub fn label(self) -> &'static str {
        match self {
            JustificationKind::Absence => "Absence",
            JustificationKind::Delay => "Delay",
            JustificationKind::EarlyExit => "Early exit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManualMark {
    pub employee_id: u64,
    pub direction: ManualDirection,
    pub at: DateTime<Utc>,
    pub justification: Option<String>,
    /// Display name of the administrator.
    pub marked_by: String,
    /// When given, must equal the employee's DNI.
    pub dni: Option<String>,
    pub activity: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Justification {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub kind: JustificationKind,
    pub text: String,
    pub marked_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UnjustifiedDay {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub has_attendance: bool,
    pub has_justification: bool,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct EmployeeMonthStats {
    pub employee_id: u64,
    pub name: String,
    pub total_days: u32,
    pub attendances: u32,
    pub absences: u32,
    pub late: u32,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct MonthlyStats {
    pub year: i32,
    pub month: u32,
    pub total_records: usize,
    pub total_employees: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub absences: u32,
    pub justified: usize,
    pub late: usize,
    pub per_employee: Vec<EmployeeMonthStats>,
}

/// Applies scans, manual marks and justifications to the day's authoritative record.
pub struct AttendanceEngine {
    attendances: Arc<dyn AttendanceRepository>,
    employees: Arc<dyn EmployeeDirectory>,
    credentials: Arc<dyn CredentialStore>,
    schedule: ScheduleResolver,
    reports: Arc<ReportMaterializer>,
    events: EventFanout,
    calendar: DayCalendar,
    clock: Arc<dyn Clock>,
}

impl AttendanceEngine {
    pub fn new(
        stores: &Stores,
        reports: Arc<ReportMaterializer>,
        events: EventFanout,
        calendar: DayCalendar,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendances: stores.attendances.clone(),
            employees: stores.employees.clone(),
            credentials: stores.credentials.clone(),
            schedule: ScheduleResolver::new(stores.schedules.clone(), calendar),
            reports,
            events,
            calendar,
            clock,
        }
    }

    async fn require_employee(&self, employee_id: u64) -> Result<Employee, AppError> {
        self.employees
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Employee {employee_id} not found")))
    }

    async fn require_credential(&self, token: &str) -> Result<Credential, AppError> {
        if token.trim() == MANUAL_MARK_TOKEN {
            return Err(AppError::invalid("The manual-mark code cannot be scanned"));
        }
        let now = self.clock.now();
        self.credentials
            .find_active_by_token(token)
            .await?
            .filter(|c| c.is_usable_at(now))
            .ok_or_else(|| AppError::invalid("QR code is invalid, inactive or expired"))
    }

    async fn day_records(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(locator::day_records(self.attendances.as_ref(), employee_id, day, &self.calendar).await?)
    }

    /// Writes the row, then materializes its report and signals. Only the write can fail.
    async fn persist(
        &self,
        record: AttendanceRecord,
        change: Change,
        employee: &Employee,
    ) -> Result<AttendanceRecord, AppError> {
        let saved = match change {
            Change::Updated => self.attendances.update(&record).await?,
            Change::Created | Change::CreatedManually | Change::Justified => {
                self.attendances.insert(&record).await?
            }
        };
        self.reports.save_report(&saved).await;
        self.events.announce(&saved, change, employee).await;
        Ok(saved)
    }

    pub async fn mark_entry(&self, employee_id: u64, token: &str) -> Result<AttendanceRecord, AppError> {
        let employee = self.require_employee(employee_id).await?;
        let credential = self.require_credential(token).await?;
        let now = self.clock.now();
        let is_late = self.schedule.is_late(&employee, now).await;
        let day = self.calendar.day_of(now);
        let records = self.day_records(employee_id, day).await?;

        let placeholder = locator::locate(&records, day, &self.calendar)
            .filter(|l| l.kind == DayMatch::Placeholder)
            .map(|l| l.record.clone());
        if let Some(mut sheet) = placeholder {
            sheet.entry_time = Some(now);
            sheet.credential_id = Some(credential.id);
            sheet.set_origin(Origin::ScanVerified);
            sheet.is_manual = false;
            sheet.justification = None;
            sheet.is_late = is_late;
            tracing::info!(employee_id, attendance_id = sheet.id, is_late, "Placeholder upgraded by scan");
            return self.persist(sheet, Change::Updated, &employee).await;
        }

        if records
            .iter()
            .any(|r| r.has_real_entry_on(day, &self.calendar))
        {
            tracing::warn!(employee_id, %day, "Duplicate entry scan rejected");
            return Err(AppError::DuplicateEntry);
        }

        let mut record = AttendanceRecord::draft(employee_id, now);
        record.entry_time = Some(now);
        record.credential_id = Some(credential.id);
        record.set_origin(Origin::ScanVerified);
        record.is_late = is_late;
        tracing::info!(employee_id, is_late, "Entry registered by scan");
        self.persist(record, Change::Created, &employee).await
    }

    pub async fn mark_exit(
        &self,
        employee_id: u64,
        token: &str,
        activity: Option<String>,
    ) -> Result<AttendanceRecord, AppError> {
        let employee = self.require_employee(employee_id).await?;
        let credential = self.require_credential(token).await?;
        let now = self.clock.now();
        let day = self.calendar.day_of(now);
        let records = self.day_records(employee_id, day).await?;

        let open: Vec<&AttendanceRecord> = records
            .iter()
            .filter(|r| r.entry_time.is_some_and(|t| self.calendar.day_of(t) == day))
            .filter(|r| r.exit_time.is_none_or(|t| self.calendar.is_midnight(t)))
            .collect();
        // midnight-anchored rows (sheets, justified absences) have no entry to close
        let candidate = open
            .iter()
            .filter(|r| r.has_real_entry_on(day, &self.calendar))
            .max_by_key(|r| (r.created_at, r.id));

        let mut record = match candidate {
            Some(record) => (*record).clone(),
            None if !open.is_empty() => return Err(AppError::EntryNotYetReal),
            None => return Err(AppError::NoEntryFound),
        };
        record.exit_time = Some(now);
        record.activity = activity;
        record.credential_id = Some(credential.id);
        if matches!(record.origin(), None | Some(Origin::System)) {
            record.set_origin(Origin::ScanVerified);
        }
        tracing::info!(employee_id, attendance_id = record.id, "Exit registered by scan");
        self.persist(record, Change::Updated, &employee).await
    }

    pub async fn mark_manual(&self, mark: ManualMark) -> Result<AttendanceRecord, AppError> {
        let employee = self.require_employee(mark.employee_id).await?;
        if let (Some(given), Some(expected)) = (mark.dni.as_deref(), employee.dni.as_deref()) {
            if given.trim() != expected {
                return Err(AppError::invalid("DNI does not match the employee"));
            }
        }
        let actor = mark.marked_by.trim();
        if actor.is_empty() {
            return Err(AppError::invalid("marked_by is required for manual marks"));
        }

        let cal = &self.calendar;
        let day = cal.day_of(mark.at);
        let records = self.day_records(mark.employee_id, day).await?;

        let justified_only = records
            .iter()
            .any(|r| matches!(r.state(cal), AttendanceState::Justified { .. }))
            && !records.iter().any(|r| r.is_verified_scan_on(day, cal));
        if justified_only {
            return Err(AppError::conflict(
                "The day already carries a justification; manual marks are not allowed",
            ));
        }

        let justification = mark
            .justification
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
            .unwrap_or(DEFAULT_MANUAL_JUSTIFICATION)
            .to_string();
        let origin = Origin::ManualBy(actor.to_string());

        match mark.direction {
            ManualDirection::Entry => {
                if records.iter().any(|r| r.is_scan() && r.has_real_entry_on(day, cal)) {
                    return Err(AppError::conflict("A QR entry already exists for this day"));
                }
                let is_late = self.schedule.is_late(&employee, mark.at).await;
                let located = locator::locate(&records, day, cal).map(|l| l.record.clone());
                let (mut record, change) = match located {
                    Some(record) => (record, Change::Updated),
                    None => (
                        AttendanceRecord::draft(mark.employee_id, self.clock.now()),
                        Change::CreatedManually,
                    ),
                };
                record.entry_time = Some(mark.at);
                record.is_late = is_late;
                record.credential_id = None;
                record.is_manual = true;
                record.set_origin(origin);
                record.justification = Some(justification);
                if mark.activity.is_some() {
                    record.activity = mark.activity;
                }
                tracing::info!(employee_id = mark.employee_id, actor, is_late, "Manual entry recorded");
                self.persist(record, change, &employee).await
            }
            ManualDirection::Exit => {
                if records.iter().any(|r| r.is_verified_scan_on(day, cal)) {
                    return Err(AppError::conflict("A QR attendance already exists for this day"));
                }
                if records
                    .iter()
                    .any(|r| !r.is_system() && r.has_real_exit_on(day, cal))
                {
                    return Err(AppError::conflict("An exit is already registered for this day"));
                }
                let open: Vec<AttendanceRecord> = records
                    .iter()
                    .filter(|r| r.entry_time.is_some_and(|t| cal.day_of(t) == day))
                    .filter(|r| r.exit_time.is_none_or(|t| cal.is_midnight(t)))
                    .cloned()
                    .collect();
                let located = locator::locate(&open, day, cal).map(|l| l.record.clone());

                let (mut record, change) = match located {
                    Some(record) => (record, Change::Updated),
                    None => {
                        let mut pair = AttendanceRecord::draft(mark.employee_id, self.clock.now());
                        pair.entry_time = Some(mark.at);
                        pair.is_late = self.schedule.is_late(&employee, mark.at).await;
                        (pair, Change::CreatedManually)
                    }
                };
                record.exit_time = Some(mark.at);
                if mark.activity.is_some() {
                    record.activity = mark.activity;
                }
                record.credential_id = None;
                if !record.is_scan() {
                    record.is_manual = true;
                    record.set_origin(origin);
                }
                record.justification = Some(justification);
                tracing::info!(employee_id = mark.employee_id, actor, "Manual exit recorded");
                self.persist(record, change, &employee).await
            }
        }
    }

    pub async fn justify_attendance(&self, request: Justification) -> Result<AttendanceRecord, AppError> {
        let employee = self.require_employee(request.employee_id).await?;
        let today = self.calendar.day_of(self.clock.now());
        if request.date > today {
            return Err(AppError::invalid("Future dates cannot be justified"));
        }
        let text = request.text.trim();
        if text.chars().count() < MIN_JUSTIFICATION_CHARS {
            return Err(AppError::invalid(format!(
                "Justification must have at least {MIN_JUSTIFICATION_CHARS} characters"
            )));
        }
        if self.has_qr_attendance(request.employee_id, request.date).await? {
            return Err(AppError::conflict(
                "The day has a QR attendance and cannot be justified",
            ));
        }

        let cal = &self.calendar;
        let (day_start, day_end) = cal.bounds(request.date);
        let records = self.day_records(request.employee_id, request.date).await?;
        let justifier = request
            .marked_by
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| employee.display_name());

        let (mut record, change) = match locator::locate(&records, request.date, cal) {
            Some(located) => {
                let mut record = located.record.clone();
                match request.kind {
                    JustificationKind::Absence => {
                        record.credential_id = None;
                        record.entry_time = Some(day_start);
                        record.exit_time = None;
                        record.activity = None;
                    }
                    JustificationKind::Delay => {
                        if record.entry_time.is_none_or(|t| cal.is_midnight(t)) {
                            record.entry_time = Some(day_start);
                        }
                    }
                    JustificationKind::EarlyExit => {
                        if record.exit_time.is_none_or(|t| cal.is_midnight(t)) {
                            record.exit_time = Some(day_end);
                        }
                    }
                }
                (record, Change::Updated)
            }
            None => {
                let mut record = AttendanceRecord::draft(request.employee_id, self.clock.now());
                record.entry_time = Some(day_start);
                if request.kind == JustificationKind::EarlyExit {
                    record.exit_time = Some(day_end);
                }
                (record, Change::Justified)
            }
        };
        record.justification = Some(format!("[{}] {}", request.kind.label(), text));
        record.is_manual = true;
        record.set_origin(Origin::ManualBy(justifier));
        tracing::info!(employee_id = request.employee_id, date = %request.date, kind = %request.kind, "Attendance justified");
        self.persist(record, change, &employee).await
    }

    /// A scan-backed row of `day` carries an observed entry or exit.
    pub async fn has_qr_attendance(&self, employee_id: u64, day: NaiveDate) -> Result<bool, AppError> {
        let records = self.day_records(employee_id, day).await?;
        Ok(records
            .iter()
            .any(|r| r.is_verified_scan_on(day, &self.calendar)))
    }

    /// Alias of `has_qr_attendance`.
    pub async fn has_real_attendance(&self, employee_id: u64, day: NaiveDate) -> Result<bool, AppError> {
        self.has_qr_attendance(employee_id, day).await
    }

    pub async fn get_unjustified_days(&self, employee_id: u64) -> Result<Vec<UnjustifiedDay>, AppError> {
        self.require_employee(employee_id).await?;
        let cal = &self.calendar;
        let today = cal.day_of(self.clock.now());
        let first = today - Duration::days(UNJUSTIFIED_WINDOW_DAYS);
        let records = self
            .attendances
            .list_touching(cal.start_of(first), cal.end_of(today), Some(employee_id))
            .await?;

        let mut attended = HashSet::new();
        let mut justified = HashSet::new();
        for record in &records {
            let Some(entry) = record.entry_time else {
                continue;
            };
            let day = cal.day_of(entry);
            if !record.is_system() || !cal.is_midnight(entry) {
                attended.insert(day);
            }
            if record.has_valid_justification() {
                justified.insert(day);
            }
        }

        Ok(first
            .iter_days()
            .take_while(|d| *d <= today)
            .filter(|d| !justified.contains(d))
            .map(|date| UnjustifiedDay {
                date,
                has_attendance: attended.contains(&date),
                has_justification: false,
            })
            .collect())
    }

    pub async fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        if start > end {
            return Err(AppError::invalid("Start date must not be after end date"));
        }
        Ok(self
            .attendances
            .list_timed_between(self.calendar.start_of(start), self.calendar.end_of(end), employee_id)
            .await?)
    }

    pub async fn get_by_month_year(&self, year: i32, month: u32) -> Result<Vec<AttendanceRecord>, AppError> {
        let (first, last) = month_range(year, month)
            .ok_or_else(|| AppError::invalid(format!("Invalid month {month} for year {year}")))?;
        self.get_by_date_range(first, last, None).await
    }

    pub async fn get_monthly_stats(&self, year: i32, month: u32) -> Result<MonthlyStats, AppError> {
        let records = self.get_by_month_year(year, month).await?;
        let employees = self.employees.list_all().await?;
        let total_days = days_in_month(year, month).unwrap_or(0);
        let cal = &self.calendar;

        let mut entry_days: HashMap<u64, HashSet<NaiveDate>> = HashMap::new();
        let mut per_employee: BTreeMap<u64, EmployeeMonthStats> = employees
            .iter()
            .map(|e| {
                (
                    e.id,
                    EmployeeMonthStats {
                        employee_id: e.id,
                        name: e.display_name(),
                        total_days,
                        ..Default::default()
                    },
                )
            })
            .collect();

        let mut stats = MonthlyStats {
            year,
            month,
            total_records: records.len(),
            total_employees: employees.len(),
            ..Default::default()
        };
        for record in &records {
            if record.has_valid_justification() {
                stats.justified += 1;
            }
            let Some(entry) = record.entry_time else {
                continue;
            };
            if record.exit_time.is_some() {
                stats.complete += 1;
            } else {
                stats.incomplete += 1;
            }
            if record.is_late {
                stats.late += 1;
            }
            entry_days
                .entry(record.employee_id)
                .or_default()
                .insert(cal.day_of(entry));
            if let Some(row) = per_employee.get_mut(&record.employee_id) {
                row.attendances += 1;
                if record.is_late {
                    row.late += 1;
                }
            }
        }

        for row in per_employee.values_mut() {
            let present = entry_days.get(&row.employee_id).map_or(0, |d| d.len() as u32);
            row.absences = total_days.saturating_sub(present);
            stats.absences += row.absences;
        }
        stats.per_employee = per_employee.into_values().collect();
        Ok(stats)
    }
}

#[cfg(test)]
mod attendance_engine_tests {
    use super::*;
    use crate::model::attendance::{SCAN_TAG, SYSTEM_TAG};
    use crate::service::events::{EVENT_CREATED, EVENT_UPDATED};
    use crate::test_support::{Harness, date, utc};
    use rstest::{fixture, rstest};

    const TOKEN: &str = "gate-a";

    #[fixture]
    async fn scheduled() -> Harness {
        let h = Harness::new();
        let schedule_id = h.schedule((8, 0), (17, 0), 15).await;
        h.employee(1, Some(schedule_id)).await;
        h.credential(TOKEN).await;
        h
    }

    fn manual(direction: ManualDirection, at: DateTime<Utc>) -> ManualMark {
        ManualMark {
            employee_id: 1,
            direction,
            at,
            justification: None,
            marked_by: "Ana Torres".into(),
            dni: None,
            activity: None,
        }
    }

    fn justification(day: NaiveDate, kind: JustificationKind, text: &str) -> Justification {
        Justification {
            employee_id: 1,
            date: day,
            kind,
            text: text.into(),
            marked_by: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_record_a_late_scan_and_its_exit(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.clock.set(utc(2025, 3, 3, 8, 20, 0));
        let entry = h.engine.mark_entry(1, TOKEN).await.unwrap();
        assert!(entry.is_late);
        assert_eq!(entry.marked_by.as_deref(), Some(SCAN_TAG));
        assert!(!entry.is_manual);

        h.clock.set(utc(2025, 3, 3, 17, 5, 0));
        let exit = h
            .engine
            .mark_exit(1, TOKEN, Some("Lab sessions".into()))
            .await
            .unwrap();
        assert_eq!(exit.id, entry.id);
        assert_eq!(exit.exit_time, Some(utc(2025, 3, 3, 17, 5, 0)));
        assert_eq!(exit.activity.as_deref(), Some("Lab sessions"));

        let stats = h.engine.get_monthly_stats(2025, 3).await.unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.complete, 1);
        assert!(stats.late >= 1);
        assert_eq!(stats.per_employee[0].attendances, 1);
        assert_eq!(stats.per_employee[0].absences, 30);

        let events = h.publisher.events();
        assert_eq!(events.iter().filter(|e| *e == EVENT_CREATED).count(), 1);
        assert_eq!(events.iter().filter(|e| *e == EVENT_UPDATED).count(), 1);
        assert_eq!(h.sink.titles().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_a_second_entry_scan(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.clock.set(utc(2025, 3, 3, 7, 55, 0));
        h.engine.mark_entry(1, TOKEN).await.unwrap();
        h.clock.set(utc(2025, 3, 3, 8, 40, 0));
        let second = h.engine.mark_entry(1, TOKEN).await;
        assert!(matches!(second, Err(AppError::DuplicateEntry)));
        assert_eq!(h.all_records().await.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_upgrade_a_generated_sheet_in_place(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();
        let before = h.all_records().await.len();

        h.clock.set(utc(2025, 3, 3, 7, 58, 0));
        let upgraded = h.engine.mark_entry(1, TOKEN).await.unwrap();
        assert_eq!(upgraded.marked_by.as_deref(), Some(SCAN_TAG));
        assert_eq!(upgraded.justification, None);
        assert!(!upgraded.is_manual);
        assert!(!upgraded.is_late);
        assert_eq!(h.all_records().await.len(), before);
        assert!(h.sink.titles().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_an_exit_before_a_real_entry(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let none = h.engine.mark_exit(1, TOKEN, None).await;
        assert!(matches!(none, Err(AppError::NoEntryFound)));

        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();
        let placeholder_only = h.engine.mark_exit(1, TOKEN, None).await;
        assert!(matches!(placeholder_only, Err(AppError::EntryNotYetReal)));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_validate_employee_and_credential(#[future] scheduled: Harness) {
        let h = scheduled.await;
        assert!(matches!(
            h.engine.mark_entry(99, TOKEN).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.engine.mark_entry(1, "unknown").await,
            Err(AppError::InvalidRequest(_))
        ));

        let issued = h.issuer.create(None, None).await.unwrap();
        h.clock.set(utc(2025, 3, 4, 7, 1, 0));
        assert!(matches!(
            h.engine.mark_entry(1, &issued.token).await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[rstest]
    #[case("too short", false)]
    #[case("ten chars!", true)]
    #[case("   padded   ", false)]
    #[tokio::test]
    async fn it_should_require_ten_characters(
        #[future] scheduled: Harness,
        #[case] text: &str,
        #[case] accepted: bool,
    ) {
        let h = scheduled.await;
        let result = h
            .engine
            .justify_attendance(justification(date(2025, 3, 3), JustificationKind::Delay, text))
            .await;
        assert_eq!(result.is_ok(), accepted);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_to_justify_a_scanned_day(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.clock.set(utc(2025, 3, 3, 8, 5, 0));
        h.engine.mark_entry(1, TOKEN).await.unwrap();
        let result = h
            .engine
            .justify_attendance(justification(
                date(2025, 3, 3),
                JustificationKind::Absence,
                "Medical appointment at the clinic",
            ))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(h.engine.has_qr_attendance(1, date(2025, 3, 3)).await.unwrap());
        assert!(h.engine.has_real_attendance(1, date(2025, 3, 3)).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_future_dates(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let result = h
            .engine
            .justify_attendance(justification(
                date(2025, 3, 4),
                JustificationKind::Absence,
                "Medical appointment at the clinic",
            ))
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn it_should_file_a_justified_absence_under_its_day() {
        let h = Harness::with_calendar(DayCalendar::utc(), utc(2025, 3, 12, 9, 0, 0));
        let employee = h.employee(1, None).await;

        let record = h
            .engine
            .justify_attendance(justification(
                date(2025, 3, 10),
                JustificationKind::Absence,
                "Medical appointment at the clinic",
            ))
            .await
            .unwrap();
        assert_eq!(record.entry_time, Some(utc(2025, 3, 10, 0, 0, 0)));
        assert_eq!(record.exit_time, None);
        assert_eq!(record.credential_id, None);
        assert!(record.is_manual);
        assert_eq!(record.marked_by, Some(employee.display_name()));
        assert!(matches!(
            record.state(&h.calendar),
            AttendanceState::Justified { .. }
        ));

        let reports = h
            .reports
            .get_by_date_range(date(2025, 3, 10), date(2025, 3, 10), Some(1))
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].entry_time, Some(utc(2025, 3, 10, 0, 0, 0)));
        assert!(reports[0].justification.as_deref().unwrap().contains("Medical appointment"));

        let open_days = h.engine.get_unjustified_days(1).await.unwrap();
        assert!(open_days.iter().all(|d| d.date != date(2025, 3, 10)));
        assert!(open_days.iter().any(|d| d.date == date(2025, 3, 11) && !d.has_attendance));
        assert_eq!(open_days.len(), 30);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_extend_an_existing_record_for_an_early_exit(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let mut manual_entry = AttendanceRecord::draft(1, utc(2025, 3, 3, 9, 0, 0));
        manual_entry.entry_time = Some(utc(2025, 3, 3, 9, 0, 0));
        manual_entry.marked_by = Some("Ana Torres".into());
        let manual_entry = h.seed(manual_entry).await;
        h.clock.set(utc(2025, 3, 3, 18, 0, 0));

        let justified = h
            .engine
            .justify_attendance(Justification {
                marked_by: Some("Head of HR".into()),
                ..justification(date(2025, 3, 3), JustificationKind::EarlyExit, "Left for a family emergency")
            })
            .await
            .unwrap();
        assert_eq!(justified.id, manual_entry.id);
        assert_eq!(justified.entry_time, Some(utc(2025, 3, 3, 9, 0, 0)));
        assert_eq!(justified.exit_time, Some(h.calendar.end_of(date(2025, 3, 3))));
        assert_eq!(justified.marked_by.as_deref(), Some("Head of HR"));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_create_a_manual_entry_and_exit_pair(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let record = h
            .engine
            .mark_manual(manual(ManualDirection::Exit, utc(2025, 3, 3, 16, 0, 0)))
            .await
            .unwrap();
        assert_eq!(record.entry_time, Some(utc(2025, 3, 3, 16, 0, 0)));
        assert_eq!(record.exit_time, Some(utc(2025, 3, 3, 16, 0, 0)));
        assert_eq!(record.justification.as_deref(), Some(DEFAULT_MANUAL_JUSTIFICATION));
        assert_eq!(record.marked_by.as_deref(), Some("Ana Torres"));
        assert!(record.is_manual);
        assert!(h.sink.titles().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_upgrade_a_placeholder_with_a_manual_entry(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();
        let mut mark = manual(ManualDirection::Entry, utc(2025, 3, 3, 8, 45, 0));
        mark.activity = Some("Tutoring".into());
        let record = h.engine.mark_manual(mark).await.unwrap();
        assert!(record.is_late);
        assert_eq!(record.credential_id, None);
        assert_eq!(record.activity.as_deref(), Some("Tutoring"));
        assert_ne!(record.marked_by.as_deref(), Some(SYSTEM_TAG));
        assert_eq!(
            h.all_records()
                .await
                .iter()
                .filter(|r| h.calendar.day_of(r.anchor_instant()) == date(2025, 3, 3))
                .count(),
            1
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_override_scanned_attendance(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.clock.set(utc(2025, 3, 3, 8, 0, 0));
        h.engine.mark_entry(1, TOKEN).await.unwrap();

        let entry = h
            .engine
            .mark_manual(manual(ManualDirection::Entry, utc(2025, 3, 3, 8, 30, 0)))
            .await;
        assert!(matches!(entry, Err(AppError::Conflict(_))));
        let exit = h
            .engine
            .mark_manual(manual(ManualDirection::Exit, utc(2025, 3, 3, 17, 0, 0)))
            .await;
        assert!(matches!(exit, Err(AppError::Conflict(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_mark_over_a_justified_day(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.engine
            .justify_attendance(justification(
                date(2025, 3, 3),
                JustificationKind::Absence,
                "Medical appointment at the clinic",
            ))
            .await
            .unwrap();
        let result = h
            .engine
            .mark_manual(manual(ManualDirection::Entry, utc(2025, 3, 3, 9, 0, 0)))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_check_the_dni_when_given(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let mut mark = manual(ManualDirection::Entry, utc(2025, 3, 3, 9, 0, 0));
        mark.dni = Some("00000000".into());
        assert!(matches!(
            h.engine.mark_manual(mark.clone()).await,
            Err(AppError::InvalidRequest(_))
        ));
        mark.dni = Some("45870001".into());
        assert!(h.engine.mark_manual(mark).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_list_records_of_a_month_by_entry(#[future] scheduled: Harness) {
        let h = scheduled.await;
        for (day, hour) in [(5, 9), (4, 8)] {
            h.clock.set(utc(2025, 3, day, hour, 0, 0));
            h.engine.mark_entry(1, TOKEN).await.unwrap();
        }
        h.clock.set(utc(2025, 4, 1, 8, 0, 0));
        h.engine.mark_entry(1, TOKEN).await.unwrap();

        let march = h.engine.get_by_month_year(2025, 3).await.unwrap();
        assert_eq!(march.len(), 2);
        assert!(march[0].entry_time < march[1].entry_time);
        assert!(matches!(
            h.engine.get_by_month_year(2025, 13).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.engine.get_by_date_range(date(2025, 3, 5), date(2025, 3, 1), None).await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_accept_the_manual_mark_code_as_a_scan(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();
        h.clock.set(utc(2025, 3, 3, 8, 0, 0));

        assert!(matches!(
            h.engine.mark_entry(1, MANUAL_MARK_TOKEN).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.engine.mark_exit(1, MANUAL_MARK_TOKEN, None).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(h.all_records().await.iter().all(|r| !r.is_scan()));
        assert!(!h.engine.has_qr_attendance(1, date(2025, 3, 3)).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_close_a_justified_absence_with_a_scan(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let absence = h
            .engine
            .justify_attendance(justification(
                date(2025, 3, 3),
                JustificationKind::Absence,
                "Medical leave for the whole day",
            ))
            .await
            .unwrap();

        h.clock.set(utc(2025, 3, 3, 17, 0, 0));
        let exit = h.engine.mark_exit(1, TOKEN, None).await;
        assert!(matches!(exit, Err(AppError::EntryNotYetReal)));

        let records = h.all_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, absence.id);
        assert_eq!(records[0].exit_time, None);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_close_a_manual_entry_with_a_manual_exit(#[future] scheduled: Harness) {
        let h = scheduled.await;
        let entry = h
            .engine
            .mark_manual(manual(ManualDirection::Entry, utc(2025, 3, 3, 9, 0, 0)))
            .await
            .unwrap();
        let exit = h
            .engine
            .mark_manual(manual(ManualDirection::Exit, utc(2025, 3, 3, 17, 0, 0)))
            .await
            .unwrap();

        assert_eq!(exit.id, entry.id);
        assert_eq!(exit.entry_time, Some(utc(2025, 3, 3, 9, 0, 0)));
        assert_eq!(exit.exit_time, Some(utc(2025, 3, 3, 17, 0, 0)));
        assert!(exit.is_manual);
        assert_eq!(h.all_records().await.len(), 1);
        assert_eq!(h.publisher.events().iter().filter(|e| *e == EVENT_UPDATED).count(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_stamp_a_manual_exit_onto_the_placeholder(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();
        let on_day = |records: Vec<AttendanceRecord>| -> Vec<AttendanceRecord> {
            records
                .into_iter()
                .filter(|r| h.calendar.day_of(r.anchor_instant()) == date(2025, 3, 3))
                .collect()
        };
        let placeholder = on_day(h.all_records().await).remove(0);
        assert!(placeholder.is_system());

        let record = h
            .engine
            .mark_manual(manual(ManualDirection::Exit, utc(2025, 3, 3, 16, 0, 0)))
            .await
            .unwrap();
        assert_eq!(record.id, placeholder.id);
        assert_eq!(record.exit_time, Some(utc(2025, 3, 3, 16, 0, 0)));
        assert_eq!(record.marked_by.as_deref(), Some("Ana Torres"));
        assert_eq!(record.origin(), Some(Origin::ManualBy("Ana Torres".into())));
        assert!(record.is_manual);
        assert_eq!(on_day(h.all_records().await).len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_one_record_per_day_across_every_channel(#[future] scheduled: Harness) {
        let h = scheduled.await;
        h.sheets.create_monthly_sheets(2025, 3, Some(&[1])).await.unwrap();

        h.clock.set(utc(2025, 3, 3, 8, 0, 0));
        h.engine.mark_entry(1, TOKEN).await.unwrap();
        h.clock.set(utc(2025, 3, 3, 17, 0, 0));
        h.engine.mark_exit(1, TOKEN, None).await.unwrap();

        h.clock.set(utc(2025, 3, 4, 18, 0, 0));
        h.engine
            .mark_manual(manual(ManualDirection::Entry, utc(2025, 3, 4, 9, 0, 0)))
            .await
            .unwrap();
        h.engine
            .mark_manual(manual(ManualDirection::Exit, utc(2025, 3, 4, 17, 0, 0)))
            .await
            .unwrap();

        h.clock.set(utc(2025, 3, 6, 8, 10, 0));
        h.engine
            .justify_attendance(justification(
                date(2025, 3, 5),
                JustificationKind::Absence,
                "Medical appointment at the clinic",
            ))
            .await
            .unwrap();
        h.engine.mark_entry(1, TOKEN).await.unwrap();
        let _ = h.engine.mark_entry(1, TOKEN).await;

        h.duplicates.remove_duplicates().await.unwrap();

        let mut per_day: HashMap<(u64, NaiveDate), usize> = HashMap::new();
        for record in h.all_records().await {
            *per_day
                .entry((record.employee_id, locator::day_key(&record, &h.calendar)))
                .or_default() += 1;
        }
        assert!(per_day.values().all(|count| *count == 1));
        assert!(per_day.contains_key(&(1, date(2025, 3, 5))));
    }
}
