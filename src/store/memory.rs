use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{
    AttendanceRepository, CredentialStore, EmployeeDirectory, JustificationStore,
    ReportRepository, ScheduleStore, StoreError,
};
use crate::model::{
    attendance::AttendanceRecord,
    credential::{Credential, MANUAL_MARK_TOKEN, NewCredential},
    employee::Employee,
    justification::{JustificationRequest, NewJustificationRequest, RequestStatus, Review},
    report::AttendanceReport,
    schedule::{NewSchedule, ScheduleDefinition},
};

#[derive(Default)]
struct Tables {
    attendances: BTreeMap<u64, AttendanceRecord>,
    reports: BTreeMap<u64, AttendanceReport>,
    employees: BTreeMap<u64, Employee>,
    credentials: BTreeMap<u64, Credential>,
    schedules: BTreeMap<u64, ScheduleDefinition>,
    justifications: BTreeMap<u64, JustificationRequest>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local backend. Serves local runs without a database and every unit test.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    reject_batches: AtomicBool,
}

fn within(t: Option<DateTime<Utc>>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    t.is_some_and(|t| t >= from && t <= to)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// Makes `insert_batch` fail while single-row inserts keep working.
    pub fn toggle_batch_rejection(&self) {
        self.reject_batches.fetch_xor(true, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("In-memory store offline".into()));
        }
        Ok(())
    }

    pub async fn put_employee(&self, employee: Employee) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(employee.id);
        tables.employees.insert(employee.id, employee);
    }

    fn check_employee(tables: &Tables, employee_id: u64) -> Result<(), StoreError> {
        if tables.employees.contains_key(&employee_id) {
            Ok(())
        } else {
            Err(StoreError::Backend(format!(
                "foreign key violation: employee {employee_id} does not exist"
            )))
        }
    }
}

#[async_trait]
impl AttendanceRepository for InMemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.attendances.get(&id).cloned())
    }

    async fn list_touching(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .attendances
            .values()
            .filter(|r| employee_id.is_none_or(|id| r.employee_id == id))
            .filter(|r| {
                within(r.entry_time, from, to)
                    || within(r.exit_time, from, to)
                    || within(Some(r.created_at), from, to)
            })
            .cloned()
            .collect())
    }

    async fn list_timed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<AttendanceRecord> = tables
            .attendances
            .values()
            .filter(|r| employee_id.is_none_or(|id| r.employee_id == id))
            .filter(|r| within(r.entry_time, from, to) || within(r.exit_time, from, to))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.entry_time, r.id));
        Ok(rows)
    }

    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.ensure_online()?;
        let mut rows: Vec<AttendanceRecord> =
            self.tables.read().await.attendances.values().cloned().collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.attendances.len() as u64)
    }

    async fn insert(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        Self::check_employee(&tables, record.employee_id)?;
        let mut saved = record.clone();
        saved.id = tables.next_id();
        tables.attendances.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn insert_batch(&self, records: &[AttendanceRecord]) -> Result<u64, StoreError> {
        self.ensure_online()?;
        if self.reject_batches.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("batch insert rejected".into()));
        }
        let mut tables = self.tables.write().await;
        for record in records {
            Self::check_employee(&tables, record.employee_id)?;
        }
        for record in records {
            let mut saved = record.clone();
            saved.id = tables.next_id();
            tables.attendances.insert(saved.id, saved);
        }
        Ok(records.len() as u64)
    }

    async fn update(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        match tables.attendances.get_mut(&record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(record.clone())
            }
            None => Err(StoreError::Backend(format!(
                "attendance {} does not exist",
                record.id
            ))),
        }
    }

    async fn delete_many(&self, ids: &[u64]) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        Ok(ids
            .iter()
            .filter(|id| tables.attendances.remove(id).is_some())
            .count() as u64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let before = tables.attendances.len();
        tables.attendances.retain(|_, r| {
            !(r.created_at < cutoff && r.entry_time.is_none_or(|entry| entry < cutoff))
        });
        Ok((before - tables.attendances.len()) as u64)
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn find_by_attendance(
        &self,
        attendance_id: u64,
    ) -> Result<Option<AttendanceReport>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .values()
            .find(|r| r.attendance_id == Some(attendance_id))
            .cloned())
    }

    async fn find_by_employee_day(
        &self,
        employee_id: u64,
        fecha: NaiveDate,
    ) -> Result<Option<AttendanceReport>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .values()
            .find(|r| r.employee_id == employee_id && r.fecha == fecha)
            .cloned())
    }

    async fn insert(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let mut saved = report.clone();
        saved.id = tables.next_id();
        tables.reports.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        match tables.reports.get_mut(&report.id) {
            Some(row) => {
                *row = report.clone();
                Ok(report.clone())
            }
            None => Err(StoreError::Backend(format!(
                "report {} does not exist",
                report.id
            ))),
        }
    }

    async fn list_all(&self) -> Result<Vec<AttendanceReport>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.reports.values().cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.reports.len() as u64)
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.employees.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.employees.get(id).cloned())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Employee>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.employees.values().cloned().collect())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_active_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        Ok(CredentialStore::find_by_token(self, token)
            .await?
            .filter(|c| c.active && c.token != MANUAL_MARK_TOKEN))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .credentials
            .values()
            .find(|c| c.token == token)
            .cloned())
    }

    async fn create(&self, credential: &NewCredential) -> Result<Credential, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        if tables.credentials.values().any(|c| c.token == credential.token) {
            return Err(StoreError::Backend(format!(
                "duplicate token '{}'",
                credential.token
            )));
        }
        let saved = Credential {
            id: tables.next_id(),
            token: credential.token.clone(),
            active: true,
            created_at: credential.created_at,
            expires_at: credential.expires_at,
        };
        tables.credentials.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn deactivate(&self, id: u64) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        Ok(match tables.credentials.get_mut(&id) {
            Some(credential) => {
                credential.active = false;
                true
            }
            None => false,
        })
    }

    async fn list(&self) -> Result<Vec<Credential>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Credential> = tables
            .credentials
            .values()
            .filter(|c| c.token != MANUAL_MARK_TOKEN)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<ScheduleDefinition>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.schedules.get(&id).cloned())
    }

    async fn create(&self, schedule: &NewSchedule) -> Result<ScheduleDefinition, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let saved = ScheduleDefinition {
            id: tables.next_id(),
            entry_time: schedule.entry_time,
            exit_time: schedule.exit_time,
            entry_tolerance: schedule.entry_tolerance,
        };
        tables.schedules.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl JustificationStore for InMemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<JustificationRequest>, StoreError> {
        self.ensure_online()?;
        Ok(self.tables.read().await.justifications.get(&id).cloned())
    }

    async fn create(
        &self,
        request: &NewJustificationRequest,
    ) -> Result<JustificationRequest, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        Self::check_employee(&tables, request.employee_id)?;
        let saved = JustificationRequest {
            id: tables.next_id(),
            employee_id: request.employee_id,
            absence_date: request.absence_date,
            reason: request.reason.to_string(),
            description: request.description.clone(),
            status: RequestStatus::Pending.to_string(),
            reviewed_by: None,
            rejection_reason: None,
            created_at: request.created_at,
            reviewed_at: None,
        };
        tables.justifications.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find_for_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<JustificationRequest> = tables
            .justifications
            .values()
            .filter(|j| j.employee_id == employee_id && j.absence_date == day)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<JustificationRequest> = tables
            .justifications
            .values()
            .filter(|j| j.employee_id == employee_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.absence_date
                .cmp(&a.absence_date)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<JustificationRequest> = tables
            .justifications
            .values()
            .filter(|j| j.status() == Some(status))
            .cloned()
            .collect();
        rows.sort_by_key(|j| (j.created_at, j.id));
        Ok(rows)
    }

    async fn list_all(&self) -> Result<Vec<JustificationRequest>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<JustificationRequest> = tables.justifications.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn review(&self, id: u64, review: &Review) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        Ok(match tables.justifications.get_mut(&id) {
            Some(request) if request.is_pending() => {
                request.status = review.status.to_string();
                request.reviewed_by = Some(review.reviewed_by.clone());
                request.rejection_reason = review.rejection_reason.clone();
                request.reviewed_at = Some(review.reviewed_at);
                true
            }
            _ => false,
        })
    }
}
