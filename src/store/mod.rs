use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::{
    attendance::AttendanceRecord,
    credential::{Credential, NewCredential},
    employee::Employee,
    justification::{JustificationRequest, NewJustificationRequest, RequestStatus, Review},
    report::AttendanceReport,
    schedule::{NewSchedule, ScheduleDefinition},
};

pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Rows whose entry, exit or creation time falls inside `[from, to]`.
    async fn list_touching(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Rows whose entry or exit falls inside `[from, to]`, by entry ascending.
    async fn list_timed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Every row, oldest creation first.
    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn insert(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError>;

    /// All-or-nothing insert. Returns the number of rows written.
    async fn insert_batch(&self, records: &[AttendanceRecord]) -> Result<u64, StoreError>;

    async fn update(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError>;

    async fn delete_many(&self, ids: &[u64]) -> Result<u64, StoreError>;

    /// Deletes rows created before `cutoff` whose entry is absent or also before it.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn find_by_attendance(
        &self,
        attendance_id: u64,
    ) -> Result<Option<AttendanceReport>, StoreError>;

    async fn find_by_employee_day(
        &self,
        employee_id: u64,
        fecha: NaiveDate,
    ) -> Result<Option<AttendanceReport>, StoreError>;

    async fn insert(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError>;

    async fn update(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError>;

    async fn list_all(&self) -> Result<Vec<AttendanceReport>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<Employee>, StoreError>;
    async fn find_many(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError>;
    async fn list_all(&self) -> Result<Vec<Employee>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_active_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError>;
    async fn create(&self, credential: &NewCredential) -> Result<Credential, StoreError>;
    /// Returns false when no credential has that id.
    async fn deactivate(&self, id: u64) -> Result<bool, StoreError>;
    /// Newest first, without the reserved manual-mark token.
    async fn list(&self) -> Result<Vec<Credential>, StoreError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<ScheduleDefinition>, StoreError>;
    async fn create(&self, schedule: &NewSchedule) -> Result<ScheduleDefinition, StoreError>;
}

#[async_trait]
pub trait JustificationStore: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<JustificationRequest>, StoreError>;
    async fn create(
        &self,
        request: &NewJustificationRequest,
    ) -> Result<JustificationRequest, StoreError>;
    /// Requests of one employee and day, newest first.
    async fn find_for_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<JustificationRequest>, StoreError>;
    /// By absence date descending, then newest first.
    async fn list_by_employee(&self, employee_id: u64)
    -> Result<Vec<JustificationRequest>, StoreError>;
    /// Oldest first.
    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<JustificationRequest>, StoreError>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<JustificationRequest>, StoreError>;
    /// Applies `review` only while the request is still pending. Returns false otherwise.
    async fn review(&self, id: u64, review: &Review) -> Result<bool, StoreError>;
}

/// Every persistence collaborator, as shared trait objects.
#[derive(Clone)]
pub struct Stores {
    pub attendances: Arc<dyn AttendanceRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub employees: Arc<dyn EmployeeDirectory>,
    pub credentials: Arc<dyn CredentialStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub justifications: Arc<dyn JustificationStore>,
}

impl Stores {
    pub fn mysql(pool: sqlx::MySqlPool) -> Self {
        Self::from_backend(Arc::new(mysql::MySqlStore::new(pool)))
    }

    pub fn memory(store: Arc<memory::InMemoryStore>) -> Self {
        Self::from_backend(store)
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AttendanceRepository
            + ReportRepository
            + EmployeeDirectory
            + CredentialStore
            + ScheduleStore
            + JustificationStore
            + 'static,
    {
        Self {
            attendances: backend.clone(),
            reports: backend.clone(),
            employees: backend.clone(),
            credentials: backend.clone(),
            schedules: backend.clone(),
            justifications: backend,
        }
    }
}
