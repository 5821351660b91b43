use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{MySql, MySqlPool, mysql::MySqlArguments, query::QueryAs};

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

const ATTENDANCE_COLUMNS: &str = "\
    id, employee_id, credential_id, entry_time, exit_time, activity, \
    is_manual, marked_by, justification, is_late, created_at";

const ATTENDANCE_INSERT: &str = "\
    INSERT INTO attendances (employee_id, credential_id, entry_time, exit_time, activity, \
    is_manual, marked_by, justification, is_late, created_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const REPORT_COLUMNS: &str = "\
    id, employee_id, fecha, year, month, entry_time, exit_time, activity, is_manual, \
    marked_by, justification, attendance_id, is_late, created_at";

const EMPLOYEE_COLUMNS: &str = "id, first_name, last_name, dni, schedule_id";

const CREDENTIAL_COLUMNS: &str = "id, token, active, created_at, expires_at";

const SCHEDULE_COLUMNS: &str = "id, entry_time, exit_time, entry_tolerance";

const JUSTIFICATION_COLUMNS: &str = "\
    id, employee_id, absence_date, reason, description, status, reviewed_by, \
    rejection_reason, created_at, reviewed_at";

/// MySQL-backed implementation of every store trait.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }
}

fn bind_attendance<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    record: &'q AttendanceRecord,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    query
        .bind(record.employee_id)
        .bind(record.credential_id)
        .bind(record.entry_time)
        .bind(record.exit_time)
        .bind(&record.activity)
        .bind(record.is_manual)
        .bind(&record.marked_by)
        .bind(&record.justification)
        .bind(record.is_late)
        .bind(record.created_at)
}

fn bind_employee_filter<'q, O>(
    query: QueryAs<'q, MySql, O, MySqlArguments>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    employee_id: Option<u64>,
    pairs: usize,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    let mut query = query;
    for _ in 0..pairs {
        query = query.bind(from).bind(to);
    }
    match employee_id {
        Some(id) => query.bind(id),
        None => query,
    }
}

#[async_trait]
impl AttendanceRepository for MySqlStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE id = ?");
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_touching(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let employee_clause = if employee_id.is_some() { " AND employee_id = ?" } else { "" };
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE ((entry_time BETWEEN ? AND ?) \
                OR (exit_time BETWEEN ? AND ?) \
                OR (created_at BETWEEN ? AND ?)){employee_clause} \
             ORDER BY created_at ASC, id ASC"
        );
        let query = sqlx::query_as::<_, AttendanceRecord>(&sql);
        Ok(bind_employee_filter(query, from, to, employee_id, 3)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_timed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let employee_clause = if employee_id.is_some() { " AND employee_id = ?" } else { "" };
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE ((entry_time BETWEEN ? AND ?) OR (exit_time BETWEEN ? AND ?)){employee_clause} \
             ORDER BY entry_time ASC, id ASC"
        );
        let query = sqlx::query_as::<_, AttendanceRecord>(&sql);
        Ok(bind_employee_filter(query, from, to, employee_id, 2)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances ORDER BY created_at ASC, id ASC"
        );
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances")
            .fetch_one(&self.pool)
            .await?;
        Ok(total as u64)
    }

    async fn insert(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        let result = bind_attendance(sqlx::query(ATTENDANCE_INSERT), record)
            .execute(&self.pool)
            .await?;
        let mut saved = record.clone();
        saved.id = result.last_insert_id();
        Ok(saved)
    }

    async fn insert_batch(&self, records: &[AttendanceRecord]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for record in records {
            written += bind_attendance(sqlx::query(ATTENDANCE_INSERT), record)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn update(&self, record: &AttendanceRecord) -> Result<AttendanceRecord, StoreError> {
        sqlx::query(
            "UPDATE attendances SET credential_id = ?, entry_time = ?, exit_time = ?, \
             activity = ?, is_manual = ?, marked_by = ?, justification = ?, is_late = ? \
             WHERE id = ?",
        )
        .bind(record.credential_id)
        .bind(record.entry_time)
        .bind(record.exit_time)
        .bind(&record.activity)
        .bind(record.is_manual)
        .bind(&record.marked_by)
        .bind(&record.justification)
        .bind(record.is_late)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(record.clone())
    }

    async fn delete_many(&self, ids: &[u64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM attendances WHERE id IN ({})",
            Self::placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM attendances \
             WHERE created_at < ? AND (entry_time IS NULL OR entry_time < ?)",
        )
        .bind(cutoff)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReportRepository for MySqlStore {
    async fn find_by_attendance(
        &self,
        attendance_id: u64,
    ) -> Result<Option<AttendanceReport>, StoreError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM attendance_reports WHERE attendance_id = ? LIMIT 1"
        );
        Ok(sqlx::query_as::<_, AttendanceReport>(&sql)
            .bind(attendance_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_employee_day(
        &self,
        employee_id: u64,
        fecha: NaiveDate,
    ) -> Result<Option<AttendanceReport>, StoreError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM attendance_reports \
             WHERE employee_id = ? AND fecha = ? ORDER BY id DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, AttendanceReport>(&sql)
            .bind(employee_id)
            .bind(fecha)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError> {
        let result = sqlx::query(
            "INSERT INTO attendance_reports (employee_id, fecha, year, month, entry_time, \
             exit_time, activity, is_manual, marked_by, justification, attendance_id, is_late, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.employee_id)
        .bind(report.fecha)
        .bind(report.year)
        .bind(report.month)
        .bind(report.entry_time)
        .bind(report.exit_time)
        .bind(&report.activity)
        .bind(report.is_manual)
        .bind(&report.marked_by)
        .bind(&report.justification)
        .bind(report.attendance_id)
        .bind(report.is_late)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;
        let mut saved = report.clone();
        saved.id = result.last_insert_id();
        Ok(saved)
    }

    async fn update(&self, report: &AttendanceReport) -> Result<AttendanceReport, StoreError> {
        sqlx::query(
            "UPDATE attendance_reports SET employee_id = ?, fecha = ?, year = ?, month = ?, \
             entry_time = ?, exit_time = ?, activity = ?, is_manual = ?, marked_by = ?, \
             justification = ?, attendance_id = ?, is_late = ?, created_at = ? WHERE id = ?",
        )
        .bind(report.employee_id)
        .bind(report.fecha)
        .bind(report.year)
        .bind(report.month)
        .bind(report.entry_time)
        .bind(report.exit_time)
        .bind(&report.activity)
        .bind(report.is_manual)
        .bind(&report.marked_by)
        .bind(&report.justification)
        .bind(report.attendance_id)
        .bind(report.is_late)
        .bind(report.created_at)
        .bind(report.id)
        .execute(&self.pool)
        .await?;
        Ok(report.clone())
    }

    async fn list_all(&self) -> Result<Vec<AttendanceReport>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM attendance_reports ORDER BY fecha ASC, id ASC");
        Ok(sqlx::query_as::<_, AttendanceReport>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(total as u64)
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?");
        Ok(sqlx::query_as::<_, Employee>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_many(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id IN ({}) ORDER BY id",
            Self::placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, Employee>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<Employee>, StoreError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY id");
        Ok(sqlx::query_as::<_, Employee>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl CredentialStore for MySqlStore {
    async fn find_active_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM qr_codes WHERE token = ? AND token <> ? AND active = TRUE"
        );
        Ok(sqlx::query_as::<_, Credential>(&sql)
            .bind(token)
            .bind(MANUAL_MARK_TOKEN)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM qr_codes WHERE token = ?");
        Ok(sqlx::query_as::<_, Credential>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, credential: &NewCredential) -> Result<Credential, StoreError> {
        let result = sqlx::query(
            "INSERT INTO qr_codes (token, active, created_at, expires_at) VALUES (?, TRUE, ?, ?)",
        )
        .bind(&credential.token)
        .bind(credential.created_at)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(Credential {
            id: result.last_insert_id(),
            token: credential.token.clone(),
            active: true,
            created_at: credential.created_at,
            expires_at: credential.expires_at,
        })
    }

    async fn deactivate(&self, id: u64) -> Result<bool, StoreError> {
        let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM qr_codes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }
        sqlx::query("UPDATE qr_codes SET active = FALSE WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<Credential>, StoreError> {
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM qr_codes WHERE token <> ? ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, Credential>(&sql)
            .bind(MANUAL_MARK_TOKEN)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ScheduleStore for MySqlStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<ScheduleDefinition>, StoreError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?");
        Ok(sqlx::query_as::<_, ScheduleDefinition>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, schedule: &NewSchedule) -> Result<ScheduleDefinition, StoreError> {
        let result = sqlx::query(
            "INSERT INTO schedules (entry_time, exit_time, entry_tolerance) VALUES (?, ?, ?)",
        )
        .bind(schedule.entry_time)
        .bind(schedule.exit_time)
        .bind(schedule.entry_tolerance)
        .execute(&self.pool)
        .await?;
        Ok(ScheduleDefinition {
            id: result.last_insert_id(),
            entry_time: schedule.entry_time,
            exit_time: schedule.exit_time,
            entry_tolerance: schedule.entry_tolerance,
        })
    }
}

#[async_trait]
impl JustificationStore for MySqlStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<JustificationRequest>, StoreError> {
        let sql = format!("SELECT {JUSTIFICATION_COLUMNS} FROM justifications WHERE id = ?");
        Ok(sqlx::query_as::<_, JustificationRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(
        &self,
        request: &NewJustificationRequest,
    ) -> Result<JustificationRequest, StoreError> {
        let status = RequestStatus::Pending.to_string();
        let reason = request.reason.to_string();
        let result = sqlx::query(
            "INSERT INTO justifications (employee_id, absence_date, reason, description, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(request.employee_id)
        .bind(request.absence_date)
        .bind(&reason)
        .bind(&request.description)
        .bind(&status)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;
        Ok(JustificationRequest {
            id: result.last_insert_id(),
            employee_id: request.employee_id,
            absence_date: request.absence_date,
            reason,
            description: request.description.clone(),
            status,
            reviewed_by: None,
            rejection_reason: None,
            created_at: request.created_at,
            reviewed_at: None,
        })
    }

    async fn find_for_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        let sql = format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justifications \
             WHERE employee_id = ? AND absence_date = ? ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, JustificationRequest>(&sql)
            .bind(employee_id)
            .bind(day)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_by_employee(
        &self,
        employee_id: u64,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        let sql = format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justifications \
             WHERE employee_id = ? ORDER BY absence_date DESC, created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, JustificationRequest>(&sql)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<JustificationRequest>, StoreError> {
        let sql = format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justifications \
             WHERE status = ? ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, JustificationRequest>(&sql)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<JustificationRequest>, StoreError> {
        let sql = format!(
            "SELECT {JUSTIFICATION_COLUMNS} FROM justifications ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, JustificationRequest>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn review(&self, id: u64, review: &Review) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE justifications \
             SET status = ?, reviewed_by = ?, rejection_reason = ?, reviewed_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(review.status.to_string())
        .bind(&review.reviewed_by)
        .bind(&review.rejection_reason)
        .bind(review.reviewed_at)
        .bind(id)
        .bind(RequestStatus::Pending.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
