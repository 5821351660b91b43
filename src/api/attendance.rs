use crate::auth::auth::AuthUser;
use crate::service::{
    duplicates::DuplicateCollapser,
    engine::{AttendanceEngine, Justification, JustificationKind, ManualDirection, ManualMark},
    retention::RetentionSweeper,
    sheets::SheetGenerator,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ScanEntry {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = "6f1c2b8e-4a7d-4f0e-9f5e-0c2d1b3a4e5f")]
    pub qr_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ScanExit {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = "6f1c2b8e-4a7d-4f0e-9f5e-0c2d1b3a4e5f")]
    pub qr_token: String,
    #[schema(example = "Lab sessions", nullable = true)]
    pub activity: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ManualMarkRequest {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = "entry")]
    pub direction: ManualDirection,
    #[schema(example = "2025-03-03T13:05:00Z", value_type = String, format = "date-time")]
    pub at: DateTime<Utc>,
    #[schema(example = "Scanner at gate A was down", nullable = true)]
    pub justification: Option<String>,
    #[schema(example = "45879632", nullable = true)]
    pub dni: Option<String>,
    #[schema(nullable = true)]
    pub activity: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MonthlySheetsRequest {
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = 3)]
    pub month: u32,
    /// Every employee when omitted
    #[schema(example = json!([7, 8]), nullable = true)]
    pub employee_ids: Option<Vec<u64>>,
}

#[derive(Deserialize, ToSchema)]
pub struct JustifyRequest {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = "2025-03-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "absence")]
    pub kind: JustificationKind,
    #[schema(example = "Medical appointment at the clinic")]
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RangeRequest {
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub start: NaiveDate,
    #[schema(example = "2025-03-31", format = "date", value_type = String)]
    pub end: NaiveDate,
    #[schema(example = 7, nullable = true)]
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    #[default]
    Qr,
    Real,
}

#[derive(Deserialize, IntoParams)]
pub struct CheckQuery {
    /// `qr` (default) or `real`
    pub kind: Option<CheckKind>,
}

/// QR entry scan
#[utoipa::path(
    post,
    path = "/api/attendance/entry",
    request_body = ScanEntry,
    responses(
        (status = 200, description = "Entry registered", body = Object, example = json!({
            "message": "Entry registered",
            "data": {"id": 42, "employee_id": 7, "marked_by": "QR", "is_late": false}
        })),
        (status = 400, description = "Duplicate entry or invalid QR code", body = Object, example = json!({
            "message": "Entry already registered for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_entry(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ScanEntry>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_manager(payload.employee_id)?;
    let record = engine.mark_entry(payload.employee_id, &payload.qr_token).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Entry registered",
        "data": record
    })))
}

/// QR exit scan
#[utoipa::path(
    post,
    path = "/api/attendance/exit",
    request_body = ScanExit,
    responses(
        (status = 200, description = "Exit registered", body = Object),
        (status = 400, description = "No entry to close, or only a placeholder exists", body = Object, example = json!({
            "message": "Entry must be marked before the exit"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_exit(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ScanExit>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_manager(payload.employee_id)?;
    let ScanExit {
        employee_id,
        qr_token,
        activity,
    } = payload.into_inner();
    let record = engine.mark_exit(employee_id, &qr_token, activity).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Exit registered",
        "data": record
    })))
}

/// Manual entry or exit by HR/Admin
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body = ManualMarkRequest,
    responses(
        (status = 200, description = "Manual mark recorded", body = Object),
        (status = 400, description = "Conflicts with QR attendance or a justification", body = Object, example = json!({
            "message": "A QR entry already exists for this day"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn mark_manual(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ManualMarkRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let req = payload.into_inner();
    let record = engine
        .mark_manual(ManualMark {
            employee_id: req.employee_id,
            direction: req.direction,
            at: req.at,
            justification: req.justification,
            marked_by: auth.display_name.clone(),
            dni: req.dni,
            activity: req.activity,
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Manual {} recorded", req.direction),
        "data": record
    })))
}

/// Generate placeholder sheets for a month
#[utoipa::path(
    post,
    path = "/api/attendance/monthly-sheets",
    request_body = MonthlySheetsRequest,
    responses(
        (status = 200, description = "Sheets generated", body = crate::service::sheets::SheetRun),
        (status = 400, description = "Invalid period"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No employees found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn create_monthly_sheets(
    auth: AuthUser,
    sheets: web::Data<SheetGenerator>,
    payload: web::Json<MonthlySheetsRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let run = sheets
        .create_monthly_sheets(payload.year, payload.month, payload.employee_ids.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Collapse duplicate records to one per employee and day
#[utoipa::path(
    post,
    path = "/api/attendance/remove-duplicates",
    responses(
        (status = 200, description = "Duplicates removed", body = crate::service::duplicates::CollapseRun),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn remove_duplicates(
    auth: AuthUser,
    collapser: web::Data<DuplicateCollapser>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let run = collapser.remove_duplicates().await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Justify an absence, delay or early exit
#[utoipa::path(
    post,
    path = "/api/attendance/justify",
    request_body = JustifyRequest,
    responses(
        (status = 200, description = "Justification stored", body = Object),
        (status = 400, description = "Short text, future date or QR attendance on that day", body = Object, example = json!({
            "message": "Justification must have at least 10 characters"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn justify(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<JustifyRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_manager(payload.employee_id)?;
    let req = payload.into_inner();
    let marked_by = auth.is_manager().then(|| auth.display_name.clone());
    let record = engine
        .justify_attendance(Justification {
            employee_id: req.employee_id,
            date: req.date,
            kind: req.kind,
            text: req.text,
            marked_by,
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Justification stored",
        "data": record
    })))
}

/// Days of the last 30 without a justification
#[utoipa::path(
    get,
    path = "/api/attendance/unjustified/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Unjustified days", body = [crate::service::engine::UnjustifiedDay]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn unjustified_days(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    auth.require_self_or_manager(employee_id)?;
    let days = engine.get_unjustified_days(employee_id).await?;
    Ok(HttpResponse::Ok().json(days))
}

/// Whether a day has scan-backed attendance
#[utoipa::path(
    get,
    path = "/api/attendance/check-real/{employee_id}/{date}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID"),
        ("date" = String, Path, description = "Local date, YYYY-MM-DD"),
        CheckQuery
    ),
    responses(
        (status = 200, description = "Check result", body = Object, example = json!({
            "employee_id": 7, "date": "2025-03-03", "has_attendance": true
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_attendance(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(u64, NaiveDate)>,
    query: web::Query<CheckQuery>,
) -> actix_web::Result<impl Responder> {
    let (employee_id, date) = path.into_inner();
    auth.require_self_or_manager(employee_id)?;
    let has_attendance = match query.kind.unwrap_or_default() {
        CheckKind::Qr => engine.has_qr_attendance(employee_id, date).await?,
        CheckKind::Real => engine.has_real_attendance(employee_id, date).await?,
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "employee_id": employee_id,
        "date": date,
        "has_attendance": has_attendance
    })))
}

/// Attendance records of a month, by entry time
#[utoipa::path(
    get,
    path = "/api/attendance/report/month/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month, 1-12")
    ),
    responses(
        (status = 200, description = "Records of the month", body = [crate::model::attendance::AttendanceRecord]),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn month_records(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(i32, u32)>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let (year, month) = path.into_inner();
    let records = engine.get_by_month_year(year, month).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Attendance records in a date range
#[utoipa::path(
    post,
    path = "/api/attendance/report/range",
    request_body = RangeRequest,
    responses(
        (status = 200, description = "Records in range", body = [crate::model::attendance::AttendanceRecord]),
        (status = 400, description = "Start after end"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn range_records(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<RangeRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = scoped_employee(&auth, payload.employee_id)?;
    let records = engine
        .get_by_date_range(payload.start, payload.end, employee_id)
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Monthly attendance statistics
#[utoipa::path(
    get,
    path = "/api/attendance/report/stats/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month, 1-12")
    ),
    responses(
        (status = 200, description = "Monthly statistics", body = crate::service::engine::MonthlyStats),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn monthly_stats(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(i32, u32)>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let (year, month) = path.into_inner();
    let stats = engine.get_monthly_stats(year, month).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// Purge attendance rows older than one month
#[utoipa::path(
    post,
    path = "/api/attendance/cleanup",
    responses(
        (status = 200, description = "Old rows deleted", body = crate::service::retention::CleanupRun),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn cleanup(
    auth: AuthUser,
    sweeper: web::Data<RetentionSweeper>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let run = sweeper.cleanup_old_attendances().await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Managers may filter by anyone; employees always see only their own rows.
pub fn scoped_employee(
    auth: &AuthUser,
    requested: Option<u64>,
) -> actix_web::Result<Option<u64>> {
    if auth.is_manager() {
        return Ok(requested);
    }
    let own = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;
    auth.require_self_or_manager(requested.unwrap_or(own))?;
    Ok(Some(own))
}
