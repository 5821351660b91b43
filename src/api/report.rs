use crate::api::attendance::scoped_employee;
use crate::auth::auth::AuthUser;
use crate::service::reports::ReportMaterializer;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportFilter {
    /// Restrict to one employee (HR/Admin only)
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeReportQuery {
    pub year: Option<i32>,
    /// Requires `year`
    pub month: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct DateRangeRequest {
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub start: NaiveDate,
    #[schema(example = "2025-03-31", format = "date", value_type = String)]
    pub end: NaiveDate,
    #[schema(example = 7, nullable = true)]
    pub employee_id: Option<u64>,
}

/// Reports of a month
#[utoipa::path(
    get,
    path = "/api/reports/year/{year}/month/{month}",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month, 1-12"),
        ReportFilter
    ),
    responses(
        (status = 200, description = "Reports of the month, by day", body = [crate::model::report::AttendanceReport]),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn by_year_month(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
    path: web::Path<(i32, u32)>,
    query: web::Query<ReportFilter>,
) -> actix_web::Result<impl Responder> {
    let (year, month) = path.into_inner();
    let employee_id = scoped_employee(&auth, query.employee_id)?;
    let rows = reports.get_by_year_month(year, month, employee_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Reports of a year
#[utoipa::path(
    get,
    path = "/api/reports/year/{year}",
    params(
        ("year" = i32, Path, description = "Year"),
        ReportFilter
    ),
    responses(
        (status = 200, description = "Reports of the year, by day", body = [crate::model::report::AttendanceReport]),
        (status = 400, description = "Invalid year"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn by_year(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
    path: web::Path<i32>,
    query: web::Query<ReportFilter>,
) -> actix_web::Result<impl Responder> {
    let employee_id = scoped_employee(&auth, query.employee_id)?;
    let rows = reports.get_by_year(path.into_inner(), employee_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Reports between two local dates, inclusive
#[utoipa::path(
    post,
    path = "/api/reports/date-range",
    request_body = DateRangeRequest,
    responses(
        (status = 200, description = "Reports in range, by day", body = [crate::model::report::AttendanceReport]),
        (status = 400, description = "Start after end"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn by_date_range(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
    payload: web::Json<DateRangeRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = scoped_employee(&auth, payload.employee_id)?;
    let rows = reports
        .get_by_date_range(payload.start, payload.end, employee_id)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Reports of one employee, newest first
#[utoipa::path(
    get,
    path = "/api/reports/employee/{id}",
    params(
        ("id" = u64, Path, description = "Employee ID"),
        EmployeeReportQuery
    ),
    responses(
        (status = 200, description = "Reports of the employee", body = [crate::model::report::AttendanceReport]),
        (status = 400, description = "Month without year"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn by_employee(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
    path: web::Path<u64>,
    query: web::Query<EmployeeReportQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    auth.require_self_or_manager(employee_id)?;
    let rows = reports
        .get_by_employee(employee_id, query.year, query.month)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Monthly report statistics
#[utoipa::path(
    get,
    path = "/api/reports/stats/year/{year}/month/{month}",
    params(
        ("year" = i32, Path, description = "Year"),
        ("month" = u32, Path, description = "Month, 1-12")
    ),
    responses(
        (status = 200, description = "Counters and the month's reports", body = crate::service::reports::ReportStats),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn stats(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
    path: web::Path<(i32, u32)>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let (year, month) = path.into_inner();
    let stats = reports.get_stats_by_year_month(year, month).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// Rebuild every report from the attendance table
#[utoipa::path(
    post,
    path = "/api/reports/sync-all",
    responses(
        (status = 200, description = "Sync finished", body = crate::service::reports::SyncRun),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn sync_all(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let run = reports.sync_all_attendances().await?;
    Ok(HttpResponse::Ok().json(run))
}

/// Reports versus attendances
#[utoipa::path(
    get,
    path = "/api/reports/sync-status",
    responses(
        (status = 200, description = "Sync coverage", body = crate::service::reports::SyncStatus, example = json!({
            "total_attendances": 120, "total_reports": 118, "pending": 2, "percentage": "98.33"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn sync_status(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let status = reports.get_sync_status().await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Re-stamp year and month from each report's date
#[utoipa::path(
    post,
    path = "/api/reports/fix-months",
    responses(
        (status = 200, description = "Periods repaired", body = crate::service::reports::FixRun),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Reports"
)]
pub async fn fix_months(
    auth: AuthUser,
    reports: web::Data<ReportMaterializer>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let run = reports.fix_incorrect_months().await?;
    Ok(HttpResponse::Ok().json(run))
}
