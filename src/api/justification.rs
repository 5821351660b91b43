use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::justification::AbsenceReason;
use crate::service::justifications::JustificationDesk;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateJustification {
    /// Defaults to the caller's own employee record
    #[schema(example = 7, nullable = true)]
    pub employee_id: Option<u64>,
    #[schema(example = "2025-03-03", format = "date", value_type = String)]
    pub absence_date: NaiveDate,
    #[schema(example = "illness")]
    pub reason: AbsenceReason,
    #[schema(example = "Fever, medical certificate attached")]
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectJustification {
    #[schema(example = "No certificate was attached")]
    pub reason: String,
}

/// File an absence justification for review
#[utoipa::path(
    post,
    path = "/api/justifications",
    request_body = CreateJustification,
    responses(
        (status = 200, description = "Request queued", body = crate::model::justification::JustificationRequest),
        (status = 400, description = "Short description or an open request for that day", body = Object, example = json!({
            "message": "A pending justification already exists for 2025-03-03"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn create_justification(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    payload: web::Json<CreateJustification>,
) -> actix_web::Result<impl Responder> {
    let req = payload.into_inner();
    let employee_id = req
        .employee_id
        .or(auth.employee_id)
        .ok_or_else(|| AppError::Forbidden("No employee profile".into()))?;
    auth.require_self_or_manager(employee_id)?;
    let created = desk
        .create(employee_id, req.absence_date, req.reason, &req.description)
        .await?;
    Ok(HttpResponse::Ok().json(created))
}

/// Every justification request, newest first
#[utoipa::path(
    get,
    path = "/api/justifications",
    responses(
        (status = 200, description = "All requests", body = [crate::model::justification::JustificationRequest]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn list_justifications(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    Ok(HttpResponse::Ok().json(desk.list_all().await?))
}

/// Requests awaiting review, oldest first
#[utoipa::path(
    get,
    path = "/api/justifications/pending",
    responses(
        (status = 200, description = "Pending requests", body = [crate::model::justification::JustificationRequest]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn pending_justifications(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    Ok(HttpResponse::Ok().json(desk.list_pending().await?))
}

/// Requests filed for one employee
#[utoipa::path(
    get,
    path = "/api/justifications/employee/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Requests of the employee", body = [crate::model::justification::JustificationRequest]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn employee_justifications(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    auth.require_self_or_manager(employee_id)?;
    Ok(HttpResponse::Ok().json(desk.list_by_employee(employee_id).await?))
}

/// One justification request
#[utoipa::path(
    get,
    path = "/api/justifications/{id}",
    params(("id" = u64, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request found", body = crate::model::justification::JustificationRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn get_justification(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let request = desk.find(path.into_inner()).await?;
    auth.require_self_or_manager(request.employee_id)?;
    Ok(HttpResponse::Ok().json(request))
}

/// Approve a request and justify the absence on the attendance table
#[utoipa::path(
    put,
    path = "/api/justifications/{id}/approve",
    params(("id" = u64, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Approved and applied", body = crate::service::justifications::Approval),
        (status = 400, description = "Not pending, or the day has a QR attendance", body = Object, example = json!({
            "message": "Only pending justifications can be approved"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn approve_justification(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let approval = desk.approve(path.into_inner(), &auth.display_name).await?;
    Ok(HttpResponse::Ok().json(approval))
}

/// Reject a pending request
#[utoipa::path(
    put,
    path = "/api/justifications/{id}/reject",
    params(("id" = u64, Path, description = "Request ID")),
    request_body = RejectJustification,
    responses(
        (status = 200, description = "Request rejected", body = crate::model::justification::JustificationRequest),
        (status = 400, description = "Not pending or reason too short", body = Object, example = json!({
            "message": "Rejection reason must have at least 5 characters"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn reject_justification(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    path: web::Path<u64>,
    payload: web::Json<RejectJustification>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let rejected = desk
        .reject(path.into_inner(), &auth.display_name, &payload.reason)
        .await?;
    Ok(HttpResponse::Ok().json(rejected))
}

/// Whether a request was filed for the employee's day
#[utoipa::path(
    get,
    path = "/api/justifications/verify/{employee_id}/{date}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID"),
        ("date" = String, Path, description = "Local date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Verification result", body = crate::service::justifications::DayVerification),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Justifications"
)]
pub async fn verify_justification(
    auth: AuthUser,
    desk: web::Data<JustificationDesk>,
    path: web::Path<(u64, NaiveDate)>,
) -> actix_web::Result<impl Responder> {
    let (employee_id, date) = path.into_inner();
    auth.require_self_or_manager(employee_id)?;
    Ok(HttpResponse::Ok().json(desk.verify(employee_id, date).await?))
}
