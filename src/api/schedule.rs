use crate::auth::auth::AuthUser;
use crate::model::schedule::CreateSchedule;
use crate::service::schedule::ScheduleResolver;
use actix_web::{HttpResponse, Responder, web};

/// Create a work schedule
#[utoipa::path(
    post,
    path = "/api/schedule",
    request_body = CreateSchedule,
    responses(
        (status = 200, description = "Schedule created", body = crate::model::schedule::ScheduleDefinition),
        (status = 400, description = "Bad time format, entry not before exit, or tolerance out of range", body = Object, example = json!({
            "message": "Entry time must be earlier than exit time"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Schedule"
)]
pub async fn create_schedule(
    auth: AuthUser,
    resolver: web::Data<ScheduleResolver>,
    payload: web::Json<CreateSchedule>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let schedule = resolver.create_schedule(&payload).await?;
    Ok(HttpResponse::Ok().json(schedule))
}
