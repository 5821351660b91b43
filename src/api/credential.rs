use crate::auth::auth::AuthUser;
use crate::service::credentials::CredentialIssuer;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateCredential {
    /// Explicit token; a random one is generated when omitted
    #[schema(example = "gate-a-morning", nullable = true)]
    pub name: Option<String>,
    /// Credential to deactivate once the new one exists
    #[schema(example = 3, nullable = true)]
    pub replaces: Option<u64>,
}

/// Issue a QR token valid for 24 hours
#[utoipa::path(
    post,
    path = "/api/qr",
    request_body = CreateCredential,
    responses(
        (status = 200, description = "QR code created", body = crate::model::credential::Credential),
        (status = 400, description = "Reserved or duplicate token", body = Object, example = json!({
            "message": "QR code 'gate-a-morning' already exists"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn create_credential(
    auth: AuthUser,
    issuer: web::Data<CredentialIssuer>,
    payload: Option<web::Json<CreateCredential>>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let req = payload.map(web::Json::into_inner).unwrap_or_default();
    let credential = issuer.create(req.name, req.replaces).await?;
    Ok(HttpResponse::Ok().json(credential))
}

/// List issued QR codes, newest first
#[utoipa::path(
    get,
    path = "/api/qr",
    responses(
        (status = 200, description = "Issued QR codes", body = [crate::model::credential::Credential]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn list_credentials(
    auth: AuthUser,
    issuer: web::Data<CredentialIssuer>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    Ok(HttpResponse::Ok().json(issuer.list().await?))
}

/// Deactivate a QR code
#[utoipa::path(
    put,
    path = "/api/qr/{id}/deactivate",
    params(("id" = u64, Path, description = "QR code ID")),
    responses(
        (status = 200, description = "QR code deactivated", body = Object, example = json!({
            "message": "QR code deactivated"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "QR code not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "QR"
)]
pub async fn deactivate_credential(
    auth: AuthUser,
    issuer: web::Data<CredentialIssuer>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    issuer.deactivate(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "QR code deactivated" })))
}
