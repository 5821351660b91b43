use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::AUTHORIZATION,
    web::Data,
};
use serde_json::json;

/// Attaches the caller as an `AuthUser` extension. Rejections answer 401 with
/// the same `{"message": ...}` body as `AppError`.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let caller = match authenticate(&req, &config.jwt_secret) {
        Ok(caller) => caller,
        Err(message) => {
            tracing::debug!(path = %req.path(), reason = message, "Unauthenticated request");
            let resp = HttpResponse::Unauthorized().json(json!({ "message": message }));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    req.extensions_mut().insert(caller);
    next.call(req).await
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, &'static str> {
    let value = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header encoding")?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or("Authorization header must carry a Bearer token")
}

fn authenticate(req: &ServiceRequest, secret: &str) -> Result<AuthUser, &'static str> {
    let claims = verify_token(bearer_token(req)?, secret).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        "Invalid or expired token"
    })?;
    let role = Role::from_id(claims.role).ok_or("Unknown role")?;

    // marked_by on manual rows comes from here
    let display_name = claims
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| claims.sub.clone());

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        display_name,
        role,
        employee_id: claims.employee_id,
    })
}

#[cfg(test)]
mod auth_middleware_tests {
    use super::*;
    use crate::models::{Claims, TokenType};
    use actix_web::{App, http::StatusCode, middleware::from_fn, test, web};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use rstest::rstest;

    const SECRET: &str = "middleware-secret";

    fn config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: SECRET.into(),
            rate_scan_per_min: 60,
            rate_protected_per_min: 600,
            api_prefix: "/api".into(),
            utc_offset_minutes: 0,
            retention_enabled: false,
        }
    }

    fn token(role: u8, name: Option<&str>, token_type: TokenType) -> String {
        let claims = Claims {
            user_id: 4,
            sub: "luis.paredes".into(),
            role,
            exp: 4_102_444_800,
            jti: "mw".into(),
            token_type,
            employee_id: Some(12),
            name: name.map(str::to_string),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn whoami(caller: AuthUser) -> HttpResponse {
        HttpResponse::Ok().json(json!({
            "name": caller.display_name,
            "employee_id": caller.employee_id,
        }))
    }

    macro_rules! guarded_app {
        () => {
            test::init_service(
                App::new().app_data(Data::new(config())).service(
                    web::scope("/api")
                        .wrap(from_fn(auth_middleware))
                        .route("/whoami", web::get().to(whoami)),
                ),
            )
            .await
        };
    }

    #[rstest]
    #[case(None, "Missing Authorization header")]
    #[case(Some("Basic bHVpczpzZWNyZXQ=".to_string()), "Authorization header must carry a Bearer token")]
    #[case(Some("Bearer ".to_string()), "Authorization header must carry a Bearer token")]
    #[case(Some(format!("Bearer {}", token(3, None, TokenType::Refresh))), "Invalid or expired token")]
    #[case(Some(format!("Bearer {}", token(9, None, TokenType::Access))), "Unknown role")]
    #[actix_web::test]
    async fn it_should_answer_401_with_a_message(
        #[case] header: Option<String>,
        #[case] message: &str,
    ) {
        let app = guarded_app!();
        let mut req = test::TestRequest::get().uri("/api/whoami");
        if let Some(header) = header {
            req = req.insert_header((AUTHORIZATION, header));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], message);
    }

    #[rstest]
    #[case(Some("Luis Paredes"), "Luis Paredes")]
    #[case(Some("   "), "luis.paredes")]
    #[case(None, "luis.paredes")]
    #[actix_web::test]
    async fn it_should_name_the_caller_from_the_token(
        #[case] name: Option<&str>,
        #[case] expected: &str,
    ) {
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header((AUTHORIZATION, format!("Bearer {}", token(3, name, TokenType::Access))))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], expected);
        assert_eq!(body["employee_id"], 12);
    }
}
