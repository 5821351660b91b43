use crate::{error::AppError, model::role::Role};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

/// Caller identity placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub display_name: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only".into()))
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Hr)
    }

    /// Employees may only act on their own record; HR and admins on anyone's.
    pub fn require_self_or_manager(&self, employee_id: u64) -> Result<(), AppError> {
        if self.is_manager() || self.employee_id == Some(employee_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Employees can only act on their own attendance".into(),
            ))
        }
    }
}

#[cfg(test)]
mod auth_user_tests {
    use super::*;
    use rstest::rstest;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "user".into(),
            display_name: "User".into(),
            role,
            employee_id,
        }
    }

    #[rstest]
    #[case(Role::Admin, None, true)]
    #[case(Role::Hr, None, true)]
    #[case(Role::Employee, Some(7), true)]
    #[case(Role::Employee, Some(8), false)]
    #[case(Role::Employee, None, false)]
    fn it_should_scope_employees_to_themselves(
        #[case] role: Role,
        #[case] employee_id: Option<u64>,
        #[case] allowed: bool,
    ) {
        assert_eq!(user(role, employee_id).require_self_or_manager(7).is_ok(), allowed);
    }

    #[test]
    fn it_should_gate_admin_routes() {
        assert!(user(Role::Admin, None).require_admin().is_ok());
        assert!(user(Role::Hr, None).require_admin().is_err());
        assert!(user(Role::Hr, None).require_hr_or_admin().is_ok());
        assert!(user(Role::Employee, Some(1)).require_hr_or_admin().is_err());
    }
}
