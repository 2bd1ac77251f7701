use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AppError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Caller identity resolved by `auth_middleware`, with the role's permission
/// names attached.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
    pub permissions: Arc<HashSet<String>>,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Missing token".into())),
        )
    }
}

impl AuthUser {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn require(&self, permission: &str) -> Result<(), AppError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Missing permission `{}`",
                permission
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    /// Returns true if the user is an employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }

    /// Employees only ever see their own records; everyone else may filter
    /// freely.
    pub fn scope_employee(&self, requested: Option<u64>) -> Result<Option<u64>, AppError> {
        if !self.is_employee() {
            return Ok(requested);
        }
        let own = self.employee_id.ok_or_else(|| {
            AppError::Forbidden("Account is not linked to an employee record".into())
        })?;
        match requested {
            Some(other) if other != own => Err(AppError::Forbidden(
                "Employees may only access their own records".into(),
            )),
            _ => Ok(Some(own)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_user(role: Role, employee_id: Option<u64>, permissions: &[&str]) -> AuthUser {
    AuthUser {
        user_id: 1,
        username: "tester".into(),
        role,
        employee_id,
        permissions: Arc::new(permissions.iter().map(|p| p.to_string()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_checks_permission_names() {
        let user = test_user(Role::Hr, None, &["payroll.read"]);
        assert!(user.require("payroll.read").is_ok());
        assert!(matches!(
            user.require("payroll.create"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn employees_are_scoped_to_themselves() {
        let user = test_user(Role::Employee, Some(12), &[]);
        assert_eq!(user.scope_employee(None).unwrap(), Some(12));
        assert_eq!(user.scope_employee(Some(12)).unwrap(), Some(12));
        assert!(user.scope_employee(Some(13)).is_err());

        let unlinked = test_user(Role::Employee, None, &[]);
        assert!(unlinked.scope_employee(None).is_err());
    }

    #[test]
    fn staff_roles_keep_requested_filter() {
        let user = test_user(Role::Hr, None, &[]);
        assert_eq!(user.scope_employee(None).unwrap(), None);
        assert_eq!(user.scope_employee(Some(5)).unwrap(), Some(5));
    }
}
