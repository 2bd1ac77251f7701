//! Named permissions in `module.action` form and the default role grants
//! seeded at startup.

use once_cell::sync::Lazy;

use super::role::Role;

pub const ACTIONS: [&str; 4] = ["read", "create", "update", "delete"];

pub const MODULES: [&str; 14] = [
    "employee",
    "employment",
    "organization",
    "grant",
    "funding_allocation",
    "payroll",
    "leave",
    "travel_request",
    "personnel_action",
    "resignation",
    "probation",
    "holiday_compensation",
    "recycle_bin",
    "user",
];

/// Every `module.action` pair.
pub static ALL_PERMISSIONS: Lazy<Vec<String>> = Lazy::new(|| {
    MODULES
        .iter()
        .flat_map(|m| ACTIONS.iter().map(move |a| format!("{m}.{a}")))
        .collect()
});

pub fn is_known(permission: &str) -> bool {
    ALL_PERMISSIONS.iter().any(|p| p == permission)
}

/// Grants applied to a role the first time it is seeded.
pub fn default_permissions(role: Role) -> Vec<String> {
    match role {
        Role::Admin => ALL_PERMISSIONS.clone(),
        Role::Hr => ALL_PERMISSIONS
            .iter()
            .filter(|p| !p.starts_with("user.") && p.as_str() != "recycle_bin.delete")
            .cloned()
            .collect(),
        Role::Employee => [
            "leave.read",
            "leave.create",
            "travel_request.read",
            "travel_request.create",
            "resignation.read",
            "resignation.create",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect(),
        Role::System => ALL_PERMISSIONS
            .iter()
            .filter(|p| p.ends_with(".read"))
            .cloned()
            .collect(),
        Role::ApiUser => [
            "employee.read",
            "employment.read",
            "grant.read",
            "payroll.read",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_modules_times_actions() {
        assert_eq!(ALL_PERMISSIONS.len(), MODULES.len() * ACTIONS.len());
        assert!(is_known("payroll.create"));
        assert!(is_known("employment.read"));
        assert!(!is_known("payroll.approve"));
    }

    #[test]
    fn hr_cannot_manage_users_or_purge() {
        let hr = default_permissions(Role::Hr);
        assert!(hr.iter().any(|p| p == "payroll.create"));
        assert!(hr.iter().any(|p| p == "recycle_bin.update"));
        assert!(!hr.iter().any(|p| p == "recycle_bin.delete"));
        assert!(!hr.iter().any(|p| p.starts_with("user.")));
    }

    #[test]
    fn system_role_is_read_only() {
        assert!(
            default_permissions(Role::System)
                .iter()
                .all(|p| p.ends_with(".read"))
        );
    }

    #[test]
    fn every_default_grant_is_known() {
        for role in Role::ALL {
            for permission in default_permissions(role) {
                assert!(is_known(&permission), "{permission}");
            }
        }
    }
}
