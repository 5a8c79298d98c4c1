use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier, e.g. `"transactions.expense.record"`.
///
/// `"*"` is the wildcard granted to admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub const USERS_MANAGE: &'static str = "users.manage";
    pub const USERS_READ: &'static str = "users.read";
    pub const PROJECTS_MANAGE: &'static str = "projects.manage";
    pub const PROJECTS_READ: &'static str = "projects.read";
    pub const TASKS_MANAGE: &'static str = "tasks.manage";
    pub const TASKS_STATUS: &'static str = "tasks.status";
    pub const TASKS_READ: &'static str = "tasks.read";
    pub const WORKERS_MANAGE: &'static str = "workers.manage";
    pub const WORKERS_READ: &'static str = "workers.read";
    pub const PAYROLL_MANAGE: &'static str = "payroll.manage";
    pub const PAYROLL_READ: &'static str = "payroll.read";
    pub const EXPENSE_RECORD: &'static str = "transactions.expense.record";
    pub const INCOME_RECORD: &'static str = "transactions.income.record";
    pub const TRANSACTIONS_MODERATE: &'static str = "transactions.moderate";
    pub const TRANSACTIONS_READ: &'static str = "transactions.read";
    pub const ATTENDANCE_RECORD: &'static str = "attendance.record";
    pub const ATTENDANCE_READ: &'static str = "attendance.read";
    pub const INSIGHTS_REQUEST: &'static str = "insights.request";
    pub const DASHBOARD_READ: &'static str = "dashboard.read";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role policy.
///
/// Managers work inside their assigned projects: they log expenses and
/// attendance, move tasks along and read what they need for that. Whether a
/// manager is assigned to a given project is checked by the API against the
/// project read model; this table only says what kind of action is allowed.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        Role::ADMIN => vec![Permission::new(Permission::WILDCARD)],
        Role::MANAGER => [
            Permission::PROJECTS_READ,
            Permission::TASKS_READ,
            Permission::TASKS_STATUS,
            Permission::WORKERS_READ,
            Permission::EXPENSE_RECORD,
            Permission::TRANSACTIONS_READ,
            Permission::ATTENDANCE_RECORD,
            Permission::ATTENDANCE_READ,
            Permission::INSIGHTS_REQUEST,
            Permission::DASHBOARD_READ,
        ]
        .into_iter()
        .map(Permission::new)
        .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_wildcard_only() {
        let perms = role_permissions(&Role::admin());
        assert_eq!(perms.len(), 1);
        assert!(perms[0].is_wildcard());
    }

    #[test]
    fn managers_cannot_moderate_or_pay() {
        let perms: Vec<String> = role_permissions(&Role::manager())
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert!(perms.contains(&Permission::EXPENSE_RECORD.to_string()));
        assert!(!perms.contains(&Permission::TRANSACTIONS_MODERATE.to_string()));
        assert!(!perms.contains(&Permission::PAYROLL_MANAGE.to_string()));
        assert!(!perms.contains(&Permission::INCOME_RECORD.to_string()));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(role_permissions(&Role::new("viewer")).is_empty());
    }
}
