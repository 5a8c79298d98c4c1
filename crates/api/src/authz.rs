//! API-side authorization guard.
//!
//! Permission checks run at the command boundary, before dispatch. Project
//! scoping (a manager only sees assigned projects) is checked here against
//! the project read model, keeping aggregates auth-agnostic.

use sitebook_auth::{AuthzError, CommandAuthorization, Permission, Principal, TenantMembership, authorize};
use sitebook_infra::projections::ProjectReadModel;

use crate::context::{PrincipalContext, TenantContext};

/// Check every permission a command requires in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(tenant, principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Check a single permission (used by query routes).
pub fn authorize_permission(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &'static str,
) -> Result<(), AuthzError> {
    authorize(&resolve(tenant, principal), &Permission::new(permission))
}

/// Admins reach every project; managers only those assigned to them.
pub fn ensure_project_scope(principal: &PrincipalContext, project: &ProjectReadModel) -> Result<(), AuthzError> {
    if principal.is_admin() || project.assigned_manager_id == Some(principal.user_id()) {
        Ok(())
    } else {
        Err(AuthzError::NotAssigned)
    }
}

fn resolve(tenant: &TenantContext, principal: &PrincipalContext) -> Principal {
    Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership: TenantMembership::from_roles(tenant.tenant_id(), principal.roles().to_vec()),
    }
}
