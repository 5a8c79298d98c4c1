use std::collections::HashSet;

use thiserror::Error;

use sitebook_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A caller resolved for an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: project is not assigned to this manager")]
    NotAssigned,
}

/// Permissions a command needs before it may be dispatched.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure policy check of one permission inside the active tenant.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains(Permission::WILDCARD) || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
