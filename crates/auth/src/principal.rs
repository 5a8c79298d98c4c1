use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sitebook_core::{TenantId, UserId};

/// Identity of the caller as asserted by the token subject.
///
/// The subject is the user's id, so a principal converts losslessly into the
/// [`UserId`] used by the user directory and the domain commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.0)
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<UserId> for PrincipalId {
    fn from(value: UserId) -> Self {
        Self(*value.as_uuid())
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Roles and permissions granted to a principal inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<crate::Role>,
    pub permissions: Vec<crate::Permission>,
}

impl TenantMembership {
    /// Membership whose permissions are derived from the role policy.
    pub fn from_roles(tenant_id: TenantId, roles: Vec<crate::Role>) -> Self {
        let mut permissions: Vec<crate::Permission> =
            roles.iter().flat_map(crate::role_permissions).collect();
        permissions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        permissions.dedup();
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }
}
