//! User directory aggregate (event-sourced).
//!
//! A user is an admin or manager account. The stream id is the user id, which
//! is also the JWT subject, so a token maps straight onto its profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{require_text, Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use sitebook_events::Event;

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - A user belongs to exactly one tenant.
/// - The role is always `admin` or `manager`.
/// - Email addresses are stored lowercased.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            email: String::new(),
            role: Role::manager(),
            version: 0,
            created: false,
        }
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn known_role(role: &Role) -> Result<Role, DomainError> {
    Role::parse_known(role.as_str())
        .ok_or_else(|| DomainError::validation(format!("unknown role '{role}'")))
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeUserRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserProfile {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Register(RegisterUser),
    ChangeRole(ChangeUserRole),
    UpdateProfile(UpdateUserProfile),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleChanged {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub previous: Role,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileUpdated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    RoleChanged(UserRoleChanged),
    ProfileUpdated(UserProfileUpdated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered(_) => "auth.user.registered",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Registered(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.email = e.email.clone();
                self.role = e.role.clone();
                self.created = true;
            }
            UserEvent::RoleChanged(e) => self.role = e.role.clone(),
            UserEvent::ProfileUpdated(e) => {
                self.name = e.name.clone();
                self.email = e.email.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("user already registered"));
                }
                Ok(vec![UserEvent::Registered(UserRegistered {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    name: require_text("name", &cmd.name)?,
                    email: normalize_email(&cmd.email)?,
                    role: known_role(&cmd.role)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::ChangeRole(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                let role = known_role(&cmd.role)?;
                if role == self.role {
                    return Err(DomainError::invariant(format!("user already has role '{role}'")));
                }
                Ok(vec![UserEvent::RoleChanged(UserRoleChanged {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    previous: self.role.clone(),
                    role,
                    occurred_at: cmd.occurred_at,
                })])
            }
            UserCommand::UpdateProfile(cmd) => {
                self.ensure_exists(cmd.tenant_id)?;
                Ok(vec![UserEvent::ProfileUpdated(UserProfileUpdated {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    name: require_text("name", &cmd.name)?,
                    email: normalize_email(&cmd.email)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitebook_events::execute;

    fn register(tenant_id: TenantId, user_id: UserId, role: Role) -> UserCommand {
        UserCommand::Register(RegisterUser {
            tenant_id,
            user_id,
            name: " Asha Rao ".to_string(),
            email: "Asha@Example.com".to_string(),
            role,
            occurred_at: Utc::now(),
        })
    }

    fn registered(tenant_id: TenantId, role: Role) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        execute(&mut user, &register(tenant_id, user_id, role)).unwrap();
        user
    }

    #[test]
    fn register_normalizes_profile() {
        let user = registered(TenantId::new(), Role::manager());
        assert_eq!(user.name, "Asha Rao");
        assert_eq!(user.email, "asha@example.com");
        assert!(user.role.is_manager());
        assert_eq!(user.version, 1);
    }

    #[test]
    fn register_twice_conflicts() {
        let tenant_id = TenantId::new();
        let user = registered(tenant_id, Role::admin());
        let err = user.handle(&register(tenant_id, user.id, Role::admin())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn register_rejects_bad_input() {
        let user_id = UserId::new();
        let user = User::empty(user_id);
        let tenant_id = TenantId::new();

        let mut cmd = register(tenant_id, user_id, Role::manager());
        if let UserCommand::Register(c) = &mut cmd {
            c.email = "no-at-sign".to_string();
        }
        assert!(matches!(user.handle(&cmd), Err(DomainError::Validation(_))));

        let cmd = register(tenant_id, user_id, Role::new("foreman"));
        assert!(matches!(user.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn change_role_rejects_no_op() {
        let tenant_id = TenantId::new();
        let mut user = registered(tenant_id, Role::manager());

        let same = UserCommand::ChangeRole(ChangeUserRole {
            tenant_id,
            user_id: user.id,
            role: Role::manager(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(user.handle(&same), Err(DomainError::InvariantViolation(_))));

        let promote = UserCommand::ChangeRole(ChangeUserRole {
            tenant_id,
            user_id: user.id,
            role: Role::admin(),
            occurred_at: Utc::now(),
        });
        execute(&mut user, &promote).unwrap();
        assert!(user.role.is_admin());
    }

    #[test]
    fn commands_on_unknown_user_are_not_found() {
        let user = User::empty(UserId::new());
        let cmd = UserCommand::UpdateProfile(UpdateUserProfile {
            tenant_id: TenantId::new(),
            user_id: user.id,
            name: "x".to_string(),
            email: "x@y.z".to_string(),
            occurred_at: Utc::now(),
        });
        assert_eq!(user.handle(&cmd).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn other_tenant_cannot_touch_user() {
        let user = registered(TenantId::new(), Role::manager());
        let cmd = UserCommand::ChangeRole(ChangeUserRole {
            tenant_id: TenantId::new(),
            user_id: user.id,
            role: Role::admin(),
            occurred_at: Utc::now(),
        });
        let err = user.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("tenant"));
    }
}
