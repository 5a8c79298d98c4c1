//! User directory read model.
//!
//! A user's assigned projects are not stored on the user: they are the
//! projects whose current manager is that user, tracked from project events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sitebook_auth::{Role, UserEvent};
use sitebook_core::{TenantId, UserId};
use sitebook_events::EventEnvelope;
use sitebook_projects::{ProjectEvent, ProjectId};

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, PROJECT_AGGREGATE, USER_AGGREGATE};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub assigned_project_ids: Vec<ProjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct UsersProjection<S> {
    store: S,
    managers: InMemoryTenantStore<ProjectId, UserId>,
    cursors: StreamCursors,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            managers: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != USER_AGGREGATE && aggregate_type != PROJECT_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        if aggregate_type == USER_AGGREGATE {
            let event: UserEvent = decode(envelope)?;
            self.apply_user(envelope, tenant_id, event)?;
        } else {
            let event: ProjectEvent = decode(envelope)?;
            match event {
                ProjectEvent::Created(e) => {
                    ensure_tenant(envelope, e.tenant_id)?;
                    self.managers.upsert(tenant_id, e.project_id, e.manager_id);
                }
                ProjectEvent::ManagerAssigned(e) => {
                    ensure_tenant(envelope, e.tenant_id)?;
                    self.managers.upsert(tenant_id, e.project_id, e.manager_id);
                }
                ProjectEvent::DetailsUpdated(_) | ProjectEvent::StatusChanged(_) => {}
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn apply_user(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        tenant_id: TenantId,
        event: UserEvent,
    ) -> Result<(), ProjectionError> {
        match event {
            UserEvent::Registered(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        tenant_id,
                        name: e.name,
                        email: e.email,
                        role: e.role,
                        assigned_project_ids: Vec::new(),
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::RoleChanged(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    model.role = e.role;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
            UserEvent::ProfileUpdated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut model) = self.store.get(tenant_id, &e.user_id) {
                    model.name = e.name;
                    model.email = e.email;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.user_id, model);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, user_id: &UserId) -> Option<UserReadModel> {
        self.store
            .get(tenant_id, user_id)
            .map(|model| self.with_assignments(tenant_id, model))
    }

    /// Users sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<UserReadModel> {
        let mut users: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .map(|model| self.with_assignments(tenant_id, model))
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.email.cmp(&b.email)));
        users
    }

    pub fn get_by_email(&self, tenant_id: TenantId, email: &str) -> Option<UserReadModel> {
        let normalized = email.trim().to_lowercase();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|u| u.email == normalized)
            .map(|model| self.with_assignments(tenant_id, model))
    }

    pub fn assigned_projects(&self, tenant_id: TenantId, user_id: UserId) -> Vec<ProjectId> {
        let mut projects: Vec<_> = self
            .managers
            .list_entries(tenant_id)
            .into_iter()
            .filter_map(|(project_id, manager)| (manager == user_id).then_some(project_id))
            .collect();
        projects.sort();
        projects
    }

    pub fn manager_of(&self, tenant_id: TenantId, project_id: &ProjectId) -> Option<UserId> {
        self.managers.get(tenant_id, project_id)
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.managers.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    fn with_assignments(&self, tenant_id: TenantId, mut model: UserReadModel) -> UserReadModel {
        model.assigned_project_ids = self.assigned_projects(tenant_id, model.user_id);
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sitebook_auth::{UserRegistered, UserRoleChanged};
    use sitebook_core::{AggregateId, Money};
    use sitebook_projects::{ProjectCreated, ProjectManagerAssigned, ProjectStatus};
    use uuid::Uuid;

    fn env<E: Serialize>(tenant: TenantId, agg: AggregateId, ty: &str, seq: u64, e: &E) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant, agg, ty, seq, serde_json::to_value(e).unwrap())
    }

    fn registered(tenant: TenantId, user: UserId, name: &str, role: Role) -> UserEvent {
        UserEvent::Registered(UserRegistered {
            tenant_id: tenant,
            user_id: user,
            name: name.to_string(),
            email: format!("{}@site.test", name.to_lowercase()),
            role,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn assignments_follow_project_manager_changes() {
        let projection = UsersProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant = TenantId::new();
        let asha = UserId::new();
        let vikram = UserId::new();
        let project_id = ProjectId::new(AggregateId::new());

        projection
            .apply_envelope(&env(tenant, AggregateId::from_uuid(*asha.as_uuid()), USER_AGGREGATE, 1, &registered(tenant, asha, "Asha", Role::manager())))
            .unwrap();
        projection
            .apply_envelope(&env(tenant, AggregateId::from_uuid(*vikram.as_uuid()), USER_AGGREGATE, 1, &registered(tenant, vikram, "Vikram", Role::manager())))
            .unwrap();

        let created = ProjectEvent::Created(ProjectCreated {
            tenant_id: tenant,
            project_id,
            name: "Riverside Villas".to_string(),
            location: "Pune".to_string(),
            budget_limit: Money::new(1_000_000),
            order_value: Money::new(1_500_000),
            manager_id: asha,
            status: ProjectStatus::Active,
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&env(tenant, project_id.0, PROJECT_AGGREGATE, 1, &created)).unwrap();
        assert_eq!(projection.get(tenant, &asha).unwrap().assigned_project_ids, vec![project_id]);

        let reassigned = ProjectEvent::ManagerAssigned(ProjectManagerAssigned {
            tenant_id: tenant,
            project_id,
            previous_manager_id: Some(asha),
            manager_id: vikram,
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&env(tenant, project_id.0, PROJECT_AGGREGATE, 2, &reassigned)).unwrap();

        assert!(projection.get(tenant, &asha).unwrap().assigned_project_ids.is_empty());
        assert_eq!(projection.get(tenant, &vikram).unwrap().assigned_project_ids, vec![project_id]);
        assert_eq!(projection.manager_of(tenant, &project_id), Some(vikram));
    }

    #[test]
    fn role_changes_apply_and_redelivery_is_ignored() {
        let projection = UsersProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant = TenantId::new();
        let user = UserId::new();
        let agg = AggregateId::from_uuid(*user.as_uuid());

        let first = env(tenant, agg, USER_AGGREGATE, 1, &registered(tenant, user, "Meera", Role::manager()));
        projection.apply_envelope(&first).unwrap();

        let change = UserEvent::RoleChanged(UserRoleChanged {
            tenant_id: tenant,
            user_id: user,
            previous: Role::manager(),
            role: Role::admin(),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&env(tenant, agg, USER_AGGREGATE, 2, &change)).unwrap();
        projection.apply_envelope(&first).unwrap();

        let model = projection.get_by_email(tenant, "MEERA@site.test").unwrap();
        assert!(model.role.is_admin());
        assert!(projection.list(TenantId::new()).is_empty());
    }
}
