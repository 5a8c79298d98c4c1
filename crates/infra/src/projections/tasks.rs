use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sitebook_core::TenantId;
use sitebook_events::EventEnvelope;
use sitebook_projects::{ProjectId, TaskEvent, TaskId, TaskStatus};

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, TASK_AGGREGATE};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReadModel {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub expected_completion_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    pub status: Option<TaskStatus>,
}

pub struct TasksProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> TasksProjection<S>
where
    S: TenantStore<TaskId, TaskReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != TASK_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let event: TaskEvent = decode(envelope)?;
        match event {
            TaskEvent::Created(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.task_id,
                    TaskReadModel {
                        task_id: e.task_id,
                        project_id: e.project_id,
                        title: e.title,
                        description: e.description,
                        status: e.status,
                        expected_completion_date: e.expected_completion_date,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            TaskEvent::Updated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut model) = self.store.get(tenant_id, &e.task_id) {
                    model.title = e.title;
                    model.description = e.description;
                    model.expected_completion_date = e.expected_completion_date;
                    model.status = e.status;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.task_id, model);
                }
            }
            TaskEvent::StatusChanged(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut model) = self.store.get(tenant_id, &e.task_id) {
                    model.status = e.to;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.task_id, model);
                }
            }
            TaskEvent::Deleted(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.remove(tenant_id, &e.task_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, task_id: &TaskId) -> Option<TaskReadModel> {
        self.store.get(tenant_id, task_id)
    }

    /// Matching tasks, oldest first.
    pub fn list(&self, tenant_id: TenantId, filter: TaskFilter) -> Vec<TaskReadModel> {
        let mut tasks: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|t| filter.project_id.is_none_or(|p| t.project_id == p))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
