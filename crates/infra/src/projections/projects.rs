//! Project directory with derived financials.
//!
//! `utilised_budget`, `received_amount` and `pending_expenses` are only ever
//! computed here, by folding the budget effect of transaction events. Nothing
//! writes them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sitebook_core::{Money, TenantId, UserId};
use sitebook_events::EventEnvelope;
use sitebook_ledger::{BudgetEffect, TransactionEvent};
use sitebook_projects::{ProjectEvent, ProjectId, ProjectStatus};

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, PROJECT_AGGREGATE, TRANSACTION_AGGREGATE};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Money totals of one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFinancials {
    /// Sum of approved expenses.
    pub utilised_budget: Money,
    /// Sum of income.
    pub received_amount: Money,
    /// Sum of expenses waiting for approval.
    pub pending_expenses: Money,
}

impl ProjectFinancials {
    fn apply(&mut self, effect: BudgetEffect) {
        self.utilised_budget = self.utilised_budget.saturating_add(Money::new(effect.utilised));
        self.received_amount = self.received_amount.saturating_add(Money::new(effect.received));
        self.pending_expenses = self.pending_expenses.saturating_add(Money::new(effect.pending_expenses));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReadModel {
    pub project_id: ProjectId,
    pub tenant_id: TenantId,
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub assigned_manager_id: Option<UserId>,
    pub status: ProjectStatus,
    #[serde(flatten)]
    pub financials: ProjectFinancials,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectReadModel {
    pub fn remaining_budget(&self) -> Money {
        self.budget_limit.saturating_sub(self.financials.utilised_budget)
    }

    /// Utilised share of the budget in whole percent (0 when there is no budget).
    pub fn utilisation_percent(&self) -> i64 {
        let limit = self.budget_limit.minor_units();
        if limit <= 0 {
            return 0;
        }
        self.financials.utilised_budget.minor_units().saturating_mul(100) / limit
    }
}

pub struct ProjectsProjection<S> {
    store: S,
    financials: InMemoryTenantStore<ProjectId, ProjectFinancials>,
    cursors: StreamCursors,
}

impl<S> ProjectsProjection<S>
where
    S: TenantStore<ProjectId, ProjectReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            financials: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != PROJECT_AGGREGATE && aggregate_type != TRANSACTION_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        if aggregate_type == PROJECT_AGGREGATE {
            let event: ProjectEvent = decode(envelope)?;
            self.apply_project(envelope, tenant_id, event)?;
        } else {
            let event: TransactionEvent = decode(envelope)?;
            let effect = event.budget_effect();
            if !effect.is_none() {
                let project_id = event.project_id();
                let mut totals = self.financials.get(tenant_id, &project_id).unwrap_or_default();
                totals.apply(effect);
                self.financials.upsert(tenant_id, project_id, totals);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn apply_project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        tenant_id: TenantId,
        event: ProjectEvent,
    ) -> Result<(), ProjectionError> {
        match event {
            ProjectEvent::Created(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.project_id,
                    ProjectReadModel {
                        project_id: e.project_id,
                        tenant_id,
                        name: e.name,
                        location: e.location,
                        budget_limit: e.budget_limit,
                        order_value: e.order_value,
                        assigned_manager_id: Some(e.manager_id),
                        status: e.status,
                        financials: ProjectFinancials::default(),
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProjectEvent::DetailsUpdated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.project_id, e.occurred_at, |m| {
                    m.name = e.name;
                    m.location = e.location;
                    m.budget_limit = e.budget_limit;
                    m.order_value = e.order_value;
                });
            }
            ProjectEvent::StatusChanged(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.project_id, e.occurred_at, |m| m.status = e.to);
            }
            ProjectEvent::ManagerAssigned(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.project_id, e.occurred_at, |m| {
                    m.assigned_manager_id = Some(e.manager_id)
                });
            }
        }
        Ok(())
    }

    fn update(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut ProjectReadModel),
    ) {
        if let Some(mut model) = self.store.get(tenant_id, &project_id) {
            change(&mut model);
            model.updated_at = at;
            self.store.upsert(tenant_id, project_id, model);
        }
    }

    pub fn get(&self, tenant_id: TenantId, project_id: &ProjectId) -> Option<ProjectReadModel> {
        self.store
            .get(tenant_id, project_id)
            .map(|model| self.with_financials(tenant_id, model))
    }

    /// Projects sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ProjectReadModel> {
        let mut projects: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .map(|model| self.with_financials(tenant_id, model))
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name).then(a.project_id.cmp(&b.project_id)));
        projects
    }

    pub fn list_for_manager(&self, tenant_id: TenantId, manager_id: UserId) -> Vec<ProjectReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|p| p.assigned_manager_id == Some(manager_id))
            .collect()
    }

    pub fn financials(&self, tenant_id: TenantId, project_id: &ProjectId) -> ProjectFinancials {
        self.financials.get(tenant_id, project_id).unwrap_or_default()
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.financials.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    fn with_financials(&self, tenant_id: TenantId, mut model: ProjectReadModel) -> ProjectReadModel {
        model.financials = self.financials(tenant_id, &model.project_id);
        model
    }
}
