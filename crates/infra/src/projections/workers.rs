use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sitebook_core::{Money, TenantId};
use sitebook_events::EventEnvelope;
use sitebook_workforce::{PaymentType, WorkerEvent, WorkerId};

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, WORKER_AGGREGATE};
use crate::read_model::TenantStore;

/// Worker profile. Balances live in the payroll projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReadModel {
    pub worker_id: WorkerId,
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct WorkersProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> WorkersProjection<S>
where
    S: TenantStore<WorkerId, WorkerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != WORKER_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let event: WorkerEvent = decode(envelope)?;
        match event {
            WorkerEvent::Registered(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.worker_id,
                    WorkerReadModel {
                        worker_id: e.worker_id,
                        name: e.name,
                        skill: e.skill,
                        phone: e.phone,
                        payment_type: e.payment_type,
                        base_rate: e.base_rate,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            WorkerEvent::ProfileUpdated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut model) = self.store.get(tenant_id, &e.worker_id) {
                    model.name = e.name;
                    model.skill = e.skill;
                    model.phone = e.phone;
                    model.payment_type = e.payment_type;
                    model.base_rate = e.base_rate;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.worker_id, model);
                }
            }
            WorkerEvent::Removed(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.remove(tenant_id, &e.worker_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId, worker_id: &WorkerId) -> Option<WorkerReadModel> {
        self.store.get(tenant_id, worker_id)
    }

    /// Active workers sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<WorkerReadModel> {
        let mut workers = self.store.list(tenant_id);
        workers.sort_by(|a, b| a.name.cmp(&b.name).then(a.worker_id.cmp(&b.worker_id)));
        workers
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
