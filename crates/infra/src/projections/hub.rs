//! Single entry point that fans committed events out to every read model.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use sitebook_core::{Money, TenantId, UserId};
use sitebook_events::EventEnvelope;
use sitebook_ledger::{TransactionId, TransactionRecord};
use sitebook_projects::{ProjectId, TaskId};
use sitebook_workforce::{AttendanceSheetId, WorkerId};

use super::{
    AttendanceProjection, AttendanceSheetReadModel, PayrollProjection, ProjectReadModel, ProjectionError,
    ProjectsProjection, TaskReadModel, TasksProjection, TransactionsProjection, UserReadModel, UsersProjection,
    WorkerPayroll, WorkerReadModel, WorkersProjection,
};
use crate::event_store::StoredEvent;
use crate::read_model::InMemoryTenantStore;

type Store<K, V> = Arc<InMemoryTenantStore<K, V>>;

/// Worker profile joined with the balance owed to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerView {
    #[serde(flatten)]
    pub profile: WorkerReadModel,
    pub current_balance: Money,
}

pub struct Projections {
    pub users: UsersProjection<Store<UserId, UserReadModel>>,
    pub projects: ProjectsProjection<Store<ProjectId, ProjectReadModel>>,
    pub tasks: TasksProjection<Store<TaskId, TaskReadModel>>,
    pub workers: WorkersProjection<Store<WorkerId, WorkerReadModel>>,
    pub payroll: PayrollProjection<Store<WorkerId, WorkerPayroll>>,
    pub transactions: TransactionsProjection<Store<TransactionId, TransactionRecord>>,
    pub attendance: AttendanceProjection<Store<AttendanceSheetId, AttendanceSheetReadModel>>,
}

impl Default for Projections {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Projections {
    pub fn in_memory() -> Self {
        Self {
            users: UsersProjection::new(Arc::new(InMemoryTenantStore::new())),
            projects: ProjectsProjection::new(Arc::new(InMemoryTenantStore::new())),
            tasks: TasksProjection::new(Arc::new(InMemoryTenantStore::new())),
            workers: WorkersProjection::new(Arc::new(InMemoryTenantStore::new())),
            payroll: PayrollProjection::new(Arc::new(InMemoryTenantStore::new())),
            transactions: TransactionsProjection::new(Arc::new(InMemoryTenantStore::new())),
            attendance: AttendanceProjection::new(Arc::new(InMemoryTenantStore::new())),
        }
    }

    /// Apply one committed envelope to every read model.
    ///
    /// Each projection filters by aggregate type and skips envelopes it has
    /// already seen. All projections are attempted; the first error is returned.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let results = [
            self.users.apply_envelope(envelope),
            self.projects.apply_envelope(envelope),
            self.tasks.apply_envelope(envelope),
            self.workers.apply_envelope(envelope),
            self.payroll.apply_envelope(envelope),
            self.transactions.apply_envelope(envelope),
            self.attendance.apply_envelope(envelope),
        ];

        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                warn!(
                    aggregate_type = envelope.aggregate_type(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence_number = envelope.sequence_number(),
                    error = %err,
                    "projection failed to apply event"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Clear the tenants present in `events` and replay them in commit order.
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<(), ProjectionError> {
        let tenants: BTreeSet<_> = events.iter().map(|e| *e.tenant_id.as_uuid()).collect();
        for tenant in &tenants {
            self.clear_tenant(TenantId::from_uuid(*tenant));
        }

        for stored in events {
            self.apply(&stored.to_envelope())?;
        }

        info!(tenants = tenants.len(), events = events.len(), "read models rebuilt");
        Ok(())
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.users.clear_tenant(tenant_id);
        self.projects.clear_tenant(tenant_id);
        self.tasks.clear_tenant(tenant_id);
        self.workers.clear_tenant(tenant_id);
        self.payroll.clear_tenant(tenant_id);
        self.transactions.clear_tenant(tenant_id);
        self.attendance.clear_tenant(tenant_id);
    }

    pub fn worker(&self, tenant_id: TenantId, worker_id: &WorkerId) -> Option<WorkerView> {
        self.workers.get(tenant_id, worker_id).map(|profile| WorkerView {
            current_balance: self.payroll.balance(tenant_id, worker_id),
            profile,
        })
    }

    pub fn list_workers(&self, tenant_id: TenantId) -> Vec<WorkerView> {
        self.workers
            .list(tenant_id)
            .into_iter()
            .map(|profile| WorkerView {
                current_balance: self.payroll.balance(tenant_id, &profile.worker_id),
                profile,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitebook_core::{AggregateId, ExpectedVersion};
    use sitebook_ledger::{PayrollEvent, PayrollLedgerId, WageAccrual, WagesAccrued};
    use sitebook_workforce::{PaymentType, WorkerEvent, WorkerRegistered};
    use uuid::Uuid;

    use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
    use crate::projections::{PAYROLL_AGGREGATE, WORKER_AGGREGATE};

    #[test]
    fn rebuild_from_the_log_reproduces_worker_balances() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let worker_id = WorkerId::new(AggregateId::new());
        let ledger_id = PayrollLedgerId::for_tenant(tenant);

        let registered = WorkerEvent::Registered(WorkerRegistered {
            tenant_id: tenant,
            worker_id,
            name: "Gopal".to_string(),
            skill: "Carpenter".to_string(),
            phone: "90000 11111".to_string(),
            payment_type: PaymentType::Daily,
            base_rate: Money::new(90_000),
            occurred_at: Utc::now(),
        });
        let accrued = PayrollEvent::WagesAccrued(WagesAccrued {
            tenant_id: tenant,
            ledger_id,
            accruals: vec![WageAccrual {
                worker_id,
                worker_name: "Gopal".to_string(),
                amount: Money::new(90_000),
            }],
            accrued_by: UserId::new(),
            occurred_at: Utc::now(),
        });

        store
            .append(
                vec![UncommittedEvent::from_typed(tenant, worker_id.0, WORKER_AGGREGATE, Uuid::now_v7(), &registered).unwrap()],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        store
            .append(
                vec![UncommittedEvent::from_typed(tenant, ledger_id.0, PAYROLL_AGGREGATE, Uuid::now_v7(), &accrued).unwrap()],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let projections = Projections::in_memory();
        let events = store.load_all().unwrap();
        projections.rebuild(&events).unwrap();
        // A second rebuild starts from scratch rather than double counting.
        projections.rebuild(&events).unwrap();

        let view = projections.worker(tenant, &worker_id).unwrap();
        assert_eq!(view.current_balance, Money::new(90_000));
        assert_eq!(view.profile.name, "Gopal");
        assert_eq!(projections.list_workers(tenant).len(), 1);
    }
}
