//! Unified transaction list.
//!
//! Project expenses and income come from transaction events; payroll
//! advances, settlements and salary lines come from payroll ledger events.

use serde_json::Value as JsonValue;

use sitebook_core::TenantId;
use sitebook_events::EventEnvelope;
use sitebook_ledger::{
    PayrollEvent, TransactionEvent, TransactionId, TransactionKind, TransactionRecord, TransactionStatus,
};
use sitebook_projects::ProjectId;
use sitebook_workforce::WorkerId;

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, PAYROLL_AGGREGATE, TRANSACTION_AGGREGATE};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub project_id: Option<ProjectId>,
    pub worker_id: Option<WorkerId>,
}

impl TransactionFilter {
    fn matches(&self, record: &TransactionRecord) -> bool {
        self.kind.is_none_or(|k| record.kind == k)
            && self.status.is_none_or(|s| record.status == s)
            && self.project_id.is_none_or(|p| record.project_id == Some(p))
            && self.worker_id.is_none_or(|w| record.worker_id == Some(w))
    }
}

pub struct TransactionsProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> TransactionsProjection<S>
where
    S: TenantStore<TransactionId, TransactionRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != TRANSACTION_AGGREGATE && aggregate_type != PAYROLL_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        if aggregate_type == TRANSACTION_AGGREGATE {
            let event: TransactionEvent = decode(envelope)?;
            self.apply_transaction(envelope, tenant_id, event)?;
        } else {
            let event: PayrollEvent = decode(envelope)?;
            let event_tenant = match &event {
                PayrollEvent::WagesAccrued(e) => e.tenant_id,
                PayrollEvent::AdvancePaid(e) => e.tenant_id,
                PayrollEvent::PaymentSettled(e) => e.tenant_id,
                PayrollEvent::SalariesPaid(e) => e.tenant_id,
            };
            ensure_tenant(envelope, event_tenant)?;
            for record in event.records() {
                self.store.upsert(tenant_id, record.id, record);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn apply_transaction(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        tenant_id: TenantId,
        event: TransactionEvent,
    ) -> Result<(), ProjectionError> {
        if let Some(record) = event.new_record() {
            let event_tenant = match &event {
                TransactionEvent::ExpenseRecorded(e) => e.tenant_id,
                TransactionEvent::IncomeRecorded(e) => e.tenant_id,
                _ => tenant_id,
            };
            ensure_tenant(envelope, event_tenant)?;
            self.store.upsert(tenant_id, record.id, record);
            return Ok(());
        }

        match event {
            TransactionEvent::Approved(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.set_status(tenant_id, e.transaction_id, TransactionStatus::Approved);
            }
            TransactionEvent::Rejected(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.set_status(tenant_id, e.transaction_id, TransactionStatus::Rejected);
            }
            TransactionEvent::Deleted(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.remove(tenant_id, &e.transaction_id);
            }
            TransactionEvent::ExpenseRecorded(_) | TransactionEvent::IncomeRecorded(_) => {}
        }
        Ok(())
    }

    fn set_status(&self, tenant_id: TenantId, transaction_id: TransactionId, status: TransactionStatus) {
        if let Some(mut record) = self.store.get(tenant_id, &transaction_id) {
            record.status = status;
            self.store.upsert(tenant_id, transaction_id, record);
        }
    }

    pub fn get(&self, tenant_id: TenantId, transaction_id: &TransactionId) -> Option<TransactionRecord> {
        self.store.get(tenant_id, transaction_id)
    }

    /// Matching transactions, newest first.
    pub fn list(&self, tenant_id: TenantId, filter: TransactionFilter) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
