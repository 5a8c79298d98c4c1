//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to the bus
//! ```
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use sitebook_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use sitebook_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    /// The command collides with existing state (duplicate record, already registered).
    #[error("{0}")]
    Conflict(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Historical payloads no longer deserialize into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned, but the events stay committed.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` builds the empty aggregate that history is replayed
    /// onto. Returns the committed events with their sequence numbers.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: sitebook_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (tenant-scoped)
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            events = committed.len(),
            "command committed"
        );

        // 5) Publish
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Like [`dispatch`](Self::dispatch), but reloads and retries when another
    /// writer advanced the stream first.
    ///
    /// For hot streams that many requests write to, such as a tenant's payroll
    /// ledger. The command is re-decided against fresh state on each attempt.
    pub fn dispatch_with_retry<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
        attempts: usize,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Command: Clone,
        A::Event: sitebook_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 1;
        loop {
            match self.dispatch(tenant_id, aggregate_id, aggregate_type, command.clone(), &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) if attempt < attempts => {
                    warn!(%aggregate_type, %aggregate_id, attempt, %msg, "retrying after concurrent append");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another tenant's history into this aggregate.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use sitebook_core::{Money, UserId};
    use sitebook_events::InMemoryEventBus;
    use sitebook_projects::ProjectId;
    use sitebook_workforce::WorkerId;
    use sitebook_ledger::{
        PayrollCommand, PayrollLedger, PayrollLedgerId, ProjectTransaction, RecordAdvance, RecordExpense,
        TransactionCommand, TransactionId, WageAccrual, AccrueCycleWages,
    };

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn expense(tenant_id: TenantId, transaction_id: TransactionId, amount: i64) -> TransactionCommand {
        TransactionCommand::RecordExpense(RecordExpense {
            tenant_id,
            transaction_id,
            project_id: ProjectId::new(AggregateId::new()),
            amount: Money::new(amount),
            category: "Cement".to_string(),
            description: "40 bags".to_string(),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_and_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let id = TransactionId::new(AggregateId::new());

        let committed = d
            .dispatch(tenant, id.0, "ledger.transaction", expense(tenant, id, 500), |_, _| {
                ProjectTransaction::empty(id)
            })
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "ledger.transaction.expense_recorded");

        let published = sub.try_recv().unwrap();
        assert_eq!(published.aggregate_id(), id.0);
        assert_eq!(d.store().load_stream(tenant, id.0).unwrap().len(), 1);
    }

    #[test]
    fn domain_errors_map_to_dispatch_errors_and_nothing_is_stored() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = TransactionId::new(AggregateId::new());

        let err = d
            .dispatch(tenant, id.0, "ledger.transaction", expense(tenant, id, 0), |_, _| {
                ProjectTransaction::empty(id)
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(d.store().load_stream(tenant, id.0).unwrap().is_empty());
    }

    #[test]
    fn history_is_replayed_before_handling() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let ledger_id = PayrollLedgerId::for_tenant(tenant);
        let worker_id = WorkerId::new(AggregateId::new());
        let user = UserId::new();

        d.dispatch(
            tenant,
            ledger_id.0,
            "ledger.payroll",
            PayrollCommand::AccrueCycleWages(AccrueCycleWages {
                tenant_id: tenant,
                ledger_id,
                accruals: vec![WageAccrual {
                    worker_id,
                    worker_name: "Ravi".to_string(),
                    amount: Money::new(1_000),
                }],
                accrued_by: user,
                occurred_at: Utc::now(),
            }),
            |_, _| PayrollLedger::empty(ledger_id),
        )
        .unwrap();

        let committed = d
            .dispatch_with_retry(
                tenant,
                ledger_id.0,
                "ledger.payroll",
                PayrollCommand::RecordAdvance(RecordAdvance {
                    tenant_id: tenant,
                    ledger_id,
                    transaction_id: TransactionId::new(AggregateId::new()),
                    worker_id,
                    worker_name: "Ravi".to_string(),
                    project_id: None,
                    amount: Money::new(300),
                    description: None,
                    recorded_by: user,
                    occurred_at: Utc::now(),
                }),
                |_, _| PayrollLedger::empty(ledger_id),
                3,
            )
            .unwrap();

        assert_eq!(committed[0].sequence_number, 2);
        assert_eq!(committed[0].payload["AdvancePaid"]["balance_after"], 700);
    }

    #[test]
    fn duplicate_registration_is_a_conflict() {
        let err: DispatchError = DomainError::conflict("duplicate record").into();
        assert!(matches!(err, DispatchError::Conflict(_)));
        let err: DispatchError = EventStoreError::Concurrency("stale".into()).into();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }
}
