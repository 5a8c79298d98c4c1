//! Projection implementations (read model builders).
//!
//! Projections consume committed event envelopes and build query-optimized
//! read models. All projections are:
//! - **Rebuildable**: can be reconstructed from the full event log
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: a redelivered envelope is skipped by its stream cursor

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use sitebook_core::TenantId;
use sitebook_events::EventEnvelope;

pub mod attendance;
pub mod cursor;
pub mod hub;
pub mod payroll;
pub mod projects;
pub mod tasks;
pub mod transactions;
pub mod users;
pub mod workers;

pub use attendance::{AttendanceDay, AttendanceProjection, AttendanceRow, AttendanceSheetReadModel};
pub use cursor::StreamCursors;
pub use hub::{Projections, WorkerView};
pub use payroll::{
    PaidWorker, PayrollEntry, PayrollEntryKind, PayrollProjection, SalaryPayoutReadModel, WorkerPayroll,
};
pub use projects::{ProjectFinancials, ProjectReadModel, ProjectsProjection};
pub use tasks::{TaskFilter, TaskReadModel, TasksProjection};
pub use transactions::{TransactionFilter, TransactionsProjection};
pub use users::{UserReadModel, UsersProjection};
pub use workers::{WorkerReadModel, WorkersProjection};

pub const USER_AGGREGATE: &str = "auth.user";
pub const PROJECT_AGGREGATE: &str = "projects.project";
pub const TASK_AGGREGATE: &str = "projects.task";
pub const WORKER_AGGREGATE: &str = "workforce.worker";
pub const ATTENDANCE_AGGREGATE: &str = "workforce.attendance";
pub const TRANSACTION_AGGREGATE: &str = "ledger.transaction";
pub const PAYROLL_AGGREGATE: &str = "ledger.payroll";

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: String, message: String },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn ensure_tenant(envelope: &EventEnvelope<JsonValue>, event_tenant: TenantId) -> Result<(), ProjectionError> {
    if event_tenant != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    Ok(())
}
