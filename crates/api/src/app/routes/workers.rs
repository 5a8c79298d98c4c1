use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use sitebook_auth::Permission;
use sitebook_core::{AggregateId, Money, TenantId};
use sitebook_infra::projections::{PayrollEntry, WorkerView, WORKER_AGGREGATE};
use sitebook_ledger::{PayrollCommand, PayrollLedgerId, RecordAdvance, SettlePayment, TransactionId};
use sitebook_workforce::{RegisterWorker, RemoveWorker, UpdateWorkerProfile, Worker, WorkerCommand, WorkerId};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, require};
use crate::app::routes::payroll::dispatch_payroll;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_worker).get(list_workers))
        .route("/:id", get(get_worker).put(update_worker).delete(remove_worker))
        .route("/:id/payroll", get(get_payroll))
        .route("/:id/attendance", get(get_attendance))
        .route("/:id/advance", post(record_advance))
        .route("/:id/settle", post(settle_payment))
}

#[derive(Debug, Serialize)]
struct PayrollView {
    worker_id: WorkerId,
    worker_name: String,
    balance: Money,
    entries: Vec<PayrollEntry>,
}

fn dispatch_worker(
    services: &AppServices,
    tenant_id: TenantId,
    worker_id: WorkerId,
    cmd: WorkerCommand,
) -> Result<(), Response> {
    services
        .dispatch::<Worker>(tenant_id, worker_id.0, WORKER_AGGREGATE, cmd, |_, _| Worker::empty(worker_id))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(())
}

fn load_worker(services: &AppServices, tenant_id: TenantId, worker_id: WorkerId) -> Result<WorkerView, Response> {
    services
        .projections
        .worker(tenant_id, &worker_id)
        .ok_or_else(|| errors::not_found("worker"))
}

pub async fn register_worker(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::WorkerRequest>,
) -> ApiResult {
    let worker_id = WorkerId::new(AggregateId::new());
    let cmd = WorkerCommand::Register(RegisterWorker {
        tenant_id: tenant.tenant_id(),
        worker_id,
        name: body.name,
        skill: body.skill,
        phone: body.phone,
        payment_type: body.payment_type,
        base_rate: body.base_rate,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::WORKERS_MANAGE)?;

    dispatch_worker(&services, tenant.tenant_id(), worker_id, cmd)?;
    Ok(common::created(load_worker(&services, tenant.tenant_id(), worker_id)?))
}

pub async fn list_workers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WORKERS_READ)?;
    Ok(common::items(services.projections.list_workers(tenant.tenant_id())))
}

pub async fn get_worker(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WORKERS_READ)?;
    let worker_id = common::worker_id(&id)?;
    load_worker(&services, tenant.tenant_id(), worker_id).map(common::ok)
}

pub async fn update_worker(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::WorkerRequest>,
) -> ApiResult {
    let worker_id = common::worker_id(&id)?;
    let cmd = WorkerCommand::UpdateProfile(UpdateWorkerProfile {
        tenant_id: tenant.tenant_id(),
        worker_id,
        name: body.name,
        skill: body.skill,
        phone: body.phone,
        payment_type: body.payment_type,
        base_rate: body.base_rate,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::WORKERS_MANAGE)?;

    dispatch_worker(&services, tenant.tenant_id(), worker_id, cmd)?;
    load_worker(&services, tenant.tenant_id(), worker_id).map(common::ok)
}

/// DELETE /workers/:id: refused while the worker is owed money or owes it.
pub async fn remove_worker(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WORKERS_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let worker_id = common::worker_id(&id)?;

    // The balance is read under the write gate so a concurrent accrual or
    // advance cannot slip in between the check and the removal.
    services
        .dispatch_with::<Worker>(
            tenant_id,
            worker_id.0,
            WORKER_AGGREGATE,
            |projections| {
                WorkerCommand::Remove(RemoveWorker {
                    tenant_id,
                    worker_id,
                    outstanding_balance: projections.payroll.balance(tenant_id, &worker_id),
                    occurred_at: Utc::now(),
                })
            },
            |_, _| Worker::empty(worker_id),
        )
        .map_err(errors::dispatch_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn get_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_READ)?;
    let worker_id = common::worker_id(&id)?;
    let worker = load_worker(&services, tenant.tenant_id(), worker_id)?;

    let entries = services
        .projections
        .payroll
        .worker(tenant.tenant_id(), &worker_id)
        .map(|p| p.entries)
        .unwrap_or_default();
    Ok(common::ok(PayrollView {
        worker_id,
        worker_name: worker.profile.name,
        balance: worker.current_balance,
        entries,
    }))
}

pub async fn get_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_READ)?;
    let worker_id = common::worker_id(&id)?;
    load_worker(&services, tenant.tenant_id(), worker_id)?;
    Ok(common::items(services.projections.attendance.for_worker(tenant.tenant_id(), worker_id)))
}

/// POST /workers/:id/advance: pay money ahead of wages. The balance may go
/// negative.
pub async fn record_advance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdvanceRequest>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let worker_id = common::worker_id(&id)?;
    let worker = load_worker(&services, tenant_id, worker_id)?;

    let project_id = body.project_id.as_deref().map(common::project_id).transpose()?;
    if let Some(project_id) = project_id {
        if services.projections.projects.get(tenant_id, &project_id).is_none() {
            return Err(errors::not_found("project"));
        }
    }

    let cmd = PayrollCommand::RecordAdvance(RecordAdvance {
        tenant_id,
        ledger_id: PayrollLedgerId::for_tenant(tenant_id),
        transaction_id: TransactionId::new(AggregateId::new()),
        worker_id,
        worker_name: worker.profile.name,
        project_id,
        amount: body.amount,
        description: body.description,
        recorded_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PAYROLL_MANAGE)?;
    dispatch_payroll(&services, tenant_id, cmd)?;

    load_worker(&services, tenant_id, worker_id).map(common::created)
}

/// POST /workers/:id/settle: pay off part or all of what the worker is owed.
pub async fn settle_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SettleRequest>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let worker_id = common::worker_id(&id)?;
    let worker = load_worker(&services, tenant_id, worker_id)?;

    let cmd = PayrollCommand::SettlePayment(SettlePayment {
        tenant_id,
        ledger_id: PayrollLedgerId::for_tenant(tenant_id),
        transaction_id: TransactionId::new(AggregateId::new()),
        worker_id,
        worker_name: worker.profile.name,
        amount: body.amount,
        description: body.description,
        settled_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PAYROLL_MANAGE)?;
    dispatch_payroll(&services, tenant_id, cmd)?;

    load_worker(&services, tenant_id, worker_id).map(common::created)
}
