use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use sitebook_auth::Permission;
use sitebook_core::TenantId;
use sitebook_infra::projections::{TransactionFilter, TRANSACTION_AGGREGATE};
use sitebook_ledger::{
    ApproveExpense, DeleteTransaction, ProjectTransaction, RejectExpense, TransactionCommand, TransactionId,
    TransactionRecord,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, project_in_scope, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/:id", get(get_transaction).delete(delete_transaction))
        .route("/:id/approve", post(approve_expense))
        .route("/:id/reject", post(reject_expense))
}

fn load_record(
    services: &AppServices,
    tenant_id: TenantId,
    transaction_id: TransactionId,
) -> Result<TransactionRecord, Response> {
    services
        .projections
        .transactions
        .get(tenant_id, &transaction_id)
        .ok_or_else(|| errors::not_found("transaction"))
}

/// Moderation applies to project expenses and income only.
fn moderatable(services: &AppServices, tenant_id: TenantId, transaction_id: TransactionId) -> Result<(), Response> {
    let record = load_record(services, tenant_id, transaction_id)?;
    if record.kind.is_payroll() {
        return Err(errors::invariant("payroll transactions cannot be moderated"));
    }
    Ok(())
}

fn dispatch_moderation(
    services: &AppServices,
    tenant_id: TenantId,
    transaction_id: TransactionId,
    cmd: TransactionCommand,
) -> Result<(), Response> {
    moderatable(services, tenant_id, transaction_id)?;
    services
        .dispatch::<ProjectTransaction>(tenant_id, transaction_id.0, TRANSACTION_AGGREGATE, cmd, |_, _| {
            ProjectTransaction::empty(transaction_id)
        })
        .map_err(errors::dispatch_error_to_response)?;
    Ok(())
}

/// GET /transactions?type=&status=&project_id=&worker_id=
///
/// Managers only see records of projects assigned to them.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TransactionQuery>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TRANSACTIONS_READ)?;
    let project_id = query.project_id.as_deref().map(common::project_id).transpose()?;
    let worker_id = query.worker_id.as_deref().map(common::worker_id).transpose()?;
    if let Some(project_id) = project_id {
        project_in_scope(&services, &tenant, &principal, project_id)?;
    }

    let filter = TransactionFilter {
        kind: query.kind,
        status: query.status,
        project_id,
        worker_id,
    };
    let mut records = services.projections.transactions.list(tenant.tenant_id(), filter);
    if !principal.is_admin() {
        let assigned: HashSet<_> = services
            .projections
            .users
            .assigned_projects(tenant.tenant_id(), principal.user_id())
            .into_iter()
            .collect();
        records.retain(|r| r.project_id.is_some_and(|p| assigned.contains(&p)));
    }
    Ok(common::items(records))
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TRANSACTIONS_READ)?;
    let transaction_id = common::transaction_id(&id)?;
    let record = load_record(&services, tenant.tenant_id(), transaction_id)?;
    if !principal.is_admin() {
        match record.project_id {
            Some(project_id) => {
                project_in_scope(&services, &tenant, &principal, project_id)?;
            }
            None => return Err(errors::not_found("transaction")),
        }
    }
    Ok(common::ok(record))
}

pub async fn approve_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transaction_id = common::transaction_id(&id)?;
    let cmd = TransactionCommand::Approve(ApproveExpense {
        tenant_id: tenant.tenant_id(),
        transaction_id,
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TRANSACTIONS_MODERATE)?;

    dispatch_moderation(&services, tenant.tenant_id(), transaction_id, cmd)?;
    load_record(&services, tenant.tenant_id(), transaction_id).map(common::ok)
}

pub async fn reject_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transaction_id = common::transaction_id(&id)?;
    let cmd = TransactionCommand::Reject(RejectExpense {
        tenant_id: tenant.tenant_id(),
        transaction_id,
        rejected_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TRANSACTIONS_MODERATE)?;

    dispatch_moderation(&services, tenant.tenant_id(), transaction_id, cmd)?;
    load_record(&services, tenant.tenant_id(), transaction_id).map(common::ok)
}

/// DELETE /transactions/:id: an approved expense stops counting towards
/// the project's utilised budget.
pub async fn delete_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transaction_id = common::transaction_id(&id)?;
    let cmd = TransactionCommand::Delete(DeleteTransaction {
        tenant_id: tenant.tenant_id(),
        transaction_id,
        deleted_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TRANSACTIONS_MODERATE)?;

    dispatch_moderation(&services, tenant.tenant_id(), transaction_id, cmd)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
