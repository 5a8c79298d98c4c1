use std::sync::Arc;

use axum::{
    extract::Extension,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use sitebook_auth::Permission;
use sitebook_core::TenantId;
use sitebook_infra::projections::PAYROLL_AGGREGATE;
use sitebook_ledger::{
    AccrueCycleWages, PayrollCommand, PayrollLedger, PayrollLedgerId, RunMonthlySalaries, SalaryRosterEntry,
    WageAccrual,
};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/accrue", post(accrue_wages))
        .route("/salaries", post(run_salaries))
        .route("/salary-payouts", get(list_salary_payouts))
}

/// Every balance change goes through the tenant's single payroll stream.
pub(crate) fn dispatch_payroll(
    services: &AppServices,
    tenant_id: TenantId,
    cmd: PayrollCommand,
) -> Result<(), Response> {
    let ledger_id = PayrollLedgerId::for_tenant(tenant_id);
    services
        .dispatch_with_retry::<PayrollLedger>(tenant_id, ledger_id.0, PAYROLL_AGGREGATE, cmd, |_, _| {
            PayrollLedger::empty(ledger_id)
        })
        .map_err(errors::dispatch_error_to_response)?;
    Ok(())
}

/// POST /payroll/accrue: credit each worker with one base rate.
pub async fn accrue_wages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Option<Json<dto::AccrueRequest>>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let workers = match body.worker_ids {
        Some(ids) => {
            let mut workers = Vec::with_capacity(ids.len());
            for raw in ids {
                let worker_id = common::worker_id(&raw)?;
                let worker = services
                    .projections
                    .workers
                    .get(tenant_id, &worker_id)
                    .ok_or_else(|| errors::not_found("worker"))?;
                workers.push(worker);
            }
            workers
        }
        None => services.projections.workers.list(tenant_id),
    };
    if workers.is_empty() {
        return Err(errors::validation("no workers to accrue wages for"));
    }

    let accruals: Vec<WageAccrual> = workers
        .iter()
        .map(|w| WageAccrual {
            worker_id: w.worker_id,
            worker_name: w.name.clone(),
            amount: w.base_rate,
        })
        .collect();
    let cmd = PayrollCommand::AccrueCycleWages(AccrueCycleWages {
        tenant_id,
        ledger_id: PayrollLedgerId::for_tenant(tenant_id),
        accruals,
        accrued_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PAYROLL_MANAGE)?;
    dispatch_payroll(&services, tenant_id, cmd)?;

    let views: Vec<_> = workers
        .iter()
        .filter_map(|w| services.projections.worker(tenant_id, &w.worker_id))
        .collect();
    Ok(common::items(views))
}

/// POST /payroll/salaries: pay out every monthly worker who is owed money.
pub async fn run_salaries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_MANAGE)?;
    let tenant_id = tenant.tenant_id();

    let roster = services
        .projections
        .workers
        .list(tenant_id)
        .into_iter()
        .map(|w| SalaryRosterEntry {
            worker_id: w.worker_id,
            worker_name: w.name,
            payment_type: w.payment_type,
        })
        .collect();
    let payout_id = Uuid::now_v7();
    let cmd = PayrollCommand::RunMonthlySalaries(RunMonthlySalaries {
        tenant_id,
        ledger_id: PayrollLedgerId::for_tenant(tenant_id),
        payout_id,
        roster,
        paid_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PAYROLL_MANAGE)?;
    dispatch_payroll(&services, tenant_id, cmd)?;

    services
        .projections
        .payroll
        .salary_payouts(tenant_id)
        .into_iter()
        .find(|p| p.id == payout_id)
        .map(common::created)
        .ok_or_else(|| errors::not_found("salary payout"))
}

pub async fn list_salary_payouts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PAYROLL_READ)?;
    Ok(common::items(services.projections.payroll.salary_payouts(tenant.tenant_id())))
}
