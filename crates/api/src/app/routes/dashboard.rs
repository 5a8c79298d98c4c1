use std::sync::Arc;

use axum::extract::Extension;
use serde::Serialize;

use sitebook_auth::Permission;
use sitebook_core::Money;
use sitebook_infra::projections::{ProjectReadModel, TransactionFilter};
use sitebook_ledger::{TransactionKind, TransactionStatus};
use sitebook_projects::ProjectStatus;

use crate::app::errors::ApiResult;
use crate::app::routes::common::{self, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Debug, Default, Serialize)]
struct ProjectTotals {
    project_count: usize,
    active_projects: usize,
    completed_projects: usize,
    total_budget: Money,
    total_utilised: Money,
    total_received: Money,
    pending_expenses: Money,
    pending_approvals: usize,
}

/// Payroll figures are only shown to admins.
#[derive(Debug, Serialize)]
struct PayrollTotals {
    worker_count: usize,
    total_outstanding: Money,
}

#[derive(Debug, Serialize)]
struct DashboardView {
    #[serde(flatten)]
    projects: ProjectTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    payroll: Option<PayrollTotals>,
}

fn project_totals(projects: &[ProjectReadModel], pending_approvals: usize) -> ProjectTotals {
    let mut totals = ProjectTotals {
        project_count: projects.len(),
        pending_approvals,
        ..ProjectTotals::default()
    };
    for project in projects {
        match project.status {
            ProjectStatus::Active => totals.active_projects += 1,
            ProjectStatus::Completed => totals.completed_projects += 1,
            ProjectStatus::Planning | ProjectStatus::OnHold => {}
        }
        totals.total_budget = totals.total_budget.saturating_add(project.budget_limit);
        totals.total_utilised = totals.total_utilised.saturating_add(project.financials.utilised_budget);
        totals.total_received = totals.total_received.saturating_add(project.financials.received_amount);
        totals.pending_expenses = totals.pending_expenses.saturating_add(project.financials.pending_expenses);
    }
    totals
}

/// GET /dashboard: company totals for admins, assigned projects for managers.
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::DASHBOARD_READ)?;
    let tenant_id = tenant.tenant_id();

    let projects = if principal.is_admin() {
        services.projections.projects.list(tenant_id)
    } else {
        services.projections.projects.list_for_manager(tenant_id, principal.user_id())
    };
    let pending = TransactionFilter {
        kind: Some(TransactionKind::Expense),
        status: Some(TransactionStatus::Unapproved),
        ..TransactionFilter::default()
    };
    let pending_approvals = services
        .projections
        .transactions
        .list(tenant_id, pending)
        .iter()
        .filter(|r| r.project_id.is_some_and(|p| projects.iter().any(|m| m.project_id == p)))
        .count();

    let payroll = principal.is_admin().then(|| PayrollTotals {
        worker_count: services.projections.workers.list(tenant_id).len(),
        total_outstanding: services.projections.payroll.total_outstanding(tenant_id),
    });

    Ok(common::ok(DashboardView {
        projects: project_totals(&projects, pending_approvals),
        payroll,
    }))
}
