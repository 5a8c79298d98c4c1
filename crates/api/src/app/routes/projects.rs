use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use sitebook_ai::{BudgetInsightsInput, BudgetTransaction, BudgetTransactionKind};
use sitebook_auth::Permission;
use sitebook_core::{AggregateId, Money, TenantId, UserId};
use sitebook_infra::projections::{
    ProjectReadModel, TaskFilter, TransactionFilter, ATTENDANCE_AGGREGATE, PROJECT_AGGREGATE,
    TRANSACTION_AGGREGATE,
};
use sitebook_ledger::{
    ProjectTransaction, RecordExpense, RecordIncome, TransactionCommand, TransactionId, TransactionKind,
    TransactionRecord, TransactionStatus,
};
use sitebook_projects::{
    AssignProjectManager, ChangeProjectStatus, CreateProject, Project, ProjectCommand, ProjectId,
    UpdateProjectDetails,
};
use sitebook_workforce::{AttendanceCommand, AttendanceEntry, AttendanceSheet, AttendanceSheetId, RecordAttendance};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, project_in_scope, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_project).get(list_projects))
        .route("/:id", get(get_project).put(update_project))
        .route("/:id/status", post(change_status))
        .route("/:id/manager", post(assign_manager))
        .route("/:id/financials", get(get_financials))
        .route("/:id/expenses", post(record_expense))
        .route("/:id/income", post(record_income))
        .route("/:id/transactions", get(list_project_transactions))
        .route("/:id/attendance", post(record_attendance).get(list_attendance))
        .route("/:id/tasks", get(list_project_tasks))
        .route("/:id/insights", post(request_insights))
}

#[derive(Debug, Serialize)]
struct FinancialsView {
    project_id: ProjectId,
    budget_limit: Money,
    utilised_budget: Money,
    received_amount: Money,
    pending_expenses: Money,
    remaining_budget: Money,
    utilisation_percent: i64,
}

impl From<&ProjectReadModel> for FinancialsView {
    fn from(project: &ProjectReadModel) -> Self {
        Self {
            project_id: project.project_id,
            budget_limit: project.budget_limit,
            utilised_budget: project.financials.utilised_budget,
            received_amount: project.financials.received_amount,
            pending_expenses: project.financials.pending_expenses,
            remaining_budget: project.remaining_budget(),
            utilisation_percent: project.utilisation_percent(),
        }
    }
}

fn dispatch_project(
    services: &AppServices,
    tenant_id: TenantId,
    project_id: ProjectId,
    cmd: ProjectCommand,
) -> Result<ProjectReadModel, Response> {
    services
        .dispatch::<Project>(tenant_id, project_id.0, PROJECT_AGGREGATE, cmd, |_, _| Project::empty(project_id))
        .map_err(errors::dispatch_error_to_response)?;
    services
        .projections
        .projects
        .get(tenant_id, &project_id)
        .ok_or_else(|| errors::not_found("project"))
}

/// Projects are run by managers; the assignee must be a registered manager.
fn manager_user(services: &AppServices, tenant_id: TenantId, raw: &str) -> Result<UserId, Response> {
    let manager_id = errors::parse_id::<UserId>(raw)?;
    match services.projections.users.get(tenant_id, &manager_id) {
        Some(user) if user.role.is_manager() => Ok(manager_id),
        Some(_) => Err(errors::validation("assigned user is not a manager")),
        None => Err(errors::validation("assigned manager is not a registered user")),
    }
}

pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProjectRequest>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PROJECTS_MANAGE)?;
    let manager_id = manager_user(&services, tenant.tenant_id(), &body.manager_id)?;

    let project_id = ProjectId::new(AggregateId::new());
    let cmd = ProjectCommand::Create(CreateProject {
        tenant_id: tenant.tenant_id(),
        project_id,
        name: body.name,
        location: body.location,
        budget_limit: body.budget_limit,
        order_value: body.order_value,
        manager_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PROJECTS_MANAGE)?;

    let project = dispatch_project(&services, tenant.tenant_id(), project_id, cmd)?;
    Ok(common::created(project))
}

/// Admins see every project; managers see the ones assigned to them.
pub async fn list_projects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PROJECTS_READ)?;
    let projects = if principal.is_admin() {
        services.projections.projects.list(tenant.tenant_id())
    } else {
        services
            .projections
            .projects
            .list_for_manager(tenant.tenant_id(), principal.user_id())
    };
    Ok(common::items(projects))
}

pub async fn get_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PROJECTS_READ)?;
    let project_id = common::project_id(&id)?;
    project_in_scope(&services, &tenant, &principal, project_id).map(common::ok)
}

pub async fn update_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProjectRequest>,
) -> ApiResult {
    let project_id = common::project_id(&id)?;
    let cmd = ProjectCommand::UpdateDetails(UpdateProjectDetails {
        tenant_id: tenant.tenant_id(),
        project_id,
        name: body.name,
        location: body.location,
        budget_limit: body.budget_limit,
        order_value: body.order_value,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PROJECTS_MANAGE)?;

    dispatch_project(&services, tenant.tenant_id(), project_id, cmd).map(common::ok)
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeProjectStatusRequest>,
) -> ApiResult {
    let project_id = common::project_id(&id)?;
    let cmd = ProjectCommand::ChangeStatus(ChangeProjectStatus {
        tenant_id: tenant.tenant_id(),
        project_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PROJECTS_MANAGE)?;

    dispatch_project(&services, tenant.tenant_id(), project_id, cmd).map(common::ok)
}

pub async fn assign_manager(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignManagerRequest>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PROJECTS_MANAGE)?;
    let project_id = common::project_id(&id)?;
    let manager_id = manager_user(&services, tenant.tenant_id(), &body.manager_id)?;

    let cmd = ProjectCommand::AssignManager(AssignProjectManager {
        tenant_id: tenant.tenant_id(),
        project_id,
        manager_id,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::PROJECTS_MANAGE)?;

    dispatch_project(&services, tenant.tenant_id(), project_id, cmd).map(common::ok)
}

pub async fn get_financials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::PROJECTS_READ)?;
    let project_id = common::project_id(&id)?;
    let project = project_in_scope(&services, &tenant, &principal, project_id)?;
    Ok(common::ok(FinancialsView::from(&project)))
}

fn dispatch_transaction(
    services: &AppServices,
    tenant_id: TenantId,
    transaction_id: TransactionId,
    cmd: TransactionCommand,
) -> Result<TransactionRecord, Response> {
    services
        .dispatch::<ProjectTransaction>(tenant_id, transaction_id.0, TRANSACTION_AGGREGATE, cmd, |_, _| {
            ProjectTransaction::empty(transaction_id)
        })
        .map_err(errors::dispatch_error_to_response)?;
    services
        .projections
        .transactions
        .get(tenant_id, &transaction_id)
        .ok_or_else(|| errors::not_found("transaction"))
}

/// POST /projects/:id/expenses: recorded as unapproved until an admin
/// moderates it.
pub async fn record_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordExpenseRequest>,
) -> ApiResult {
    let project_id = common::project_id(&id)?;
    let transaction_id = TransactionId::new(AggregateId::new());
    let cmd = TransactionCommand::RecordExpense(RecordExpense {
        tenant_id: tenant.tenant_id(),
        transaction_id,
        project_id,
        amount: body.amount,
        category: body.category,
        description: body.description,
        created_by: principal.user_id(),
        occurred_at: body.timestamp.unwrap_or_else(Utc::now),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::EXPENSE_RECORD)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    let record = dispatch_transaction(&services, tenant.tenant_id(), transaction_id, cmd)?;
    Ok(common::created(record))
}

pub async fn record_income(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordIncomeRequest>,
) -> ApiResult {
    let project_id = common::project_id(&id)?;
    let transaction_id = TransactionId::new(AggregateId::new());
    let cmd = TransactionCommand::RecordIncome(RecordIncome {
        tenant_id: tenant.tenant_id(),
        transaction_id,
        project_id,
        amount: body.amount,
        category: body.category,
        description: body.description,
        created_by: principal.user_id(),
        occurred_at: body.timestamp.unwrap_or_else(Utc::now),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::INCOME_RECORD)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    let record = dispatch_transaction(&services, tenant.tenant_id(), transaction_id, cmd)?;
    Ok(common::created(record))
}

pub async fn list_project_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::TransactionQuery>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TRANSACTIONS_READ)?;
    let project_id = common::project_id(&id)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    let filter = TransactionFilter {
        kind: query.kind,
        status: query.status,
        project_id: Some(project_id),
        worker_id: None,
    };
    Ok(common::items(services.projections.transactions.list(tenant.tenant_id(), filter)))
}

/// POST /projects/:id/attendance: one sheet per project and day.
pub async fn record_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordAttendanceRequest>,
) -> ApiResult {
    require(&tenant, &principal, Permission::ATTENDANCE_RECORD)?;
    let project_id = common::project_id(&id)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    let mut entries = Vec::with_capacity(body.entries.len());
    for entry in body.entries {
        let worker_id = common::worker_id(&entry.worker_id)?;
        let worker = services
            .projections
            .workers
            .get(tenant.tenant_id(), &worker_id)
            .ok_or_else(|| errors::validation(format!("worker {worker_id} is not on the roster")))?;
        entries.push(AttendanceEntry {
            worker_id,
            worker_name: worker.name,
            status: entry.status,
            units_worked: entry.units_worked,
        });
    }

    let sheet_id = AttendanceSheetId::for_project_day(project_id, body.date);
    let cmd = AttendanceCommand::Record(RecordAttendance {
        tenant_id: tenant.tenant_id(),
        sheet_id,
        project_id,
        date: body.date,
        entries,
        recorded_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::ATTENDANCE_RECORD)?;

    services
        .dispatch::<AttendanceSheet>(tenant.tenant_id(), sheet_id.0, ATTENDANCE_AGGREGATE, cmd, |_, _| {
            AttendanceSheet::empty(sheet_id)
        })
        .map_err(errors::dispatch_error_to_response)?;

    let day = services
        .projections
        .attendance
        .for_project(tenant.tenant_id(), project_id)
        .into_iter()
        .find(|d| d.date == body.date)
        .ok_or_else(|| errors::not_found("attendance sheet"))?;
    Ok(common::created(day))
}

pub async fn list_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::ATTENDANCE_READ)?;
    let project_id = common::project_id(&id)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;
    Ok(common::items(services.projections.attendance.for_project(tenant.tenant_id(), project_id)))
}

pub async fn list_project_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TASKS_READ)?;
    let project_id = common::project_id(&id)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    let filter = TaskFilter {
        project_id: Some(project_id),
        status: None,
    };
    Ok(common::items(services.projections.tasks.list(tenant.tenant_id(), filter)))
}

/// POST /projects/:id/insights: short budget narrative for the project.
pub async fn request_insights(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::INSIGHTS_REQUEST)?;
    let project_id = common::project_id(&id)?;
    let project = project_in_scope(&services, &tenant, &principal, project_id)?;

    let filter = TransactionFilter {
        project_id: Some(project_id),
        ..TransactionFilter::default()
    };
    let transactions = services
        .projections
        .transactions
        .list(tenant.tenant_id(), filter)
        .iter()
        .filter_map(budget_transaction)
        .collect();

    let input = BudgetInsightsInput {
        project_id: project_id.to_string(),
        project_name: Some(project.name.clone()),
        budget_limit: project.budget_limit,
        transactions,
    };
    let report = services
        .insights
        .summarize(tenant.tenant_id(), input)
        .await
        .map_err(errors::ai_error_to_response)?;
    Ok(common::ok(report))
}

/// Rejected expenses never reach the model; unapproved ones are flagged
/// as pending.
fn budget_transaction(record: &TransactionRecord) -> Option<BudgetTransaction> {
    if record.status == TransactionStatus::Rejected {
        return None;
    }
    let kind = match record.kind {
        TransactionKind::Expense => BudgetTransactionKind::Expense,
        TransactionKind::Income => BudgetTransactionKind::Income,
        TransactionKind::PayoutAdvance => BudgetTransactionKind::PayoutAdvance,
        TransactionKind::PayoutSettlement => BudgetTransactionKind::PayoutSettlement,
        TransactionKind::SalarySettlement => BudgetTransactionKind::SalarySettlement,
    };
    Some(BudgetTransaction {
        id: record.id.to_string(),
        kind,
        amount: record.amount,
        category: record.category.clone(),
        timestamp: record.timestamp,
        pending: record.status == TransactionStatus::Unapproved,
    })
}
