use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use sitebook_auth::Permission;
use sitebook_core::{AggregateId, TenantId};
use sitebook_infra::projections::{TaskFilter, TaskReadModel, TASK_AGGREGATE};
use sitebook_projects::{ChangeTaskStatus, CreateTask, DeleteTask, Task, TaskCommand, TaskId, UpdateTask};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, project_in_scope, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/:id", get(get_task).put(update_task).delete(delete_task))
        .route("/:id/status", post(change_status))
}

fn dispatch_task(services: &AppServices, tenant_id: TenantId, task_id: TaskId, cmd: TaskCommand) -> Result<(), Response> {
    services
        .dispatch::<Task>(tenant_id, task_id.0, TASK_AGGREGATE, cmd, |_, _| Task::empty(task_id))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(())
}

fn load_task(services: &AppServices, tenant_id: TenantId, task_id: TaskId) -> Result<TaskReadModel, Response> {
    services
        .projections
        .tasks
        .get(tenant_id, &task_id)
        .ok_or_else(|| errors::not_found("task"))
}

/// A task the caller may see: its project must be in their scope.
fn task_in_scope(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    task_id: TaskId,
) -> Result<TaskReadModel, Response> {
    let task = load_task(services, tenant.tenant_id(), task_id)?;
    project_in_scope(services, tenant, principal, task.project_id)?;
    Ok(task)
}

pub async fn create_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateTaskRequest>,
) -> ApiResult {
    let project_id = common::project_id(&body.project_id)?;
    let task_id = TaskId::new(AggregateId::new());
    let cmd = TaskCommand::Create(CreateTask {
        tenant_id: tenant.tenant_id(),
        task_id,
        project_id,
        title: body.title,
        description: body.description,
        expected_completion_date: body.expected_completion_date,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TASKS_MANAGE)?;
    project_in_scope(&services, &tenant, &principal, project_id)?;

    dispatch_task(&services, tenant.tenant_id(), task_id, cmd)?;
    Ok(common::created(load_task(&services, tenant.tenant_id(), task_id)?))
}

/// GET /tasks?project_id=&status=
///
/// Managers only see tasks of projects assigned to them.
pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TaskQuery>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TASKS_READ)?;
    let project_id = query.project_id.as_deref().map(common::project_id).transpose()?;
    if let Some(project_id) = project_id {
        project_in_scope(&services, &tenant, &principal, project_id)?;
    }

    let filter = TaskFilter {
        project_id,
        status: query.status,
    };
    let mut tasks = services.projections.tasks.list(tenant.tenant_id(), filter);
    if !principal.is_admin() {
        let assigned: HashSet<_> = services
            .projections
            .users
            .assigned_projects(tenant.tenant_id(), principal.user_id())
            .into_iter()
            .collect();
        tasks.retain(|t| assigned.contains(&t.project_id));
    }
    Ok(common::items(tasks))
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::TASKS_READ)?;
    let task_id = common::task_id(&id)?;
    task_in_scope(&services, &tenant, &principal, task_id).map(common::ok)
}

pub async fn update_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTaskRequest>,
) -> ApiResult {
    let task_id = common::task_id(&id)?;
    let cmd = TaskCommand::Update(UpdateTask {
        tenant_id: tenant.tenant_id(),
        task_id,
        title: body.title,
        description: body.description,
        expected_completion_date: body.expected_completion_date,
        status: body.status,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TASKS_MANAGE)?;

    dispatch_task(&services, tenant.tenant_id(), task_id, cmd)?;
    load_task(&services, tenant.tenant_id(), task_id).map(common::ok)
}

/// POST /tasks/:id/status: the one task edit a manager may make.
pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeTaskStatusRequest>,
) -> ApiResult {
    let task_id = common::task_id(&id)?;
    let cmd = TaskCommand::ChangeStatus(ChangeTaskStatus {
        tenant_id: tenant.tenant_id(),
        task_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TASKS_STATUS)?;
    task_in_scope(&services, &tenant, &principal, task_id)?;

    dispatch_task(&services, tenant.tenant_id(), task_id, cmd)?;
    load_task(&services, tenant.tenant_id(), task_id).map(common::ok)
}

pub async fn delete_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let task_id = common::task_id(&id)?;
    let cmd = TaskCommand::Delete(DeleteTask {
        tenant_id: tenant.tenant_id(),
        task_id,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::TASKS_MANAGE)?;

    dispatch_task(&services, tenant.tenant_id(), task_id, cmd)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
