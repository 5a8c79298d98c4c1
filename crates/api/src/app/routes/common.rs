use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use sitebook_auth::{CommandAuthorization, Permission};
use sitebook_core::AggregateId;
use sitebook_infra::projections::ProjectReadModel;
use sitebook_ledger::TransactionId;
use sitebook_projects::{ProjectId, TaskId};
use sitebook_workforce::WorkerId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// Associates required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Authorize a command before dispatch and hand it back.
pub fn guard<C>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: C,
    permission: &'static str,
) -> Result<C, Response> {
    let cmd_auth = CmdAuth {
        inner: command,
        required: vec![Permission::new(permission)],
    };
    authz::authorize_command(tenant, principal, &cmd_auth).map_err(errors::authz_error_to_response)?;
    Ok(cmd_auth.inner)
}

pub fn require(tenant: &TenantContext, principal: &PrincipalContext, permission: &'static str) -> Result<(), Response> {
    authz::authorize_permission(tenant, principal, permission).map_err(errors::authz_error_to_response)
}

/// Load a project the caller may work in: 404 when unknown, 403 when a
/// manager is not assigned to it.
pub fn project_in_scope(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    project_id: ProjectId,
) -> Result<ProjectReadModel, Response> {
    let project = services
        .projections
        .projects
        .get(tenant.tenant_id(), &project_id)
        .ok_or_else(|| errors::not_found("project"))?;
    authz::ensure_project_scope(principal, &project).map_err(errors::authz_error_to_response)?;
    Ok(project)
}

pub fn project_id(raw: &str) -> Result<ProjectId, Response> {
    errors::parse_id::<AggregateId>(raw).map(ProjectId::new)
}

pub fn task_id(raw: &str) -> Result<TaskId, Response> {
    errors::parse_id::<AggregateId>(raw).map(TaskId::new)
}

pub fn worker_id(raw: &str) -> Result<WorkerId, Response> {
    errors::parse_id::<AggregateId>(raw).map(WorkerId::new)
}

pub fn transaction_id(raw: &str) -> Result<TransactionId, Response> {
    errors::parse_id::<AggregateId>(raw).map(TransactionId::new)
}

pub fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn items<T: Serialize>(items: Vec<T>) -> Response {
    ok(serde_json::json!({ "items": items }))
}
