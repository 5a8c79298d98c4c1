use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use sitebook_auth::{
    ChangeUserRole, Permission, RegisterUser, Role, UpdateUserProfile, User, UserCommand,
};
use sitebook_core::{AggregateId, TenantId, UserId};
use sitebook_infra::projections::{UserReadModel, USER_AGGREGATE};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{self, guard, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_user).get(list_users))
        .route("/me", get(get_me).post(register_me))
        .route("/:id", get(get_user).put(update_user))
        .route("/:id/role", post(change_role))
}

fn stream_id(user_id: UserId) -> AggregateId {
    AggregateId::from_uuid(*user_id.as_uuid())
}

fn dispatch_user(
    services: &AppServices,
    tenant_id: TenantId,
    user_id: UserId,
    cmd: UserCommand,
) -> Result<(), Response> {
    services
        .dispatch::<User>(tenant_id, stream_id(user_id), USER_AGGREGATE, cmd, |_, _| User::empty(user_id))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(())
}

fn load_user(services: &AppServices, tenant_id: TenantId, user_id: UserId) -> Result<UserReadModel, Response> {
    services
        .projections
        .users
        .get(tenant_id, &user_id)
        .ok_or_else(|| errors::not_found("user"))
}

/// POST /users: an admin adds a user to the directory.
pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterUserRequest>,
) -> ApiResult {
    let user_id = UserId::new();
    let cmd = UserCommand::Register(RegisterUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        name: body.name,
        email: body.email,
        role: body.role,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::USERS_MANAGE)?;
    ensure_email_free(&services, tenant.tenant_id(), &cmd)?;

    dispatch_user(&services, tenant.tenant_id(), user_id, cmd)?;
    Ok(common::created(load_user(&services, tenant.tenant_id(), user_id)?))
}

/// POST /users/me: the caller registers their own profile. The role is the
/// one their token carries.
pub async fn register_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterSelfRequest>,
) -> ApiResult {
    let role = if principal.is_admin() {
        Role::admin()
    } else if principal.roles().iter().any(Role::is_manager) {
        Role::manager()
    } else {
        return Err(errors::authz_error_to_response(sitebook_auth::AuthzError::Forbidden(
            "a known role".to_string(),
        )));
    };

    let user_id = principal.user_id();
    let cmd = UserCommand::Register(RegisterUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        name: body.name,
        email: body.email,
        role,
        occurred_at: Utc::now(),
    });
    ensure_email_free(&services, tenant.tenant_id(), &cmd)?;

    dispatch_user(&services, tenant.tenant_id(), user_id, cmd)?;
    Ok(common::created(load_user(&services, tenant.tenant_id(), user_id)?))
}

pub async fn get_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    load_user(&services, tenant.tenant_id(), principal.user_id()).map(common::ok)
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, Permission::USERS_READ)?;
    Ok(common::items(services.projections.users.list(tenant.tenant_id())))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let user_id = errors::parse_id::<UserId>(&id)?;
    if user_id != principal.user_id() {
        require(&tenant, &principal, Permission::USERS_READ)?;
    }
    load_user(&services, tenant.tenant_id(), user_id).map(common::ok)
}

/// PUT /users/:id: admins edit anyone; everyone else only themselves.
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateUserRequest>,
) -> ApiResult {
    let user_id = errors::parse_id::<UserId>(&id)?;
    let cmd = UserCommand::UpdateProfile(UpdateUserProfile {
        tenant_id: tenant.tenant_id(),
        user_id,
        name: body.name,
        email: body.email,
        occurred_at: Utc::now(),
    });
    let cmd = if user_id == principal.user_id() {
        cmd
    } else {
        guard(&tenant, &principal, cmd, Permission::USERS_MANAGE)?
    };
    ensure_email_free(&services, tenant.tenant_id(), &cmd)?;

    dispatch_user(&services, tenant.tenant_id(), user_id, cmd)?;
    load_user(&services, tenant.tenant_id(), user_id).map(common::ok)
}

pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeRoleRequest>,
) -> ApiResult {
    let user_id = errors::parse_id::<UserId>(&id)?;
    let cmd = UserCommand::ChangeRole(ChangeUserRole {
        tenant_id: tenant.tenant_id(),
        user_id,
        role: body.role,
        occurred_at: Utc::now(),
    });
    let cmd = guard(&tenant, &principal, cmd, Permission::USERS_MANAGE)?;

    dispatch_user(&services, tenant.tenant_id(), user_id, cmd)?;
    load_user(&services, tenant.tenant_id(), user_id).map(common::ok)
}

/// Emails are unique per tenant; the directory read model is the index.
fn ensure_email_free(
    services: &AppServices,
    tenant_id: TenantId,
    cmd: &UserCommand,
) -> Result<(), Response> {
    let (user_id, email) = match cmd {
        UserCommand::Register(c) => (c.user_id, &c.email),
        UserCommand::UpdateProfile(c) => (c.user_id, &c.email),
        UserCommand::ChangeRole(_) => return Ok(()),
    };
    match services.projections.users.get_by_email(tenant_id, email) {
        Some(existing) if existing.user_id != user_id => Err(errors::json_error(
            axum::http::StatusCode::CONFLICT,
            "conflict",
            "email is already registered",
        )),
        _ => Ok(()),
    }
}
