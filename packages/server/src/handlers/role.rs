use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sea_orm::*;
use tracing::instrument;

use crate::entity::role;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::role::{
    CapabilityResponse, CreateRoleRequest, RoleResponse, RoleStatisticsResponse, RoleWriteResponse,
    SyncRolesResponse, UpdateRoleCapabilitiesRequest, validate_role_name,
};
use crate::rbac::{BuiltinRole, PermissionEngine, RoleSync, capability};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Roles",
    operation_id = "listRoles",
    summary = "List roles with their capability ids",
    responses(
        (status = 200, description = "All roles", body = Vec<RoleResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_roles(
    _auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleResponse>>, AppError> {
    let engine = PermissionEngine::new(&state.db);
    let roles = role::Entity::find()
        .order_by_asc(role::Column::Name)
        .all(&state.db)
        .await?;

    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        let ids = engine.role_capability_ids(role.id).await?;
        out.push(RoleResponse::new(role, ids));
    }
    Ok(Json(out))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Roles",
    operation_id = "getRole",
    summary = "Get a role",
    params(("id" = i32, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = RoleResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Role not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user), fields(id))]
pub async fn get_role(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<RoleResponse>, AppError> {
    let engine = PermissionEngine::new(&state.db);
    let role = engine
        .find_role(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))?;
    let ids = engine.role_capability_ids(role.id).await?;
    Ok(Json(RoleResponse::new(role, ids)))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Roles",
    operation_id = "createRole",
    summary = "Create a role",
    description = "Creates a role and attaches every user whose role name already matches it. Requires `users.add_role`.",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleWriteResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Name taken (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name))]
pub async fn create_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_capability("users.add_role")?;

    let name = payload.name.trim();
    validate_role_name(name)?;

    let report = RoleSync::new(&state.db)
        .create_role(name, payload.description, &payload.capability_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(RoleWriteResponse::from(report))))
}

#[utoipa::path(
    put,
    path = "/{id}/capabilities",
    tag = "Roles",
    operation_id = "updateRoleCapabilities",
    summary = "Replace a role's capability set",
    description = "Replaces the set and pushes it to every user associated with the role by reference or by name, in one transaction. Requires `users.change_role`.",
    params(("id" = i32, Path, description = "Role ID")),
    request_body = UpdateRoleCapabilitiesRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleWriteResponse),
        (status = 400, description = "Unknown capability id (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Role not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_role_capabilities(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateRoleCapabilitiesRequest>,
) -> Result<Json<RoleWriteResponse>, AppError> {
    auth_user.require_capability("users.change_role")?;

    let report = RoleSync::new(&state.db)
        .update_role_capabilities(id, &payload.capability_ids)
        .await?;

    Ok(Json(RoleWriteResponse::from(report)))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Roles",
    operation_id = "deleteRole",
    summary = "Delete a role",
    description = "Users referencing the role keep their accounts and role name; their reference is cleared. Requires `users.delete_role`.",
    params(("id" = i32, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Role not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    auth_user.require_capability("users.delete_role")?;

    RoleSync::new(&state.db).delete_role(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sync",
    tag = "Roles",
    operation_id = "syncRoles",
    summary = "Recreate built-in roles and reconcile users",
    description = "Admin role only.",
    responses(
        (status = 200, description = "Roles synchronized", body = SyncRolesResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn sync_roles(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SyncRolesResponse>, AppError> {
    auth_user.require_role(&[BuiltinRole::Admin.as_str()])?;

    let sync = RoleSync::new(&state.db);
    let report = sync.sync_roles().await?;
    let statistics = sync.role_statistics().await?;

    let engine = PermissionEngine::new(&state.db);
    let mut roles = Vec::with_capacity(3);
    for role in report.roles.iter() {
        let ids = engine.role_capability_ids(role.id).await?;
        roles.push(RoleResponse::new(role.clone(), ids));
    }

    Ok(Json(SyncRolesResponse {
        roles,
        users_updated: report.users_updated,
        users_total: report.users_total,
        statistics: statistics
            .into_iter()
            .map(|s| RoleStatisticsResponse {
                role: s.role,
                by_reference: s.by_reference,
                by_name: s.by_name,
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Capabilities",
    operation_id = "listCapabilities",
    summary = "List the capability catalogue",
    responses(
        (status = 200, description = "All capabilities", body = Vec<CapabilityResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_capabilities(
    _auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CapabilityResponse>>, AppError> {
    let caps = capability::all(&state.db)
        .await?
        .into_iter()
        .map(CapabilityResponse::from)
        .collect();
    Ok(Json(caps))
}
