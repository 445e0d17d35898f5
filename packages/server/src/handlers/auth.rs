use axum::{
    Json,
    extract::{Query, State},
};
use sea_orm::*;
use tracing::instrument;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{
    CheckQuery, CheckResponse, LoginRequest, LoginResponse, MeResponse, validate_login_request,
};
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Handle user login.
#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in with username and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Bad credentials or inactive account (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let username = payload.username.trim();

    let user = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let is_valid = hash::verify_password(&payload.password, &user.password)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;

    if !is_valid || !user.is_active {
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt::sign(
        user.id,
        &user.username,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    Ok(Json(LoginResponse {
        token,
        username: user.username,
        role: user.role,
    }))
}

/// Return the current authenticated user's info.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current user with effective capabilities",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(auth_user), fields(user_id = auth_user.user_id()))]
pub async fn me(auth_user: AuthUser) -> Json<MeResponse> {
    let capabilities = auth_user.access.effective_capabilities();
    let user = auth_user.user;
    Json(MeResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        role_id: user.role_id,
        is_staff: user.is_staff,
        is_superuser: user.is_superuser,
        capabilities,
    })
}

/// Evaluate capability and/or module checks for the current user.
#[utoipa::path(
    get,
    path = "/me/check",
    tag = "Auth",
    operation_id = "checkMyAccess",
    summary = "Test whether the current user holds a capability",
    params(CheckQuery),
    responses(
        (status = 200, description = "Check evaluated", body = CheckResponse),
        (status = 400, description = "Neither capability nor module given (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(auth_user, query), fields(user_id = auth_user.user_id()))]
pub async fn check(
    auth_user: AuthUser,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    if query.capability.is_none() && query.module.is_none() {
        return Err(AppError::Validation(
            "Provide `capability` and/or `module`".into(),
        ));
    }

    let capability_ok = query
        .capability
        .as_deref()
        .is_none_or(|c| auth_user.access.has_capability(c));
    let module_ok = query
        .module
        .as_deref()
        .is_none_or(|m| auth_user.access.has_module_access(m));

    Ok(Json(CheckResponse {
        capability: query.capability,
        module: query.module,
        allowed: capability_ok && module_ok,
    }))
}
