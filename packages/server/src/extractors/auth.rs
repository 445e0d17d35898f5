use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::EntityTrait;

use crate::entity::user;
use crate::error::AppError;
use crate::rbac::AccessContext;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated user extracted from the `Authorization: Bearer <token>` header.
///
/// Add this as a handler parameter to require authentication. The user row
/// and its grants are loaded fresh for every request; capability checks
/// happen via `require_capability()` in the handler body.
pub struct AuthUser {
    pub user: user::Model,
    pub access: AccessContext,
}

impl AuthUser {
    pub fn user_id(&self) -> i32 {
        self.user.id
    }

    /// Returns `Ok(())` if the user holds `capability`, `Err(PermissionDenied)` otherwise.
    pub fn require_capability(&self, capability: &str) -> Result<(), AppError> {
        if self.access.has_capability(capability) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    /// Returns `Ok(())` if the user holds any capability in `module`.
    pub fn require_module_access(&self, module: &str) -> Result<(), AppError> {
        if self.access.has_module_access(module) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    /// Returns `Ok(())` if the user's role is one of `roles`.
    pub fn require_role(&self, roles: &[&str]) -> Result<(), AppError> {
        if self.user.is_active && roles.contains(&self.user.role.as_str()) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    /// Staff may act on anyone; other users only on themselves.
    pub fn require_self_or_staff(&self, user_id: i32) -> Result<(), AppError> {
        if self.user.id == user_id || self.user.is_staff || self.user.is_superuser {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims =
            jwt::verify(token, &state.config.auth.jwt_secret).map_err(|_| AppError::TokenInvalid)?;

        let user = user::Entity::find_by_id(claims.uid)
            .one(&state.db)
            .await?
            .ok_or(AppError::TokenInvalid)?;

        if !user.is_active {
            return Err(AppError::TokenInvalid);
        }

        let access = AccessContext::load(&state.db, &user).await?;

        Ok(AuthUser { user, access })
    }
}
