use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppError;

/// Request body for creating an account.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateUserRequest {
    /// Unique username (1-32 chars, alphanumeric and underscores).
    #[schema(example = "t1")]
    pub username: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Initial role name. Defaults to `student`.
    #[schema(example = "teacher")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}

pub fn validate_create_user_request(payload: &CreateUserRequest) -> Result<(), AppError> {
    let username = payload.username.trim();
    if username.is_empty() || username.chars().count() > 32 {
        return Err(AppError::Validation(
            "Username must be 1-32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "Username must contain only letters, digits, and underscores".into(),
        ));
    }
    if payload.password.len() < 8 || payload.password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    if let Some(role) = &payload.role {
        crate::models::role::validate_role_name(role)?;
    }
    Ok(())
}

/// Role change request. When both fields are present, a changed `role`
/// wins over a changed `role_id`.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateUserRoleRequest {
    #[schema(example = "teacher")]
    pub role: Option<String>,
    #[schema(example = 2)]
    pub role_id: Option<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "t1")]
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    #[schema(example = "teacher")]
    pub role: String,
    #[schema(example = 2)]
    pub role_id: Option<i32>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            is_active: u.is_active,
            is_staff: u.is_staff,
            role: u.role,
            role_id: u.role_id,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UpdateUserRoleResponse {
    pub user: UserResponse,
    /// `false` when the requested role was already in place.
    pub changed: bool,
    /// Whether a built-in policy was applied.
    pub policy_applied: bool,
}
