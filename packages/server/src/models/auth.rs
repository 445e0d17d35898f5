use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Username of the account to log into.
    #[schema(example = "t1")]
    pub username: String,
    /// Account password.
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::Validation("Username must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    #[schema(example = "t1")]
    pub username: String,
    #[schema(example = "teacher")]
    pub role: String,
}

/// Current authenticated user's profile.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "t1")]
    pub username: String,
    #[schema(example = "teacher")]
    pub role: String,
    /// Referenced role row, if any.
    #[schema(example = 2)]
    pub role_id: Option<i32>,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Effective capabilities as `module.codename`.
    #[schema(example = json!(["users.manage_courses"]))]
    pub capabilities: Vec<String>,
}

/// Query for the self-service capability check.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct CheckQuery {
    /// Capability to test, `module.codename` or a bare codename.
    pub capability: Option<String>,
    /// Module to test for any access.
    pub module: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CheckResponse {
    #[schema(example = "users.manage_courses")]
    pub capability: Option<String>,
    #[schema(example = "users")]
    pub module: Option<String>,
    /// `true` when every requested check passed.
    pub allowed: bool,
}
