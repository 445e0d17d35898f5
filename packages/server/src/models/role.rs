use serde::{Deserialize, Serialize};

use crate::entity::{capability, role};
use crate::error::AppError;
use crate::rbac::CascadeReport;

#[derive(Serialize, utoipa::ToSchema)]
pub struct CapabilityResponse {
    #[schema(example = 9)]
    pub id: i32,
    #[schema(example = "users")]
    pub module: String,
    #[schema(example = "manage_courses")]
    pub codename: String,
    #[schema(example = "Can manage courses")]
    pub name: String,
}

impl From<capability::Model> for CapabilityResponse {
    fn from(c: capability::Model) -> Self {
        Self {
            id: c.id,
            module: c.module,
            codename: c.codename,
            name: c.name,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RoleResponse {
    #[schema(example = 2)]
    pub id: i32,
    #[schema(example = "teacher")]
    pub name: String,
    pub description: String,
    /// Policy revision that last wrote the capability set; null once hand-edited.
    pub policy_version: Option<i32>,
    pub capability_ids: Vec<i32>,
}

impl RoleResponse {
    pub fn new(role: role::Model, capability_ids: Vec<i32>) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            policy_version: role.policy_version,
            capability_ids,
        }
    }
}

/// Role after a write, with the number of users it was pushed to.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RoleWriteResponse {
    pub role: RoleResponse,
    #[schema(example = 3)]
    pub users_updated: usize,
}

impl From<CascadeReport> for RoleWriteResponse {
    fn from(report: CascadeReport) -> Self {
        Self {
            role: RoleResponse::new(report.role, report.capability_ids),
            users_updated: report.users_updated,
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateRoleRequest {
    /// Unique role name (1-50 chars, lowercase letters, digits, underscores).
    #[schema(example = "teaching_assistant")]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub capability_ids: Vec<i32>,
}

pub fn validate_role_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() || name.chars().count() > 50 {
        return Err(AppError::Validation(
            "Role name must be 1-50 characters".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::Validation(
            "Role name must contain only lowercase letters, digits, and underscores".into(),
        ));
    }
    Ok(())
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleCapabilitiesRequest {
    /// Full replacement set.
    pub capability_ids: Vec<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RoleStatisticsResponse {
    #[schema(example = "teacher")]
    pub role: String,
    pub by_reference: u64,
    pub by_name: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SyncRolesResponse {
    pub roles: Vec<RoleResponse>,
    #[schema(example = 1)]
    pub users_updated: usize,
    #[schema(example = 12)]
    pub users_total: usize,
    pub statistics: Vec<RoleStatisticsResponse>,
}
