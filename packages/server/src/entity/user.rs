use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,

    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,

    /// Legacy role-name view. Kept equal to the referenced role's name by
    /// every write path in `rbac::sync`.
    pub role: String,
    /// NULL when no `role` row matches, or after the role was deleted.
    pub role_id: Option<i32>,
    #[sea_orm(belongs_to, from = "role_id", to = "id", on_delete = "SetNull")]
    pub role_ref: Option<super::role::Entity>,

    #[sea_orm(has_many, via = "user_capability")]
    pub capabilities: HasMany<super::capability::Entity>,

    #[sea_orm(has_many, via = "user_group")]
    pub groups: HasMany<super::group::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
