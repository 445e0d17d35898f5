use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An atomic grant checked by the permission gate, identified by
/// `module.codename` (e.g. `users.manage_courses`).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "capability")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Resource module the capability is scoped to (`users`, `courses`, ...).
    pub module: String,
    pub codename: String,
    /// Human-readable label.
    pub name: String,

    #[sea_orm(has_many, via = "role_capability")]
    pub roles: HasMany<super::role::Entity>,

    #[sea_orm(has_many, via = "user_capability")]
    pub users: HasMany<super::user::Entity>,

    #[sea_orm(has_many, via = "group_capability")]
    pub groups: HasMany<super::group::Entity>,
}

impl Model {
    /// The qualified `module.codename` identifier.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.codename)
    }
}

impl ActiveModelBehavior for ActiveModel {}
