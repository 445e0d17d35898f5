use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,
    pub description: String,

    /// Revision of the built-in policy map that last wrote this role's
    /// capability set. NULL for custom roles.
    pub policy_version: Option<i32>,

    #[sea_orm(has_many)]
    pub users: HasMany<super::user::Entity>,

    #[sea_orm(has_many, via = "role_capability")]
    pub capabilities: HasMany<super::capability::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
