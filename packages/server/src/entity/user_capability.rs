use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A capability granted directly to a user, independent of any role.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_capability")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub user_id: i32,
    #[sea_orm(primary_key)]
    pub capability_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: Option<super::user::Entity>,
    #[sea_orm(belongs_to, from = "capability_id", to = "id", on_delete = "Cascade")]
    pub capability: Option<super::capability::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
