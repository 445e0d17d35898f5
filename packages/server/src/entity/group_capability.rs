use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "group_capability")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub group_id: i32,
    #[sea_orm(primary_key)]
    pub capability_id: i32,
    #[sea_orm(belongs_to, from = "group_id", to = "id", on_delete = "Cascade")]
    pub group: Option<super::group::Entity>,
    #[sea_orm(belongs_to, from = "capability_id", to = "id", on_delete = "Cascade")]
    pub capability: Option<super::capability::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
