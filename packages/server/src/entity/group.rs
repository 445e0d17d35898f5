use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    #[sea_orm(has_many, via = "user_group")]
    pub users: HasMany<super::user::Entity>,

    #[sea_orm(has_many, via = "group_capability")]
    pub capabilities: HasMany<super::capability::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
