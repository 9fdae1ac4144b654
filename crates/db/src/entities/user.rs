//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Lowercased username for case-insensitive lookup
    #[sea_orm(unique)]
    pub username_lower: String,

    /// Display name
    #[sea_orm(nullable)]
    pub name: Option<String>,

    #[sea_orm(nullable)]
    pub email: Option<String>,

    /// Bearer token used as the credential
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post::Entity")]
    Posts,

    #[sea_orm(has_many = "super::comment::Entity")]
    Comments,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
