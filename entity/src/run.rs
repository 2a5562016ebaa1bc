use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub run_id: String,
    pub started_at: DateTimeUtc,
    pub finished_at: DateTimeUtc,
    pub emails_collected: i32,
    pub emails_classified: i32,
    pub emails_labelled: i32,
    pub errors_count: i32,
    pub actionable_count: i32,
    pub informational_count: i32,
    pub promotional_count: i32,
    pub noise_count: i32,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::classification::Entity")]
    Classification,
    #[sea_orm(has_many = "super::correction::Entity")]
    Correction,
}

impl Related<super::classification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Classification.def()
    }
}

impl Related<super::correction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Correction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
