use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "classifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub run_id: String,
    pub email_id: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub category: String,
    pub source: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f32>,
    pub refinement_count: i32,
    pub action: Option<String>,
    pub label_status: String,
    pub error: Option<String>,
    pub classified_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::run::Entity",
        from = "Column::RunId",
        to = "super::run::Column::RunId",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Run,
    #[sea_orm(has_many = "super::correction::Entity")]
    Correction,
}

impl Related<super::run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Run.def()
    }
}

impl Related<super::correction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Correction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
