use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// Registry row for one logical table of a project.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "project_database")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: i64,
    /// Logical name as the tenant sees it. The physical name is derived, never stored.
    pub table_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_built_in: bool,
    pub is_generated: bool,
    pub api_enabled: bool,
    /// JSON text: cached `TableStructure`, reconciled against the live catalog after DDL.
    pub structure: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_api::Entity")]
    ProjectApi,
}

impl Related<super::project_api::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectApi.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
