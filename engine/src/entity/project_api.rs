use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "project_api")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: i64,
    pub api_path: String,
    pub method: String,
    /// None once the owning table has been dropped.
    pub table_id: Option<Uuid>,
    pub is_custom: bool,
    pub is_active: bool,
    /// JSON text: operation descriptor for the generated endpoint.
    pub configuration: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project_database::Entity",
        from = "Column::TableId",
        to = "super::project_database::Column::Id",
        on_delete = "SetNull"
    )]
    ProjectDatabase,
}

impl Related<super::project_database::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectDatabase.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
