//! ProjectDatabase / ProjectApi persistence.
//!
//! Every function takes the connection it runs on so callers can keep
//! registry writes in the same transaction as the DDL they describe.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

use crate::entity::{project_api, project_database};
use crate::error::{EngineError, EngineResult};
use crate::model::{ProjectId, TableStructure, ValidatedDefinition};

pub fn encode_structure(structure: &TableStructure) -> EngineResult<String> {
    serde_json::to_string(structure)
        .map_err(|e| EngineError::SchemaDrift(format!("failed to serialize table structure: {e}")))
}

pub fn decode_structure(record: &project_database::Model) -> EngineResult<TableStructure> {
    serde_json::from_str(&record.structure).map_err(|e| {
        EngineError::SchemaDrift(format!(
            "cached structure of table '{}' is unreadable: {e}",
            record.table_name
        ))
    })
}

// ---------- tables ----------

pub async fn find<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
    table_name: &str,
) -> EngineResult<Option<project_database::Model>> {
    project_database::Entity::find()
        .filter(project_database::Column::ProjectId.eq(project.get()))
        .filter(project_database::Column::TableName.eq(table_name))
        .one(conn)
        .await
        .map_err(|e| EngineError::from_db(format!("failed to look up table '{table_name}'"), e))
}

pub async fn list<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
) -> EngineResult<Vec<project_database::Model>> {
    project_database::Entity::find()
        .filter(project_database::Column::ProjectId.eq(project.get()))
        .order_by_asc(project_database::Column::TableName)
        .all(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to list tables", e))
}

pub async fn insert_table<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
    definition: &ValidatedDefinition,
    structure: &TableStructure,
) -> EngineResult<project_database::Model> {
    let now = Utc::now().naive_utc();
    let row = project_database::ActiveModel {
        id: Set(Uuid::now_v7()),
        project_id: Set(project.get()),
        table_name: Set(definition.name.clone()),
        display_name: Set(definition
            .display_name
            .clone()
            .unwrap_or_else(|| definition.name.clone())),
        description: Set(definition.description.clone()),
        is_built_in: Set(definition.is_built_in),
        is_generated: Set(definition.is_generated),
        api_enabled: Set(definition.generate_api),
        structure: Set(encode_structure(structure)?),
        created_at: Set(now),
        updated_at: Set(now),
    };
    row.insert(conn).await.map_err(|e| {
        EngineError::from_db(format!("table '{}' already exists", definition.name), e)
    })
}

pub async fn update_structure<C: ConnectionTrait>(
    conn: &C,
    record: project_database::Model,
    structure: &TableStructure,
) -> EngineResult<project_database::Model> {
    let table_name = record.table_name.clone();
    let mut active: project_database::ActiveModel = record.into();
    active.structure = Set(encode_structure(structure)?);
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(conn).await.map_err(|e| {
        EngineError::from_db(format!("failed to update registry entry of '{table_name}'"), e)
    })
}

pub async fn delete_table<C: ConnectionTrait>(conn: &C, table_id: Uuid) -> EngineResult<()> {
    project_database::Entity::delete_by_id(table_id)
        .exec(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to remove registry entry", e))?;
    Ok(())
}

// ---------- generated APIs ----------

/// (method, path suffix, operation) of the endpoints generated per table.
const DEFAULT_ENDPOINTS: [(&str, &str, &str); 5] = [
    ("GET", "", "list"),
    ("GET", "/:id", "get"),
    ("POST", "", "create"),
    ("PUT", "/:id", "update"),
    ("DELETE", "/:id", "delete"),
];

pub async fn insert_default_apis<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
    table: &project_database::Model,
) -> EngineResult<Vec<project_api::Model>> {
    let now = Utc::now().naive_utc();
    let mut created = Vec::with_capacity(DEFAULT_ENDPOINTS.len());
    for (method, suffix, operation) in DEFAULT_ENDPOINTS {
        let configuration = json!({
            "operation": operation,
            "table": table.table_name,
        });
        let row = project_api::ActiveModel {
            id: Set(Uuid::now_v7()),
            project_id: Set(project.get()),
            api_path: Set(format!("/api/{}{suffix}", table.table_name)),
            method: Set(method.to_string()),
            table_id: Set(Some(table.id)),
            is_custom: Set(false),
            is_active: Set(true),
            configuration: Set(configuration.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = row
            .insert(conn)
            .await
            .map_err(|e| EngineError::from_db("failed to register generated api", e))?;
        created.push(model);
    }
    Ok(created)
}

/// Mark a table's APIs inactive and detach them from the table row.
pub async fn deactivate_apis<C: ConnectionTrait>(conn: &C, table_id: Uuid) -> EngineResult<u64> {
    let result = project_api::Entity::update_many()
        .col_expr(project_api::Column::IsActive, Expr::value(false))
        .col_expr(project_api::Column::TableId, Expr::value(Option::<Uuid>::None))
        .col_expr(project_api::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
        .filter(project_api::Column::TableId.eq(table_id))
        .filter(project_api::Column::IsActive.eq(true))
        .exec(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to deactivate generated apis", e))?;
    Ok(result.rows_affected)
}

pub async fn delete_apis<C: ConnectionTrait>(conn: &C, table_id: Uuid) -> EngineResult<u64> {
    let result = project_api::Entity::delete_many()
        .filter(project_api::Column::TableId.eq(table_id))
        .exec(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to delete generated apis", e))?;
    Ok(result.rows_affected)
}

pub async fn list_apis<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
) -> EngineResult<Vec<project_api::Model>> {
    project_api::Entity::find()
        .filter(project_api::Column::ProjectId.eq(project.get()))
        .order_by_asc(project_api::Column::ApiPath)
        .order_by_asc(project_api::Column::Method)
        .all(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to list apis", e))
}

pub async fn purge_inactive_apis<C: ConnectionTrait>(conn: &C, project: ProjectId) -> EngineResult<u64> {
    let result = project_api::Entity::delete_many()
        .filter(project_api::Column::ProjectId.eq(project.get()))
        .filter(project_api::Column::IsActive.eq(false))
        .exec(conn)
        .await
        .map_err(|e| EngineError::from_db("failed to purge inactive apis", e))?;
    Ok(result.rows_affected)
}
