//! Table lifecycle: DDL against physical tables plus the matching registry writes.
//!
//! Every mutation runs in one transaction: DDL, live introspection and the
//! registry update either all land or none do. Inside a transaction all
//! statements go through the transaction handle, never the pool.

use std::collections::HashSet;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend};

use crate::catalog::{self, StructureHints};
use crate::config::EngineConfig;
use crate::ddl;
use crate::dto::{ApiInfo, DropSummary, IndexInfo, TableInfo};
use crate::error::{EngineError, EngineResult, ValidationIssue};
use crate::isolation::{self, logical_index_name, physical_index_name, physical_table_name, sanitize};
use crate::model::{Alterations, ApiCascade, ProjectId, TableStructure, ValidatedDefinition};
use crate::registry;
use crate::store;
use crate::validate::{is_identifier, validate_alterations};

#[derive(Clone)]
pub struct SchemaManager {
    db: DatabaseConnection,
    config: EngineConfig,
}

impl SchemaManager {
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> Self {
        Self { db, config }
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    // ---------- create ----------

    /// Create the physical table and register it. Fails with `Conflict` when
    /// the name is taken in the project, either in the registry or physically.
    pub async fn create_table(
        &self,
        project: ProjectId,
        definition: &ValidatedDefinition,
    ) -> EngineResult<TableInfo> {
        let name = definition.name();
        let physical = physical_table_name(project, name)?;
        let backend = self.backend();
        let create = ddl::create_table(backend, &physical, definition)?;

        let txn = store::begin(&self.db, &self.config).await?;

        if registry::find(&txn, project, name).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "table '{name}' already exists in project {project}"
            )));
        }
        if catalog::table_exists(&txn, &physical).await? {
            return Err(EngineError::Conflict(format!(
                "table '{name}' collides with an existing table of project {project}"
            )));
        }

        txn.execute(backend.build(&create))
            .await
            .map_err(|e| EngineError::from_db(format!("could not create table '{name}'"), e))?;

        let hints = StructureHints {
            timestamps: definition.timestamps(),
            soft_delete: definition.soft_delete(),
            foreign: definition
                .columns()
                .iter()
                .filter(|c| c.is_foreign)
                .map(|c| c.name.clone())
                .collect(),
        };
        let structure = catalog::introspect(&txn, &physical, name, &hints).await?;
        let record = registry::insert_table(&txn, project, definition, &structure).await?;
        let apis = if definition.generate_api() {
            registry::insert_default_apis(&txn, project, &record).await?.len()
        } else {
            0
        };

        store::commit(txn).await?;

        tracing::info!(
            project = %project,
            table = %name,
            columns = structure.columns.len(),
            apis,
            "table created"
        );
        TableInfo::try_from(record)
    }

    // ---------- alter ----------

    pub async fn alter_table(
        &self,
        project: ProjectId,
        table_name: &str,
        alterations: &Alterations,
    ) -> EngineResult<TableInfo> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let resolved = isolation::resolve(&txn, project, table_name).await?;
        let validated =
            validate_alterations(&resolved.structure, alterations).map_err(EngineError::Validation)?;

        // build everything first so an unsupported change fails before any DDL runs
        let mut statements = Vec::new();
        for column in &validated.add {
            statements.push(ddl::add_column(backend, &resolved.physical, column)?);
        }
        for column in &validated.drop {
            statements.push(ddl::drop_column(&resolved.physical, column));
        }
        for alteration in &validated.alter {
            if alteration.changes_definition {
                statements.push(ddl::modify_column(backend, &resolved.physical, alteration)?);
            }
            if let Some(new_name) = &alteration.new_name {
                statements.push(ddl::rename_column(&resolved.physical, &alteration.name, new_name));
            }
        }

        for stmt in &statements {
            txn.execute(backend.build(stmt)).await.map_err(|e| {
                EngineError::from_db(format!("could not alter table '{table_name}'"), e)
            })?;
        }

        let mut hints = StructureHints::from_structure(&resolved.structure);
        for column in validated.add.iter().filter(|c| c.is_foreign) {
            hints.foreign.insert(column.name.clone());
        }
        for column in &validated.drop {
            hints.foreign.remove(column);
        }
        for alteration in &validated.alter {
            if let Some(new_name) = &alteration.new_name {
                hints.rename(&alteration.name, new_name);
            }
        }

        let structure = catalog::introspect(&txn, &resolved.physical, table_name, &hints).await?;
        let record = registry::update_structure(&txn, resolved.record, &structure).await?;

        store::commit(txn).await?;

        tracing::info!(
            project = %project,
            table = %table_name,
            added = validated.add.len(),
            dropped = validated.drop.len(),
            altered = validated.alter.len(),
            "table altered"
        );
        TableInfo::try_from(record)
    }

    // ---------- drop ----------

    /// Drop the physical table and its registry row. Generated APIs are
    /// deactivated (default) or deleted, per `cascade`.
    pub async fn drop_table(
        &self,
        project: ProjectId,
        table_name: &str,
        cascade: ApiCascade,
    ) -> EngineResult<DropSummary> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let resolved = isolation::resolve(&txn, project, table_name).await?;

        let (apis_deactivated, apis_deleted) = match cascade {
            ApiCascade::Deactivate => (registry::deactivate_apis(&txn, resolved.id()).await?, 0),
            ApiCascade::Delete => (0, registry::delete_apis(&txn, resolved.id()).await?),
        };

        if catalog::table_exists(&txn, &resolved.physical).await? {
            txn.execute(backend.build(&ddl::drop_table(&resolved.physical)))
                .await
                .map_err(|e| EngineError::from_db(format!("could not drop table '{table_name}'"), e))?;
        } else {
            tracing::warn!(
                project = %project,
                table = %table_name,
                "backing table already gone; removing registry entry only"
            );
        }
        registry::delete_table(&txn, resolved.id()).await?;

        store::commit(txn).await?;

        tracing::info!(
            project = %project,
            table = %table_name,
            apis_deactivated,
            apis_deleted,
            "table dropped"
        );
        Ok(DropSummary {
            table_name: table_name.to_string(),
            apis_deactivated,
            apis_deleted,
        })
    }

    // ---------- structure ----------

    /// Live structure of a table. A stale registry cache is rewritten.
    pub async fn get_table_schema(
        &self,
        project: ProjectId,
        table_name: &str,
    ) -> EngineResult<TableStructure> {
        let txn = store::begin(&self.db, &self.config).await?;
        let resolved = isolation::resolve(&txn, project, table_name).await?;
        let hints = StructureHints::from_structure(&resolved.structure);
        let live = catalog::introspect(&txn, &resolved.physical, table_name, &hints).await?;

        if live != resolved.structure {
            let differences = resolved.structure.diff(&live);
            tracing::warn!(
                project = %project,
                table = %table_name,
                ?differences,
                "registry structure was stale; refreshed from the live table"
            );
            registry::update_structure(&txn, resolved.record, &live).await?;
        }

        store::commit(txn).await?;
        Ok(live)
    }

    /// Compare cache and live table without writing. Differences are `SchemaDrift`.
    pub async fn check_drift(
        &self,
        project: ProjectId,
        table_name: &str,
    ) -> EngineResult<TableStructure> {
        let resolved = isolation::resolve(&self.db, project, table_name).await?;
        let hints = StructureHints::from_structure(&resolved.structure);
        let live = catalog::introspect(&self.db, &resolved.physical, table_name, &hints).await?;
        if !resolved.structure.same_shape(&live) {
            let differences = resolved.structure.diff(&live);
            return Err(EngineError::SchemaDrift(format!(
                "table '{table_name}' differs from its registry entry: {}",
                differences.join("; ")
            )));
        }
        Ok(live)
    }

    /// Registry entry of one table (cached structure, no introspection).
    pub async fn describe_table(&self, project: ProjectId, table_name: &str) -> EngineResult<TableInfo> {
        let resolved = isolation::resolve(&self.db, project, table_name).await?;
        TableInfo::try_from(resolved.record)
    }

    pub async fn list_tables(&self, project: ProjectId) -> EngineResult<Vec<TableInfo>> {
        registry::list(&self.db, project)
            .await?
            .into_iter()
            .map(TableInfo::try_from)
            .collect()
    }

    // ---------- indexes ----------

    pub async fn add_index(
        &self,
        project: ProjectId,
        table_name: &str,
        index_name: &str,
        columns: &[String],
        unique: bool,
    ) -> EngineResult<IndexInfo> {
        let mut issues = Vec::new();
        if !is_identifier(index_name) {
            issues.push(ValidationIssue::new(
                "indexName",
                "must start with a letter and contain only letters, digits and underscores",
            ));
        }
        if columns.is_empty() {
            issues.push(ValidationIssue::new("columns", "at least one column is required"));
        }
        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }

        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let resolved = isolation::resolve(&txn, project, table_name).await?;

        let mut seen = HashSet::new();
        for (i, column) in columns.iter().enumerate() {
            if resolved.structure.column(column).is_none() {
                issues.push(ValidationIssue::new(format!("columns[{i}]"), format!("unknown column '{column}'")));
            } else if !seen.insert(column.as_str()) {
                issues.push(ValidationIssue::new(format!("columns[{i}]"), format!("'{column}' is listed twice")));
            }
        }
        if !issues.is_empty() {
            return Err(EngineError::Validation(issues));
        }

        let physical_index = physical_index_name(&resolved.physical, index_name)?;
        if catalog::index_exists(&txn, &resolved.physical, &physical_index).await? {
            return Err(EngineError::Conflict(format!(
                "index '{index_name}' already exists on table '{table_name}'"
            )));
        }

        let stmt = ddl::create_index(&resolved.physical, &physical_index, columns, unique);
        txn.execute(backend.build(&stmt)).await.map_err(|e| {
            EngineError::from_db(format!("could not create index '{index_name}'"), e)
        })?;
        store::commit(txn).await?;

        tracing::info!(project = %project, table = %table_name, index = %index_name, unique, "index created");
        Ok(IndexInfo {
            name: sanitize(index_name),
            columns: columns.to_vec(),
            unique,
        })
    }

    pub async fn drop_index(
        &self,
        project: ProjectId,
        table_name: &str,
        index_name: &str,
    ) -> EngineResult<()> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let resolved = isolation::resolve(&txn, project, table_name).await?;
        let physical_index = physical_index_name(&resolved.physical, index_name)?;

        if !catalog::index_exists(&txn, &resolved.physical, &physical_index).await? {
            return Err(EngineError::NotFound(format!(
                "index '{index_name}' does not exist on table '{table_name}'"
            )));
        }
        let stmt = ddl::drop_index(&resolved.physical, &physical_index);
        txn.execute(backend.build(&stmt)).await.map_err(|e| {
            EngineError::from_db(format!("could not drop index '{index_name}'"), e)
        })?;
        store::commit(txn).await?;

        tracing::info!(project = %project, table = %table_name, index = %index_name, "index dropped");
        Ok(())
    }

    /// Indexes created through the engine, by logical name.
    pub async fn list_indexes(&self, project: ProjectId, table_name: &str) -> EngineResult<Vec<IndexInfo>> {
        let resolved = isolation::resolve(&self.db, project, table_name).await?;
        let live = catalog::live_indexes(&self.db, &resolved.physical).await?;
        Ok(live
            .into_iter()
            .filter_map(|index| {
                logical_index_name(&resolved.physical, &index.name).map(|name| IndexInfo {
                    name,
                    columns: index.columns,
                    unique: index.unique,
                })
            })
            .collect())
    }

    // ---------- apis ----------

    pub async fn list_apis(&self, project: ProjectId) -> EngineResult<Vec<ApiInfo>> {
        Ok(registry::list_apis(&self.db, project)
            .await?
            .into_iter()
            .map(ApiInfo::from)
            .collect())
    }

    /// Delete API rows left inactive by dropped tables.
    pub async fn purge_inactive_apis(&self, project: ProjectId) -> EngineResult<u64> {
        let purged = registry::purge_inactive_apis(&self.db, project).await?;
        tracing::info!(project = %project, purged, "inactive apis purged");
        Ok(purged)
    }
}
