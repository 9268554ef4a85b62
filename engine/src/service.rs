use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::Value as JsonValue;

use crate::catalog;
use crate::config::EngineConfig;
use crate::dto::{ApiInfo, DeletedRecord, DropSummary, IndexInfo, QueryResult, TableInfo};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Alterations, ApiCascade, DeleteOptions, PaginationOptions, ProjectId, QueryFilter, ReadOptions,
    Record, TableDefinition, TableStructure,
};
use crate::records::RecordStore;
use crate::schema::SchemaManager;
use crate::store;
use crate::validate::validate;

/// Entry point of the engine. Every operation is scoped by `ProjectId`, bounded
/// by the configured timeout, and reported as a [`QueryResult`].
#[derive(Clone)]
pub struct TableEngine {
    db: DatabaseConnection,
    config: EngineConfig,
    schema: SchemaManager,
    records: RecordStore,
}

impl TableEngine {
    /// Wrap an existing connection. The registry migrations must already have run.
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> EngineResult<Self> {
        catalog::dialect(db.get_database_backend())?;
        Ok(Self {
            schema: SchemaManager::new(db.clone(), config.clone()),
            records: RecordStore::new(db.clone(), config.clone()),
            db,
            config,
        })
    }

    /// Connect to `config.database_url` and migrate the registry.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let db = store::connect(&config).await?;
        Self::new(db, config)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Typed schema API, without the envelope or the timeout.
    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    /// Typed record API, without the envelope or the timeout.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    async fn run<T>(
        &self,
        operation: &'static str,
        project: ProjectId,
        fut: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        let result = store::with_timeout(&self.config, operation, fut).await;
        if let Err(e) = &result {
            match e {
                EngineError::Database { .. } | EngineError::Timeout(_) => {
                    tracing::error!(operation, project = %project, code = e.code(), error = %e, "operation failed");
                }
                _ => {
                    tracing::debug!(operation, project = %project, code = e.code(), error = %e, "operation rejected");
                }
            }
        }
        result
    }

    // ---------- tables ----------

    pub async fn create_table(
        &self,
        project: ProjectId,
        definition: &TableDefinition,
    ) -> QueryResult<TableInfo> {
        self.run("createTable", project, async {
            let validated = validate(definition).map_err(EngineError::Validation)?;
            self.schema.create_table(project, &validated).await
        })
        .await
        .into()
    }

    pub async fn alter_table(
        &self,
        project: ProjectId,
        table_name: &str,
        alterations: &Alterations,
    ) -> QueryResult<TableInfo> {
        self.run(
            "alterTable",
            project,
            self.schema.alter_table(project, table_name, alterations),
        )
        .await
        .into()
    }

    pub async fn drop_table(
        &self,
        project: ProjectId,
        table_name: &str,
        cascade: ApiCascade,
    ) -> QueryResult<DropSummary> {
        self.run("dropTable", project, self.schema.drop_table(project, table_name, cascade))
            .await
            .into()
    }

    pub async fn get_table_schema(
        &self,
        project: ProjectId,
        table_name: &str,
    ) -> QueryResult<TableStructure> {
        self.run("getTableSchema", project, self.schema.get_table_schema(project, table_name))
            .await
            .into()
    }

    pub async fn describe_table(&self, project: ProjectId, table_name: &str) -> QueryResult<TableInfo> {
        self.run("describeTable", project, self.schema.describe_table(project, table_name))
            .await
            .into()
    }

    pub async fn check_drift(&self, project: ProjectId, table_name: &str) -> QueryResult<TableStructure> {
        self.run("checkDrift", project, self.schema.check_drift(project, table_name))
            .await
            .into()
    }

    pub async fn list_tables(&self, project: ProjectId) -> QueryResult<Vec<TableInfo>> {
        self.run("listTables", project, self.schema.list_tables(project))
            .await
            .into()
    }

    // ---------- indexes ----------

    pub async fn add_index(
        &self,
        project: ProjectId,
        table_name: &str,
        index_name: &str,
        columns: &[String],
        unique: bool,
    ) -> QueryResult<IndexInfo> {
        self.run(
            "addIndex",
            project,
            self.schema.add_index(project, table_name, index_name, columns, unique),
        )
        .await
        .into()
    }

    pub async fn drop_index(
        &self,
        project: ProjectId,
        table_name: &str,
        index_name: &str,
    ) -> QueryResult<()> {
        self.run("dropIndex", project, self.schema.drop_index(project, table_name, index_name))
            .await
            .into()
    }

    pub async fn list_indexes(&self, project: ProjectId, table_name: &str) -> QueryResult<Vec<IndexInfo>> {
        self.run("listIndexes", project, self.schema.list_indexes(project, table_name))
            .await
            .into()
    }

    // ---------- apis ----------

    pub async fn list_apis(&self, project: ProjectId) -> QueryResult<Vec<ApiInfo>> {
        self.run("listApis", project, self.schema.list_apis(project))
            .await
            .into()
    }

    pub async fn purge_inactive_apis(&self, project: ProjectId) -> QueryResult<u64> {
        self.run("purgeInactiveApis", project, self.schema.purge_inactive_apis(project))
            .await
            .into()
    }

    // ---------- records ----------

    pub async fn insert_record(
        &self,
        project: ProjectId,
        table_name: &str,
        data: &Record,
        schema: Option<&TableStructure>,
    ) -> QueryResult<Record> {
        self.run(
            "insertRecord",
            project,
            self.records.insert_record(project, table_name, data, schema),
        )
        .await
        .into()
    }

    pub async fn get_record_by_id(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        read: ReadOptions,
    ) -> QueryResult<Record> {
        self.run(
            "getRecordById",
            project,
            self.records.get_record_by_id(project, table_name, id, read),
        )
        .await
        .into()
    }

    pub async fn update_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        data: &Record,
    ) -> QueryResult<Record> {
        self.run(
            "updateRecord",
            project,
            self.records.update_record(project, table_name, id, data),
        )
        .await
        .into()
    }

    pub async fn delete_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        options: DeleteOptions,
    ) -> QueryResult<DeletedRecord> {
        self.run(
            "deleteRecord",
            project,
            self.records.delete_record(project, table_name, id, options),
        )
        .await
        .into()
    }

    pub async fn restore_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
    ) -> QueryResult<Record> {
        self.run("restoreRecord", project, self.records.restore_record(project, table_name, id))
            .await
            .into()
    }

    pub async fn query_records(
        &self,
        project: ProjectId,
        table_name: &str,
        filters: &[QueryFilter],
        pagination: &PaginationOptions,
        read: ReadOptions,
    ) -> QueryResult<Vec<Record>> {
        self.run(
            "queryRecords",
            project,
            self.records
                .query_records(project, table_name, filters, pagination, read),
        )
        .await
        .into()
    }
}
