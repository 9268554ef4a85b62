//! Live catalog introspection of physical tables.
//!
//! The registry cache is reconciled against what these functions report, so
//! they always read the backing store and never the registry.

use std::collections::{BTreeMap, HashSet};

use sea_orm::sea_query::Value;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, QueryResult, Statement};

use crate::error::{EngineError, EngineResult};
use crate::isolation::PhysicalName;
use crate::model::{
    ColumnSchema, CREATED_AT, DELETED_AT, LogicalType, TableStructure, UPDATED_AT,
};

pub mod postgres;
pub mod sqlite;

// ---------- DTOs ----------

/// Column as reported by the store, before type mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    /// Declared / catalog type string (e.g. "varchar(255)", "character varying")
    pub declared_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary: bool,
}

/// Secondary index on a physical table. Primary key indexes are not listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// One row of the index listing query: (index name, unique, column).
pub type IndexColumnRow = (String, bool, String);

// ---------- dialect ----------

/// Backend-specific catalog SQL. Every statement takes the physical table name as its only bind.
pub trait CatalogDialect: Send + Sync {
    fn backend(&self) -> DbBackend;

    /// Returns one row with a `present` count.
    fn table_exists_sql(&self) -> &'static str;

    /// Returns columns in ordinal order.
    fn columns_sql(&self) -> &'static str;

    /// Returns one row per (index, column), ordered by index then position.
    fn indexes_sql(&self) -> &'static str;

    fn read_column(&self, row: &QueryResult) -> Result<LiveColumn, DbErr>;

    fn read_index_column(&self, row: &QueryResult) -> Result<IndexColumnRow, DbErr>;

    /// Statement applying a transaction-local statement timeout, if the backend has one.
    fn statement_timeout(&self, _timeout_ms: u64) -> Option<Statement> {
        None
    }

    fn statement(&self, sql: &str, table: &PhysicalName) -> Statement {
        Statement::from_sql_and_values(self.backend(), sql, [Value::from(table.as_str())])
    }
}

static SQLITE: sqlite::SqliteCatalog = sqlite::SqliteCatalog;
static POSTGRES: postgres::PostgresCatalog = postgres::PostgresCatalog;

pub fn dialect(backend: DbBackend) -> EngineResult<&'static dyn CatalogDialect> {
    match backend {
        DbBackend::Sqlite => Ok(&SQLITE),
        DbBackend::Postgres => Ok(&POSTGRES),
        DbBackend::MySql => Err(EngineError::Database {
            context: "unsupported backend".to_string(),
            source: DbErr::Custom("MySQL is not supported".to_string()),
        }),
    }
}

// ---------- type mapping ----------

/// Map a declared/catalog type back to a logical type. Covers the names both
/// backends report for the types the engine creates.
pub fn logical_type_of(declared: &str) -> Option<LogicalType> {
    let t = declared.trim().to_ascii_lowercase();
    let base = t.split('(').next().unwrap_or("").trim();

    if base.contains("timestamp") || base.contains("datetime") {
        Some(LogicalType::Datetime)
    } else if base.contains("date") {
        Some(LogicalType::Date)
    } else if base.contains("json") {
        Some(LogicalType::Json)
    } else if base.contains("bool") {
        Some(LogicalType::Boolean)
    } else if base.starts_with("varchar") || base.starts_with("char") || base == "string" {
        Some(LogicalType::String)
    } else if base.contains("text") {
        Some(LogicalType::Text)
    } else if base.contains("int") && !base.contains("interval") {
        Some(LogicalType::Integer)
    } else if ["real", "numeric", "decimal", "double", "float"]
        .iter()
        .any(|n| base.contains(n))
    {
        Some(LogicalType::Number)
    } else {
        None
    }
}

// ---------- queries ----------

pub async fn table_exists<C: ConnectionTrait>(conn: &C, table: &PhysicalName) -> EngineResult<bool> {
    let d = dialect(conn.get_database_backend())?;
    let row = conn
        .query_one(d.statement(d.table_exists_sql(), table))
        .await
        .map_err(|e| EngineError::from_db("failed to inspect the catalog", e))?;
    let present = match row {
        Some(r) => r
            .try_get::<i64>("", "present")
            .map_err(|e| EngineError::from_db("failed to inspect the catalog", e))?,
        None => 0,
    };
    Ok(present > 0)
}

pub async fn live_columns<C: ConnectionTrait>(
    conn: &C,
    table: &PhysicalName,
) -> EngineResult<Vec<LiveColumn>> {
    let d = dialect(conn.get_database_backend())?;
    let rows = conn
        .query_all(d.statement(d.columns_sql(), table))
        .await
        .map_err(|e| EngineError::from_db("failed to read table columns", e))?;
    rows.iter()
        .map(|row| d.read_column(row))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::from_db("failed to read table columns", e))
}

pub async fn live_indexes<C: ConnectionTrait>(
    conn: &C,
    table: &PhysicalName,
) -> EngineResult<Vec<LiveIndex>> {
    let d = dialect(conn.get_database_backend())?;
    let rows = conn
        .query_all(d.statement(d.indexes_sql(), table))
        .await
        .map_err(|e| EngineError::from_db("failed to read table indexes", e))?;

    let mut by_name: BTreeMap<String, LiveIndex> = BTreeMap::new();
    for row in &rows {
        let (name, unique, column) = d
            .read_index_column(row)
            .map_err(|e| EngineError::from_db("failed to read table indexes", e))?;
        by_name
            .entry(name.clone())
            .or_insert_with(|| LiveIndex {
                name,
                columns: Vec::new(),
                unique,
            })
            .columns
            .push(column);
    }
    Ok(by_name.into_values().collect())
}

pub async fn index_exists<C: ConnectionTrait>(
    conn: &C,
    table: &PhysicalName,
    index_name: &str,
) -> EngineResult<bool> {
    Ok(live_indexes(conn, table)
        .await?
        .iter()
        .any(|i| i.name == index_name))
}

/// Apply the configured statement timeout to the current transaction.
pub async fn apply_statement_timeout<C: ConnectionTrait>(conn: &C, timeout_ms: u64) -> EngineResult<()> {
    let d = dialect(conn.get_database_backend())?;
    if let Some(stmt) = d.statement_timeout(timeout_ms) {
        conn.query_one(stmt)
            .await
            .map_err(|e| EngineError::from_db("failed to set statement timeout", e))?;
    }
    Ok(())
}

// ---------- structure reconciliation ----------

/// Engine-level facts the catalog cannot express.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureHints {
    pub timestamps: bool,
    pub soft_delete: bool,
    /// Columns flagged `isForeign`, by name.
    pub foreign: HashSet<String>,
}

impl StructureHints {
    pub fn from_structure(structure: &TableStructure) -> Self {
        Self {
            timestamps: structure.timestamps,
            soft_delete: structure.soft_delete,
            foreign: structure
                .columns
                .iter()
                .filter(|c| c.is_foreign)
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    /// Follow a column rename.
    pub fn rename(&mut self, from: &str, to: &str) {
        if self.foreign.remove(from) {
            self.foreign.insert(to.to_string());
        }
    }
}

/// Build a `TableStructure` from live columns. Unknown types are drift.
pub fn structure_from_live(
    logical_name: &str,
    columns: Vec<LiveColumn>,
    hints: &StructureHints,
) -> EngineResult<TableStructure> {
    if columns.is_empty() {
        return Err(EngineError::SchemaDrift(format!(
            "backing table of '{logical_name}' is missing"
        )));
    }
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        let logical_type = logical_type_of(&col.declared_type).ok_or_else(|| {
            EngineError::SchemaDrift(format!(
                "column '{}' of table '{logical_name}' has unsupported type '{}'",
                col.name, col.declared_type
            ))
        })?;
        out.push(ColumnSchema {
            is_foreign: hints.foreign.contains(&col.name),
            name: col.name,
            logical_type,
            nullable: col.nullable && !col.is_primary,
            is_primary: col.is_primary,
            default_value: col.default_value,
        });
    }
    let has = |name: &str| out.iter().any(|c| c.name == name);
    let timestamps = hints.timestamps && has(CREATED_AT) && has(UPDATED_AT);
    let soft_delete = hints.soft_delete && has(DELETED_AT);
    Ok(TableStructure {
        columns: out,
        timestamps,
        soft_delete,
    })
}

/// Read the live structure of `table`.
pub async fn introspect<C: ConnectionTrait>(
    conn: &C,
    table: &PhysicalName,
    logical_name: &str,
    hints: &StructureHints,
) -> EngineResult<TableStructure> {
    let columns = live_columns(conn, table).await?;
    structure_from_live(logical_name, columns, hints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(name: &str, declared: &str, primary: bool) -> LiveColumn {
        LiveColumn {
            name: name.to_string(),
            declared_type: declared.to_string(),
            nullable: !primary,
            default_value: None,
            is_primary: primary,
        }
    }

    #[test]
    fn test_logical_type_of_sqlite_declared_types() {
        assert_eq!(logical_type_of("varchar(255)"), Some(LogicalType::String));
        assert_eq!(logical_type_of("text"), Some(LogicalType::Text));
        assert_eq!(logical_type_of("integer"), Some(LogicalType::Integer));
        assert_eq!(logical_type_of("bigint"), Some(LogicalType::Integer));
        assert_eq!(logical_type_of("real(16, 4)"), Some(LogicalType::Number));
        assert_eq!(logical_type_of("boolean"), Some(LogicalType::Boolean));
        assert_eq!(logical_type_of("date_text"), Some(LogicalType::Date));
        assert_eq!(
            logical_type_of("timestamp_with_timezone_text"),
            Some(LogicalType::Datetime)
        );
        assert_eq!(logical_type_of("jsonb_text"), Some(LogicalType::Json));
    }

    #[test]
    fn test_logical_type_of_postgres_catalog_types() {
        assert_eq!(logical_type_of("character varying"), Some(LogicalType::String));
        assert_eq!(logical_type_of("numeric"), Some(LogicalType::Number));
        assert_eq!(logical_type_of("timestamp with time zone"), Some(LogicalType::Datetime));
        assert_eq!(logical_type_of("date"), Some(LogicalType::Date));
        assert_eq!(logical_type_of("jsonb"), Some(LogicalType::Json));
        assert_eq!(logical_type_of("interval"), None);
        assert_eq!(logical_type_of("bytea"), None);
    }

    #[test]
    fn test_structure_from_live_keeps_hints() {
        let mut hints = StructureHints {
            timestamps: true,
            soft_delete: true,
            foreign: HashSet::from(["cliente_id".to_string()]),
        };
        hints.rename("cliente_id", "customer_id");
        let s = structure_from_live(
            "pedidos",
            vec![
                live("id", "integer", true),
                live("customer_id", "bigint", false),
                live("created_at", "timestamp_with_timezone_text", false),
                live("updated_at", "timestamp_with_timezone_text", false),
            ],
            &hints,
        )
        .unwrap();
        assert!(s.column("customer_id").unwrap().is_foreign);
        assert!(!s.column("id").unwrap().nullable);
        assert!(s.timestamps);
        assert!(!s.soft_delete, "deleted_at is not present");
    }

    #[test]
    fn test_structure_from_live_reports_unknown_types_as_drift() {
        let err = structure_from_live(
            "pedidos",
            vec![live("id", "integer", true), live("blob", "bytea", false)],
            &StructureHints::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_DRIFT");

        let err = structure_from_live("pedidos", vec![], &StructureHints::default()).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_DRIFT");
    }
}
