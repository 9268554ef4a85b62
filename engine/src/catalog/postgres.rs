use sea_orm::sea_query::Value;
use sea_orm::{DbBackend, DbErr, QueryResult, Statement};

use super::{CatalogDialect, IndexColumnRow, LiveColumn};

/// Catalog access through information_schema and pg_catalog, scoped to `current_schema()`.
pub struct PostgresCatalog;

impl CatalogDialect for PostgresCatalog {
    fn backend(&self) -> DbBackend {
        DbBackend::Postgres
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT COUNT(*) AS present FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT c.column_name::text AS name, \
                c.data_type::text AS declared_type, \
                (c.is_nullable = 'YES') AS nullable, \
                c.column_default::text AS dflt_value, \
                EXISTS ( \
                    SELECT 1 FROM information_schema.table_constraints tc \
                    JOIN information_schema.key_column_usage k \
                      ON k.constraint_name = tc.constraint_name \
                     AND k.table_schema = tc.table_schema \
                     AND k.table_name = tc.table_name \
                    WHERE tc.constraint_type = 'PRIMARY KEY' \
                      AND tc.table_schema = c.table_schema \
                      AND tc.table_name = c.table_name \
                      AND k.column_name = c.column_name \
                ) AS is_primary \
         FROM information_schema.columns c \
         WHERE c.table_schema = current_schema() AND c.table_name = $1 \
         ORDER BY c.ordinal_position"
    }

    fn indexes_sql(&self) -> &'static str {
        "SELECT i.relname::text AS index_name, \
                ix.indisunique AS is_unique, \
                a.attname::text AS column_name \
         FROM pg_index ix \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_class i ON i.oid = ix.indexrelid \
         JOIN pg_namespace n ON n.oid = t.relnamespace \
         JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) ON true \
         JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
         WHERE t.relname = $1 \
           AND n.nspname = current_schema() \
           AND NOT ix.indisprimary \
         ORDER BY i.relname, k.ord"
    }

    fn read_column(&self, row: &QueryResult) -> Result<LiveColumn, DbErr> {
        Ok(LiveColumn {
            name: row.try_get("", "name")?,
            declared_type: row.try_get("", "declared_type")?,
            nullable: row.try_get("", "nullable")?,
            default_value: row.try_get("", "dflt_value")?,
            is_primary: row.try_get("", "is_primary")?,
        })
    }

    fn read_index_column(&self, row: &QueryResult) -> Result<IndexColumnRow, DbErr> {
        Ok((
            row.try_get("", "index_name")?,
            row.try_get("", "is_unique")?,
            row.try_get("", "column_name")?,
        ))
    }

    fn statement_timeout(&self, timeout_ms: u64) -> Option<Statement> {
        Some(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT set_config('statement_timeout', $1, true)",
            [Value::from(timeout_ms.to_string())],
        ))
    }
}
