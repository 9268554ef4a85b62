use sea_orm::{DbBackend, DbErr, QueryResult};

use super::{CatalogDialect, IndexColumnRow, LiveColumn};

/// Catalog access through SQLite's table-valued pragmas.
pub struct SqliteCatalog;

impl CatalogDialect for SqliteCatalog {
    fn backend(&self) -> DbBackend {
        DbBackend::Sqlite
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT COUNT(*) AS present FROM sqlite_master WHERE type = 'table' AND name = ?"
    }

    fn columns_sql(&self) -> &'static str {
        r#"SELECT name, type AS declared_type, "notnull" AS not_null, dflt_value, pk
           FROM pragma_table_info(?)
           ORDER BY cid"#
    }

    // origin 'c' = created by CREATE INDEX; skips pk and UNIQUE-constraint autoindexes
    fn indexes_sql(&self) -> &'static str {
        r#"SELECT il.name AS index_name, il."unique" AS is_unique, ii.name AS column_name
           FROM pragma_index_list(?) AS il
           JOIN pragma_index_info(il.name) AS ii
           WHERE il.origin = 'c'
           ORDER BY il.name, ii.seqno"#
    }

    fn read_column(&self, row: &QueryResult) -> Result<LiveColumn, DbErr> {
        let dflt: Option<String> = row.try_get("", "dflt_value")?;
        Ok(LiveColumn {
            name: row.try_get("", "name")?,
            declared_type: row.try_get("", "declared_type")?,
            nullable: row.try_get::<i64>("", "not_null")? == 0,
            default_value: dflt.map(unquote_default),
            is_primary: row.try_get::<i64>("", "pk")? > 0,
        })
    }

    fn read_index_column(&self, row: &QueryResult) -> Result<IndexColumnRow, DbErr> {
        Ok((
            row.try_get("", "index_name")?,
            row.try_get::<i64>("", "is_unique")? != 0,
            row.try_get("", "column_name")?,
        ))
    }
}

/// pragma_table_info reports string defaults with their SQL quotes.
fn unquote_default(raw: String) -> String {
    raw.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
        .unwrap_or(raw)
}
