//! DDL statement builders. Pure: nothing here touches a connection.
//!
//! | logical  | SQLite                        | PostgreSQL               |
//! |----------|-------------------------------|--------------------------|
//! | string   | varchar(255)                  | varchar(255)             |
//! | text     | text                          | text                     |
//! | integer  | bigint (integer when serial)  | bigint / bigserial       |
//! | number   | real(16, 4)                   | numeric(16, 4)           |
//! | boolean  | boolean                       | bool                     |
//! | date     | date_text                     | date                     |
//! | datetime | timestamp_with_timezone_text  | timestamp with time zone |
//! | json     | jsonb_text                    | jsonb                    |

use sea_orm::DbBackend;
use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, Index, IndexCreateStatement, IndexDropStatement, SimpleExpr, Table,
    TableAlterStatement, TableCreateStatement, TableDropStatement,
};
use serde_json::Value as JsonValue;

use crate::codec;
use crate::error::{EngineError, EngineResult};
use crate::isolation::PhysicalName;
use crate::model::{
    CREATED_AT, DELETED_AT, LogicalType, UPDATED_AT, ValidatedColumn, ValidatedDefinition,
};
use crate::validate::ValidatedAlteration;

fn apply_type(def: &mut ColumnDef, logical_type: LogicalType) {
    match logical_type {
        LogicalType::String => def.string_len(255),
        LogicalType::Text => def.text(),
        LogicalType::Integer => def.big_integer(),
        // sea-query refuses precision above 16 on SQLite
        LogicalType::Number => def.decimal_len(16, 4),
        LogicalType::Boolean => def.boolean(),
        LogicalType::Date => def.date(),
        LogicalType::Datetime => def.timestamp_with_time_zone(),
        LogicalType::Json => def.json_binary(),
    };
}

fn apply_default(
    backend: DbBackend,
    def: &mut ColumnDef,
    column: &str,
    logical_type: LogicalType,
    value: &JsonValue,
) -> EngineResult<()> {
    let v = codec::to_value(backend, logical_type, value)
        .map_err(|msg| EngineError::invalid(format!("{column}.defaultValue"), msg))?;
    def.default(v);
    Ok(())
}

pub fn column_def(backend: DbBackend, column: &ValidatedColumn) -> EngineResult<ColumnDef> {
    let mut def = ColumnDef::new(Alias::new(column.name.as_str()));
    apply_type(&mut def, column.logical_type);
    if column.is_primary {
        def.not_null().primary_key();
        if column.logical_type == LogicalType::Integer {
            def.auto_increment();
        }
    } else if column.nullable {
        def.null();
    } else {
        def.not_null();
    }
    if let Some(value) = &column.default_value {
        apply_default(backend, &mut def, &column.name, column.logical_type, value)?;
    }
    Ok(def)
}

/// Default for the managed timestamp columns. SQLite wants expression
/// defaults in parentheses.
fn system_clock(backend: DbBackend) -> SimpleExpr {
    match backend {
        DbBackend::Sqlite => Expr::cust(format!("({})", codec::SQLITE_NOW)),
        _ => codec::current_timestamp(backend),
    }
}

pub fn create_table(
    backend: DbBackend,
    table: &PhysicalName,
    definition: &ValidatedDefinition,
) -> EngineResult<TableCreateStatement> {
    let mut stmt = Table::create();
    stmt.table(Alias::new(table.as_str()));
    for column in definition.columns() {
        let mut def = column_def(backend, column)?;
        stmt.col(&mut def);
    }
    if definition.timestamps() {
        for name in [CREATED_AT, UPDATED_AT] {
            stmt.col(
                ColumnDef::new(Alias::new(name))
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(system_clock(backend)),
            );
        }
    }
    if definition.soft_delete() {
        stmt.col(
            ColumnDef::new(Alias::new(DELETED_AT))
                .timestamp_with_time_zone()
                .null(),
        );
    }
    Ok(stmt)
}

pub fn add_column(
    backend: DbBackend,
    table: &PhysicalName,
    column: &ValidatedColumn,
) -> EngineResult<TableAlterStatement> {
    let mut def = column_def(backend, column)?;
    Ok(Table::alter()
        .table(Alias::new(table.as_str()))
        .add_column(&mut def)
        .to_owned())
}

pub fn drop_column(table: &PhysicalName, column: &str) -> TableAlterStatement {
    Table::alter()
        .table(Alias::new(table.as_str()))
        .drop_column(Alias::new(column))
        .to_owned()
}

pub fn rename_column(table: &PhysicalName, from: &str, to: &str) -> TableAlterStatement {
    Table::alter()
        .table(Alias::new(table.as_str()))
        .rename_column(Alias::new(from), Alias::new(to))
        .to_owned()
}

/// Redefine type, nullability and default of an existing column.
/// SQLite has no ALTER COLUMN, so this is PostgreSQL only.
pub fn modify_column(
    backend: DbBackend,
    table: &PhysicalName,
    alteration: &ValidatedAlteration,
) -> EngineResult<TableAlterStatement> {
    if backend != DbBackend::Postgres {
        return Err(EngineError::invalid(
            format!("alterColumns.{}", alteration.name),
            "changing type, nullability or default is not supported on this backend",
        ));
    }
    let mut def = ColumnDef::new(Alias::new(alteration.name.as_str()));
    apply_type(&mut def, alteration.logical_type);
    if alteration.nullable {
        def.null();
    } else {
        def.not_null();
    }
    if let Some(value) = &alteration.default_value {
        apply_default(backend, &mut def, &alteration.name, alteration.logical_type, value)?;
    }
    Ok(Table::alter()
        .table(Alias::new(table.as_str()))
        .modify_column(&mut def)
        .to_owned())
}

pub fn drop_table(table: &PhysicalName) -> TableDropStatement {
    Table::drop().table(Alias::new(table.as_str())).to_owned()
}

pub fn create_index(
    table: &PhysicalName,
    index_name: &str,
    columns: &[String],
    unique: bool,
) -> IndexCreateStatement {
    let mut stmt = Index::create();
    stmt.name(index_name).table(Alias::new(table.as_str()));
    for column in columns {
        stmt.col(Alias::new(column.as_str()));
    }
    if unique {
        stmt.unique();
    }
    stmt
}

pub fn drop_index(table: &PhysicalName, index_name: &str) -> IndexDropStatement {
    Index::drop()
        .name(index_name)
        .table(Alias::new(table.as_str()))
        .to_owned()
}
