//! Row-level CRUD and filtered, paginated reads on registered tables.
//!
//! Every operation runs in its own transaction so the per-statement
//! timeout set by [`store::begin`] covers it.

use std::collections::HashSet;

use sea_orm::sea_query::{Alias, Cond, Expr, Query, ReturningClause, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr};
use serde_json::Value as JsonValue;

use crate::codec;
use crate::config::EngineConfig;
use crate::dto::{DeletedRecord, Page, PaginationMeta};
use crate::error::{EngineError, EngineResult, ValidationIssue};
use crate::isolation::{self, ResolvedTable};
use crate::model::{
    DELETED_AT, DeleteMode, DeleteOptions, LogicalType, PaginationOptions, ProjectId, QueryFilter,
    ReadOptions, Record, TableStructure, UPDATED_AT,
};
use crate::query::{self, PageWindow};
use crate::store;
use crate::validate::{RecordMode, check_record_keys, validate_record};

#[derive(Clone)]
pub struct RecordStore {
    db: DatabaseConnection,
    config: EngineConfig,
}

fn returning(structure: &TableStructure) -> ReturningClause {
    Query::returning().columns(structure.columns.iter().map(|c| Alias::new(c.name.as_str())))
}

fn dedup(issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|i| seen.insert((i.field.clone(), i.message.clone())))
        .collect()
}

/// Bind every writable key of `data`. Keys already rejected by the key checks are skipped.
fn bind_values(
    backend: DbBackend,
    structure: &TableStructure,
    data: &Record,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<(Alias, SimpleExpr)> {
    let mut out = Vec::with_capacity(data.len());
    for (key, value) in data {
        let Some(column) = structure.column(key) else { continue };
        if structure.is_system_column(key) {
            continue;
        }
        if value.is_null() && !column.nullable {
            issues.push(ValidationIssue::new(key.clone(), "column does not accept null"));
            continue;
        }
        match codec::to_value(backend, column.logical_type, value) {
            Ok(v) => out.push((Alias::new(key.as_str()), v.into())),
            Err(msg) => issues.push(ValidationIssue::new(key.clone(), msg)),
        }
    }
    out
}

fn now(backend: DbBackend) -> SimpleExpr {
    codec::current_timestamp(backend)
}

impl RecordStore {
    pub fn new(db: DatabaseConnection, config: EngineConfig) -> Self {
        Self { db, config }
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    fn decode(&self, table: &ResolvedTable, row: &sea_orm::QueryResult) -> EngineResult<Record> {
        codec::decode_row(self.backend(), row, &table.structure).map_err(|e| {
            EngineError::from_db(format!("could not read a row of '{}'", table.logical_name()), e)
        })
    }

    // ---------- writes ----------

    /// Insert one row. Unknown keys are always rejected; `schema`, when given,
    /// additionally checks value types, nullability and required columns.
    pub async fn insert_record(
        &self,
        project: ProjectId,
        table_name: &str,
        data: &Record,
        schema: Option<&TableStructure>,
    ) -> EngineResult<Record> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;

        let mut issues = check_record_keys(&table.structure, data, RecordMode::Insert);
        if let Some(schema) = schema
            && let Err(more) = validate_record(schema, data, RecordMode::Insert)
        {
            issues.extend(more);
        }
        let values = bind_values(backend, &table.structure, data, &mut issues);
        if !issues.is_empty() {
            return Err(EngineError::Validation(dedup(issues)));
        }

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(table.physical.as_str()));
        if values.is_empty() {
            stmt.or_default_values();
        } else {
            let (columns, exprs): (Vec<_>, Vec<_>) = values.into_iter().unzip();
            stmt.columns(columns);
            stmt.values(exprs)
                .map_err(|e| EngineError::invalid("data", e.to_string()))?;
        }
        stmt.returning(returning(&table.structure));

        let row = txn
            .query_one(backend.build(&stmt))
            .await
            .map_err(|e| EngineError::from_db(format!("could not insert into '{table_name}'"), e))?
            .ok_or_else(|| EngineError::Database {
                context: format!("could not insert into '{table_name}'"),
                source: DbErr::RecordNotInserted,
            })?;
        store::commit(txn).await?;
        let record = self.decode(&table, &row)?;
        tracing::debug!(project = %project, table = %table_name, "record inserted");
        Ok(record)
    }

    /// Update columns of one visible row. The primary key cannot change.
    pub async fn update_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        data: &Record,
    ) -> EngineResult<Record> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;

        let mut issues = check_record_keys(&table.structure, data, RecordMode::Update);
        let mut values = bind_values(backend, &table.structure, data, &mut issues);
        if !issues.is_empty() {
            return Err(EngineError::Validation(dedup(issues)));
        }
        if table.structure.timestamps {
            values.push((Alias::new(UPDATED_AT), now(backend)));
        }

        let mut cond = Cond::all().add(query::key_condition(backend, &table.structure, id)?);
        if let Some(visible) = query::visibility(&table.structure, ReadOptions::default()) {
            cond = cond.add(visible);
        }

        let stmt = Query::update()
            .table(Alias::new(table.physical.as_str()))
            .values(values)
            .cond_where(cond)
            .returning(returning(&table.structure))
            .to_owned();

        let row = txn
            .query_one(backend.build(&stmt))
            .await
            .map_err(|e| EngineError::from_db(format!("could not update '{table_name}'"), e))?
            .ok_or_else(|| not_found(table_name, id))?;
        store::commit(txn).await?;
        let record = self.decode(&table, &row)?;
        tracing::debug!(project = %project, table = %table_name, "record updated");
        Ok(record)
    }

    /// Delete one row. Without an explicit mode, soft-delete tables use the
    /// configured default and all other tables delete for real.
    pub async fn delete_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        options: DeleteOptions,
    ) -> EngineResult<DeletedRecord> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;
        let soft_capable = table.structure.supports_soft_delete();

        let mode = match options.mode {
            Some(DeleteMode::Soft) if !soft_capable => {
                return Err(EngineError::invalid(
                    "mode",
                    format!("table '{table_name}' was not created with soft delete"),
                ));
            }
            Some(mode) => mode,
            None if soft_capable => self.config.soft_delete_default,
            None => DeleteMode::Hard,
        };

        let key = query::key_condition(backend, &table.structure, id)?;
        let stmt = match mode {
            DeleteMode::Soft => {
                let mut values = vec![(Alias::new(DELETED_AT), now(backend))];
                if table.structure.timestamps {
                    values.push((Alias::new(UPDATED_AT), now(backend)));
                }
                let stmt = Query::update()
                    .table(Alias::new(table.physical.as_str()))
                    .values(values)
                    .cond_where(Cond::all().add(key).add(Expr::col(Alias::new(DELETED_AT)).is_null()))
                    .to_owned();
                backend.build(&stmt)
            }
            DeleteMode::Hard => {
                let stmt = Query::delete()
                    .from_table(Alias::new(table.physical.as_str()))
                    .cond_where(key)
                    .to_owned();
                backend.build(&stmt)
            }
        };

        let result = txn
            .execute(stmt)
            .await
            .map_err(|e| EngineError::from_db(format!("could not delete from '{table_name}'"), e))?;
        if result.rows_affected() == 0 {
            return Err(not_found(table_name, id));
        }
        store::commit(txn).await?;
        tracing::debug!(project = %project, table = %table_name, ?mode, "record deleted");
        Ok(DeletedRecord {
            id: id.clone(),
            mode,
        })
    }

    /// Clear `deleted_at` on a soft-deleted row.
    pub async fn restore_record(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
    ) -> EngineResult<Record> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;
        if !table.structure.supports_soft_delete() {
            return Err(EngineError::invalid(
                "mode",
                format!("table '{table_name}' was not created with soft delete"),
            ));
        }

        let cleared = codec::to_value(backend, LogicalType::Datetime, &JsonValue::Null)
            .map_err(|msg| EngineError::invalid(DELETED_AT, msg))?;
        let mut values = vec![(Alias::new(DELETED_AT), SimpleExpr::from(cleared))];
        if table.structure.timestamps {
            values.push((Alias::new(UPDATED_AT), now(backend)));
        }
        let cond = Cond::all()
            .add(query::key_condition(backend, &table.structure, id)?)
            .add(Expr::col(Alias::new(DELETED_AT)).is_not_null());

        let stmt = Query::update()
            .table(Alias::new(table.physical.as_str()))
            .values(values)
            .cond_where(cond)
            .returning(returning(&table.structure))
            .to_owned();

        let row = txn
            .query_one(backend.build(&stmt))
            .await
            .map_err(|e| EngineError::from_db(format!("could not restore a row of '{table_name}'"), e))?
            .ok_or_else(|| {
                EngineError::NotFound(format!("no deleted record {id} in table '{table_name}'"))
            })?;
        store::commit(txn).await?;
        let record = self.decode(&table, &row)?;
        tracing::debug!(project = %project, table = %table_name, "record restored");
        Ok(record)
    }

    // ---------- reads ----------

    pub async fn get_record_by_id(
        &self,
        project: ProjectId,
        table_name: &str,
        id: &JsonValue,
        read: ReadOptions,
    ) -> EngineResult<Record> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;

        let mut cond = Cond::all().add(query::key_condition(backend, &table.structure, id)?);
        if let Some(visible) = query::visibility(&table.structure, read) {
            cond = cond.add(visible);
        }
        let stmt = Query::select()
            .columns(table.structure.columns.iter().map(|c| Alias::new(c.name.as_str())))
            .from(Alias::new(table.physical.as_str()))
            .cond_where(cond)
            .limit(1)
            .to_owned();

        let row = txn
            .query_one(backend.build(&stmt))
            .await
            .map_err(|e| EngineError::from_db(format!("could not read from '{table_name}'"), e))?
            .ok_or_else(|| not_found(table_name, id))?;
        store::commit(txn).await?;
        self.decode(&table, &row)
    }

    /// Filtered page of rows. Count and page use the same predicate inside one
    /// transaction, so `total` matches what paging through would return.
    pub async fn query_records(
        &self,
        project: ProjectId,
        table_name: &str,
        filters: &[QueryFilter],
        pagination: &PaginationOptions,
        read: ReadOptions,
    ) -> EngineResult<Page<Record>> {
        let backend = self.backend();
        let txn = store::begin(&self.db, &self.config).await?;
        let table = isolation::resolve(&txn, project, table_name).await?;

        let window = PageWindow::resolve(pagination, &self.config);
        let order = query::ordering(&table.structure, pagination)?;
        let mut cond = query::filter_condition(backend, &table.structure, filters)?;
        if let Some(visible) = query::visibility(&table.structure, read) {
            cond = cond.add(visible);
        }

        let read_err =
            |e: DbErr| EngineError::from_db(format!("could not read from '{table_name}'"), e);

        let total: i64 = match txn
            .query_one(backend.build(&query::count(&table.physical, cond.clone())))
            .await
            .map_err(read_err)?
        {
            Some(row) => row.try_get("", "total").map_err(read_err)?,
            None => 0,
        };
        let rows = txn
            .query_all(backend.build(&query::select_page(
                &table.physical,
                &table.structure,
                cond,
                &order,
                window,
            )))
            .await
            .map_err(read_err)?;
        store::commit(txn).await?;

        let data = rows
            .iter()
            .map(|row| self.decode(&table, row))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Page {
            data,
            pagination: PaginationMeta::new(window.page, window.page_size, total.max(0) as u64),
        })
    }
}

fn not_found(table_name: &str, id: &JsonValue) -> EngineError {
    EngineError::NotFound(format!("record {id} not found in table '{table_name}'"))
}
