//! Filter, ordering and pagination translation for record queries.
//!
//! Filters only reach the store as bound values behind known column names.

use sea_orm::DbBackend;
use sea_orm::sea_query::{
    Alias, BinOper, Cond, Condition, Expr, Func, Order, Query, SelectStatement,
    SimpleExpr, Value,
};
use serde_json::Value as JsonValue;

use crate::codec;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ValidationIssue};
use crate::isolation::PhysicalName;
use crate::model::{
    ColumnSchema, DELETED_AT, FilterOperator, LogicalType, OrderDirection, PaginationOptions,
    QueryFilter, ReadOptions, TableStructure,
};

const MAX_OFFSET: u64 = i64::MAX as u64;

/// Resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub page_size: u64,
}

impl PageWindow {
    /// Page defaults to 1; page size defaults to the configured size and is capped.
    /// Pages past the last addressable offset are pulled back to it, since the
    /// store binds LIMIT and OFFSET as signed 64-bit integers.
    pub fn resolve(options: &PaginationOptions, config: &EngineConfig) -> Self {
        let page_size = options
            .page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.clamp(1, MAX_OFFSET));
        let last_page = MAX_OFFSET / page_size + 1;
        let page = options.page.unwrap_or(1).clamp(1, last_page);
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

// ---------- filters ----------

fn col(column: &ColumnSchema) -> Expr {
    Expr::col(Alias::new(column.name.as_str()))
}

/// Translate a SQL LIKE pattern into a GLOB pattern (case-sensitive on SQLite).
pub fn like_to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            c => out.push(c),
        }
    }
    out
}

fn predicate(
    backend: DbBackend,
    column: &ColumnSchema,
    filter: &QueryFilter,
) -> Result<SimpleExpr, String> {
    let bind = |v: &JsonValue| -> Result<Value, String> {
        if v.is_null() {
            return Err("null is only allowed with eq and neq".to_string());
        }
        codec::to_value(backend, column.logical_type, v)
    };
    let text_pattern = || -> Result<&str, String> {
        if !matches!(column.logical_type, LogicalType::String | LogicalType::Text) {
            return Err(format!("{:?} requires a string or text column", filter.operator).to_lowercase());
        }
        filter
            .value
            .as_str()
            .ok_or_else(|| "pattern must be a string".to_string())
    };

    let expr = match filter.operator {
        FilterOperator::Eq if filter.value.is_null() => col(column).is_null(),
        FilterOperator::Neq if filter.value.is_null() => col(column).is_not_null(),
        FilterOperator::Eq => col(column).eq(bind(&filter.value)?),
        FilterOperator::Neq => col(column).ne(bind(&filter.value)?),
        FilterOperator::Gt => col(column).gt(bind(&filter.value)?),
        FilterOperator::Gte => col(column).gte(bind(&filter.value)?),
        FilterOperator::Lt => col(column).lt(bind(&filter.value)?),
        FilterOperator::Lte => col(column).lte(bind(&filter.value)?),
        FilterOperator::Like => {
            let pattern = text_pattern()?;
            if backend == DbBackend::Sqlite {
                col(column).binary(BinOper::Custom("GLOB"), Value::from(like_to_glob(pattern)))
            } else {
                col(column).like(pattern)
            }
        }
        FilterOperator::Ilike => {
            let pattern = text_pattern()?.to_lowercase();
            Expr::expr(Func::lower(col(column))).like(pattern)
        }
        FilterOperator::In => {
            let items = filter
                .value
                .as_array()
                .ok_or_else(|| "in expects an array".to_string())?;
            if items.is_empty() {
                return Err("in expects at least one value".to_string());
            }
            let values = items.iter().map(bind).collect::<Result<Vec<_>, _>>()?;
            col(column).is_in(values)
        }
        FilterOperator::Between => match filter.value.as_array().map(Vec::as_slice) {
            Some([low, high]) => col(column).between(bind(low)?, bind(high)?),
            _ => return Err("between expects an array of exactly two values".to_string()),
        },
    };
    Ok(expr)
}

/// AND of all filters. Every problem is reported, not just the first.
pub fn filter_condition(
    backend: DbBackend,
    structure: &TableStructure,
    filters: &[QueryFilter],
) -> EngineResult<Condition> {
    let mut cond = Cond::all();
    let mut issues = Vec::new();
    for (i, filter) in filters.iter().enumerate() {
        let field = format!("filters[{i}]");
        let Some(column) = structure.column(&filter.field) else {
            issues.push(ValidationIssue::new(field, format!("unknown column '{}'", filter.field)));
            continue;
        };
        match predicate(backend, column, filter) {
            Ok(expr) => cond = cond.add(expr),
            Err(msg) => issues.push(ValidationIssue::new(field, msg)),
        }
    }
    if issues.is_empty() {
        Ok(cond)
    } else {
        Err(EngineError::Validation(issues))
    }
}

/// Hides soft-deleted rows unless asked not to.
pub fn visibility(structure: &TableStructure, read: ReadOptions) -> Option<SimpleExpr> {
    (structure.supports_soft_delete() && !read.include_deleted)
        .then(|| Expr::col(Alias::new(DELETED_AT)).is_null())
}

/// Primary key equality, bound with the key's type.
pub fn key_condition(
    backend: DbBackend,
    structure: &TableStructure,
    id: &JsonValue,
) -> EngineResult<SimpleExpr> {
    let pk = structure
        .primary_key()
        .ok_or_else(|| EngineError::SchemaDrift("table has no primary key".to_string()))?;
    if id.is_null() {
        return Err(EngineError::invalid("id", "a record id is required"));
    }
    let value = codec::to_value(backend, pk.logical_type, id)
        .map_err(|msg| EngineError::invalid("id", msg))?;
    Ok(col(pk).eq(value))
}

// ---------- ordering ----------

/// Ordering columns: the requested column (if any) then the primary key as tiebreak.
pub fn ordering(
    structure: &TableStructure,
    options: &PaginationOptions,
) -> EngineResult<Vec<(String, Order)>> {
    let direction = match options.order_direction.unwrap_or_default() {
        OrderDirection::Asc => Order::Asc,
        OrderDirection::Desc => Order::Desc,
    };
    let pk = structure.primary_key().map(|c| c.name.clone());

    let mut out = Vec::new();
    match &options.order_by {
        Some(name) => {
            if structure.column(name).is_none() {
                return Err(EngineError::invalid("orderBy", format!("unknown column '{name}'")));
            }
            out.push((name.clone(), direction));
            if let Some(pk) = pk
                && pk != *name
            {
                out.push((pk, Order::Asc));
            }
        }
        None => {
            if let Some(pk) = pk {
                out.push((pk, direction));
            }
        }
    }
    Ok(out)
}

// ---------- statements ----------

pub fn select_page(
    table: &PhysicalName,
    structure: &TableStructure,
    cond: Condition,
    order: &[(String, Order)],
    window: PageWindow,
) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.columns(structure.columns.iter().map(|c| Alias::new(c.name.as_str())))
        .from(Alias::new(table.as_str()))
        .cond_where(cond);
    for (column, direction) in order {
        stmt.order_by(Alias::new(column.as_str()), direction.clone());
    }
    stmt.limit(window.page_size).offset(window.offset());
    stmt
}

pub fn count(table: &PhysicalName, cond: Condition) -> SelectStatement {
    Query::select()
        .expr_as(Expr::cust("COUNT(*)"), Alias::new("total"))
        .from(Alias::new(table.as_str()))
        .cond_where(cond)
        .to_owned()
}
