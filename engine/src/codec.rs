//! JSON <-> store value conversion, driven by the column's logical type.
//!
//! PostgreSQL gets native typed parameters. SQLite has no date, decimal or
//! json storage classes, so those travel as text / real there. Datetimes are
//! stored there as fixed-width UTC text with milliseconds, the same shape the
//! system-column defaults produce, so text comparison follows time order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use sea_orm::sea_query::{Expr, SimpleExpr, Value};
use sea_orm::{DbBackend, DbErr, QueryResult};
use serde_json::{Number, Value as JsonValue};

use crate::model::{ColumnSchema, LogicalType, Record, TableStructure};

// ---------- parsing helpers ----------

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|n| n.and_utc())
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// `YYYY-MM-DDTHH:MM:SS.fffZ`, the SQLite storage form of a datetime.
pub fn store_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQLite's clock in the [`store_datetime`] shape.
pub const SQLITE_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// The store's current time, written the way datetime columns hold it.
pub fn current_timestamp(backend: DbBackend) -> SimpleExpr {
    match backend {
        DbBackend::Sqlite => Expr::cust(SQLITE_NOW),
        _ => Expr::current_timestamp().into(),
    }
}

fn parse_integer(v: &JsonValue) -> Option<i64> {
    match v {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_decimal(v: &JsonValue) -> Option<Decimal> {
    match v {
        JsonValue::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        JsonValue::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

/// Whether a non-null JSON value is acceptable for the logical type.
pub fn json_matches(logical_type: LogicalType, value: &JsonValue) -> bool {
    match logical_type {
        LogicalType::String | LogicalType::Text => value.is_string(),
        LogicalType::Integer => parse_integer(value).is_some(),
        LogicalType::Number => parse_decimal(value).is_some(),
        LogicalType::Boolean => value.is_boolean(),
        LogicalType::Date => value.as_str().and_then(parse_date).is_some(),
        LogicalType::Datetime => value.as_str().and_then(parse_datetime).is_some(),
        LogicalType::Json => true,
    }
}

// ---------- encoding ----------

fn null_of(backend: DbBackend, logical_type: LogicalType) -> Value {
    let pg = backend == DbBackend::Postgres;
    match logical_type {
        LogicalType::String | LogicalType::Text => Value::String(None),
        LogicalType::Integer => Value::BigInt(None),
        LogicalType::Number if pg => Value::Decimal(None),
        LogicalType::Number => Value::Double(None),
        LogicalType::Boolean => Value::Bool(None),
        LogicalType::Date if pg => Value::ChronoDate(None),
        LogicalType::Datetime if pg => Value::ChronoDateTimeUtc(None),
        LogicalType::Json if pg => Value::Json(None),
        LogicalType::Date | LogicalType::Datetime | LogicalType::Json => Value::String(None),
    }
}

/// Convert a caller-supplied JSON value into a bind parameter for `column`.
/// The error is a short message meant for a `ValidationIssue`.
pub fn to_value(
    backend: DbBackend,
    logical_type: LogicalType,
    value: &JsonValue,
) -> Result<Value, String> {
    if value.is_null() {
        return Ok(null_of(backend, logical_type));
    }
    let pg = backend == DbBackend::Postgres;
    let mismatch = || format!("expected a {logical_type} value");

    let v = match logical_type {
        LogicalType::String | LogicalType::Text => {
            Value::from(value.as_str().ok_or_else(mismatch)?.to_string())
        }
        LogicalType::Integer => Value::BigInt(Some(parse_integer(value).ok_or_else(mismatch)?)),
        LogicalType::Number => {
            let d = parse_decimal(value).ok_or_else(mismatch)?;
            if pg {
                Value::from(d)
            } else {
                Value::Double(Some(d.to_f64().ok_or_else(mismatch)?))
            }
        }
        LogicalType::Boolean => Value::Bool(Some(value.as_bool().ok_or_else(mismatch)?)),
        LogicalType::Date => {
            let d = value.as_str().and_then(parse_date).ok_or_else(mismatch)?;
            if pg {
                Value::from(d)
            } else {
                Value::from(d.format("%Y-%m-%d").to_string())
            }
        }
        LogicalType::Datetime => {
            let dt = value.as_str().and_then(parse_datetime).ok_or_else(mismatch)?;
            if pg {
                Value::from(dt)
            } else {
                Value::from(store_datetime(dt))
            }
        }
        LogicalType::Json => {
            if pg {
                Value::from(value.clone())
            } else {
                Value::from(value.to_string())
            }
        }
    };
    Ok(v)
}

// ---------- decoding ----------

fn float_json(f: f64) -> JsonValue {
    Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

/// Read one column of a result row as JSON.
pub fn decode_column(
    backend: DbBackend,
    row: &QueryResult,
    column: &ColumnSchema,
) -> Result<JsonValue, DbErr> {
    let name = column.name.as_str();
    let pg = backend == DbBackend::Postgres;

    let value = match column.logical_type {
        LogicalType::String | LogicalType::Text => row
            .try_get::<Option<String>>("", name)?
            .map(JsonValue::String),
        LogicalType::Integer => row.try_get::<Option<i64>>("", name)?.map(JsonValue::from),
        LogicalType::Number if pg => row
            .try_get::<Option<Decimal>>("", name)?
            .and_then(|d| d.to_f64())
            .map(float_json),
        LogicalType::Number => row.try_get::<Option<f64>>("", name)?.map(float_json),
        LogicalType::Boolean => row.try_get::<Option<bool>>("", name)?.map(JsonValue::Bool),
        LogicalType::Date if pg => row
            .try_get::<Option<NaiveDate>>("", name)?
            .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string())),
        LogicalType::Datetime if pg => row
            .try_get::<Option<DateTime<Utc>>>("", name)?
            .map(|dt| JsonValue::String(format_datetime(dt))),
        LogicalType::Json if pg => row.try_get::<Option<JsonValue>>("", name)?,
        LogicalType::Date => row
            .try_get::<Option<String>>("", name)?
            .map(JsonValue::String),
        LogicalType::Datetime => row.try_get::<Option<String>>("", name)?.map(|s| {
            JsonValue::String(parse_datetime(&s).map(format_datetime).unwrap_or(s))
        }),
        LogicalType::Json => row
            .try_get::<Option<String>>("", name)?
            .map(|s| serde_json::from_str(&s).unwrap_or(JsonValue::String(s))),
    };
    Ok(value.unwrap_or(JsonValue::Null))
}

/// Decode a full row in structure order.
pub fn decode_row(
    backend: DbBackend,
    row: &QueryResult,
    structure: &TableStructure,
) -> Result<Record, DbErr> {
    let mut record = Record::new();
    for column in &structure.columns {
        record.insert(column.name.clone(), decode_column(backend, row, column)?);
    }
    Ok(record)
}
