use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::{EngineError, EngineResult};

/// A row as exchanged with callers: column name to JSON value.
pub type Record = Map<String, JsonValue>;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

// ---------- project ----------

/// Tenant identifier. Always positive so it can be embedded in physical names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(i64);

impl ProjectId {
    pub fn new(id: i64) -> EngineResult<Self> {
        if id <= 0 {
            return Err(EngineError::invalid(
                "projectId",
                "project id must be a positive integer",
            ));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------- logical types ----------

/// Closed set of column types a tenant can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Text,
    Integer,
    #[serde(alias = "decimal")]
    Number,
    Boolean,
    Date,
    Datetime,
    Json,
}

impl LogicalType {
    /// Parse a user-supplied type name. `decimal` is an alias of `number`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" => Some(LogicalType::String),
            "text" => Some(LogicalType::Text),
            "integer" => Some(LogicalType::Integer),
            "number" | "decimal" => Some(LogicalType::Number),
            "boolean" => Some(LogicalType::Boolean),
            "date" => Some(LogicalType::Date),
            "datetime" => Some(LogicalType::Datetime),
            "json" => Some(LogicalType::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Text => "text",
            LogicalType::Integer => "integer",
            LogicalType::Number => "number",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Datetime => "datetime",
            LogicalType::Json => "json",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- definitions (input) ----------

fn default_true() -> bool {
    true
}

/// Column as proposed by a caller. `data_type` is checked by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_foreign: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary: false,
            is_foreign: false,
            default_value: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn foreign(mut self) -> Self {
        self.is_foreign = true;
        self
    }

    pub fn default_value(mut self, value: JsonValue) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub generate_api: bool,
    #[serde(default)]
    pub is_built_in: bool,
    #[serde(default)]
    pub is_generated: bool,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            columns,
            timestamps: false,
            soft_delete: false,
            generate_api: false,
            is_built_in: false,
            is_generated: false,
        }
    }
}

/// Column after validation: the type is resolved to the closed enum.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedColumn {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub is_primary: bool,
    pub is_foreign: bool,
    pub default_value: Option<JsonValue>,
}

/// Only produced by `validate::validate`, so holding one means every check passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDefinition {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) columns: Vec<ValidatedColumn>,
    pub(crate) timestamps: bool,
    pub(crate) soft_delete: bool,
    pub(crate) generate_api: bool,
    pub(crate) is_built_in: bool,
    pub(crate) is_generated: bool,
}

impl ValidatedDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ValidatedColumn] {
        &self.columns
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    pub fn generate_api(&self) -> bool {
        self.generate_api
    }
}

// ---------- cached structure ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub is_primary: bool,
    #[serde(default)]
    pub is_foreign: bool,
    /// Default expression as reported by the live catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Column layout of a table, as stored in the registry `structure` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStructure {
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub soft_delete: bool,
}

impl TableStructure {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.is_primary)
    }

    /// Columns the engine writes itself (`created_at`, `updated_at`, `deleted_at`).
    pub fn is_system_column(&self, name: &str) -> bool {
        (self.timestamps && (name == CREATED_AT || name == UPDATED_AT))
            || (self.soft_delete && name == DELETED_AT)
    }

    /// Whether deletes can be soft: flag set and the column actually present.
    pub fn supports_soft_delete(&self) -> bool {
        self.soft_delete && self.column(DELETED_AT).is_some()
    }

    /// Compares what matters for record access: names, types, nullability, primary key.
    pub fn same_shape(&self, other: &TableStructure) -> bool {
        self.columns.len() == other.columns.len()
            && self.columns.iter().zip(other.columns.iter()).all(|(a, b)| {
                a.name == b.name
                    && a.logical_type == b.logical_type
                    && a.nullable == b.nullable
                    && a.is_primary == b.is_primary
            })
    }

    /// Human-readable list of differences, for drift reports.
    pub fn diff(&self, live: &TableStructure) -> Vec<String> {
        let mut out = Vec::new();
        for cached in &self.columns {
            match live.column(&cached.name) {
                None => out.push(format!("column '{}' is missing from the live table", cached.name)),
                Some(l) => {
                    if l.logical_type != cached.logical_type {
                        out.push(format!(
                            "column '{}' is {} live but {} in the registry",
                            cached.name, l.logical_type, cached.logical_type
                        ));
                    }
                    if l.nullable != cached.nullable {
                        out.push(format!("column '{}' nullability differs", cached.name));
                    }
                    if l.is_primary != cached.is_primary {
                        out.push(format!("column '{}' primary key flag differs", cached.name));
                    }
                }
            }
        }
        for l in &live.columns {
            if self.column(&l.name).is_none() {
                out.push(format!("column '{}' exists live but not in the registry", l.name));
            }
        }
        if out.is_empty() && !self.same_shape(live) {
            out.push("column order differs".to_string());
        }
        out
    }
}

// ---------- alterations ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAlteration {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub default_value: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alterations {
    #[serde(default)]
    pub add_columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    #[serde(default)]
    pub alter_columns: Vec<ColumnAlteration>,
}

impl Alterations {
    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty() && self.drop_columns.is_empty() && self.alter_columns.is_empty()
    }
}

// ---------- queries ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: JsonValue,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationOptions {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: Option<OrderDirection>,
}

impl PaginationOptions {
    pub fn page(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
            ..Default::default()
        }
    }
}

// ---------- record options ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Soft,
    Hard,
}

impl std::str::FromStr for DeleteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(DeleteMode::Soft),
            "hard" => Ok(DeleteMode::Hard),
            other => Err(format!("unknown delete mode '{other}' (expected soft or hard)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// None: soft on tables created with `softDelete` (per config), hard otherwise.
    #[serde(default)]
    pub mode: Option<DeleteMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    /// Soft-deleted rows are hidden unless this is set.
    #[serde(default)]
    pub include_deleted: bool,
}

/// What happens to a table's generated API rows when the table is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiCascade {
    #[default]
    Deactivate,
    Delete,
}
