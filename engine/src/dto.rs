use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::{project_api, project_database};
use crate::error::{EngineError, EngineResult, ErrorDescriptor};
use crate::model::{DeleteMode, ProjectId, TableStructure};
use crate::registry;

// ---------- tables ----------

/// Registry view of a table. Only logical names appear here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub table_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_built_in: bool,
    pub is_generated: bool,
    pub api_enabled: bool,
    pub structure: TableStructure,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<project_database::Model> for TableInfo {
    type Error = EngineError;

    fn try_from(m: project_database::Model) -> EngineResult<Self> {
        let structure = registry::decode_structure(&m)?;
        Ok(Self {
            id: m.id,
            project_id: ProjectId::new(m.project_id)?,
            table_name: m.table_name,
            display_name: m.display_name,
            description: m.description,
            is_built_in: m.is_built_in,
            is_generated: m.is_generated,
            api_enabled: m.api_enabled,
            structure,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSummary {
    pub table_name: String,
    pub apis_deactivated: u64,
    pub apis_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

// ---------- apis ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfo {
    pub id: Uuid,
    pub api_path: String,
    pub method: String,
    pub table_id: Option<Uuid>,
    pub is_custom: bool,
    pub is_active: bool,
    pub configuration: JsonValue,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<project_api::Model> for ApiInfo {
    fn from(m: project_api::Model) -> Self {
        let configuration =
            serde_json::from_str(&m.configuration).unwrap_or(JsonValue::String(m.configuration));
        Self {
            id: m.id,
            api_path: m.api_path,
            method: m.method,
            table_id: m.table_id,
            is_custom: m.is_custom,
            is_active: m.is_active,
            configuration,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

// ---------- records ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedRecord {
    pub id: JsonValue,
    pub mode: DeleteMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, page_size: u64, total: u64) -> Self {
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

// ---------- envelope ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

/// Uniform result of every engine operation.
///
/// `{"success": true, "data": ..., "meta": {...}}` or
/// `{"success": false, "error": {"code", "message", "details"}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult<T> {
    Success {
        success: bool,
        data: T,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    Failure {
        success: bool,
        error: ErrorDescriptor,
    },
}

impl<T> QueryResult<T> {
    pub fn ok(data: T) -> Self {
        QueryResult::Success {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn with_meta(data: T, meta: Meta) -> Self {
        QueryResult::Success {
            success: true,
            data,
            meta: Some(meta),
        }
    }

    pub fn err(error: &EngineError) -> Self {
        QueryResult::Failure {
            success: false,
            error: error.descriptor(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            QueryResult::Success { data, .. } => Some(data),
            QueryResult::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            QueryResult::Success { data, .. } => Some(data),
            QueryResult::Failure { .. } => None,
        }
    }

    pub fn meta(&self) -> Option<&Meta> {
        match self {
            QueryResult::Success { meta, .. } => meta.as_ref(),
            QueryResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match self {
            QueryResult::Success { .. } => None,
            QueryResult::Failure { error, .. } => Some(error),
        }
    }

    /// Error code of a failed result, e.g. `"CONFLICT"`.
    pub fn error_code(&self) -> Option<&'static str> {
        self.error().map(|e| e.code)
    }
}

impl<T> From<EngineResult<T>> for QueryResult<T> {
    fn from(result: EngineResult<T>) -> Self {
        match result {
            Ok(data) => QueryResult::ok(data),
            Err(e) => QueryResult::err(&e),
        }
    }
}

impl<T> From<EngineResult<Page<T>>> for QueryResult<Vec<T>> {
    fn from(result: EngineResult<Page<T>>) -> Self {
        match result {
            Ok(page) => QueryResult::with_meta(
                page.data,
                Meta {
                    pagination: Some(page.pagination),
                },
            ),
            Err(e) => QueryResult::err(&e),
        }
    }
}
