use sea_orm::{DbErr, RuntimeErr, SqlErr};
use serde::Serialize;
use std::fmt;

/// One problem found while checking a definition or a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("schema drift: {0}")]
    SchemaDrift(String),

    /// `context` is safe to show to callers; `source` may carry SQL or physical names.
    #[error("database error: {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: DbErr,
    },

    #[error("operation timed out after {0} ms")]
    Timeout(u64),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation(vec![ValidationIssue::new(field, message)])
    }

    /// Wrap a store failure. Unique violations and duplicate objects become `Conflict`.
    pub fn from_db(context: impl Into<String>, source: DbErr) -> Self {
        let context = context.into();
        if is_conflict(&source) {
            tracing::debug!(error = %source, "store reported a conflict");
            return EngineError::Conflict(context);
        }
        tracing::error!(context = %context, error = %source, "store operation failed");
        EngineError::Database { context, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::SchemaDrift(_) => "SCHEMA_DRIFT",
            EngineError::Database { .. } | EngineError::Timeout(_) => "DATABASE_ERROR",
        }
    }

    /// Client-facing description. Never includes the raw driver error.
    pub fn descriptor(&self) -> ErrorDescriptor {
        let (message, details) = match self {
            EngineError::Validation(issues) => {
                ("validation failed".to_string(), Some(issues.clone()))
            }
            EngineError::Conflict(msg)
            | EngineError::NotFound(msg)
            | EngineError::Forbidden(msg)
            | EngineError::SchemaDrift(msg) => (msg.clone(), None),
            EngineError::Database { context, .. } => (context.clone(), None),
            EngineError::Timeout(ms) => (format!("operation timed out after {ms} ms"), None),
        };
        ErrorDescriptor {
            code: self.code(),
            message,
            details,
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            EngineError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

/// PostgreSQL duplicate_table / duplicate_object.
const DUPLICATE_OBJECT_STATES: [&str; 2] = ["42P07", "42710"];

fn sqlstate(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => e
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned()),
        _ => None,
    }
}

fn is_conflict(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || sqlstate(err).is_some_and(|code| DUPLICATE_OBJECT_STATES.contains(&code.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
}
