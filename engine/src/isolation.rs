//! Tenant isolation: the only place a (project, logical name) pair becomes a
//! physical identifier.
//!
//! Physical names are always recomputed from the registry row; they are never
//! stored and never returned to callers.

use sea_orm::ConnectionTrait;
use std::fmt;
use uuid::Uuid;

use crate::entity::project_database;
use crate::error::{EngineError, EngineResult};
use crate::model::{ProjectId, TableStructure};
use crate::registry;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Lowercase, replace runs of anything outside `[a-z0-9_]` with `_`,
/// collapse repeated underscores, trim underscores at both ends.
pub fn sanitize(basename: &str) -> String {
    let mut out = String::with_capacity(basename.len());
    let mut last_underscore = false;
    for ch in basename.to_lowercase().chars() {
        let c = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '_'
        };
        if c == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(c);
            last_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// A backing-store table identifier. Only constructed by [`physical_table_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalName(String);

impl PhysicalName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn project_prefix(project: ProjectId) -> String {
    format!("p{project}_")
}

/// `"p" + projectId + "_" + sanitize(basename)`.
pub fn physical_table_name(project: ProjectId, basename: &str) -> EngineResult<PhysicalName> {
    let base = sanitize(basename);
    if base.is_empty() {
        return Err(EngineError::invalid(
            "name",
            format!("'{basename}' does not contain any usable characters"),
        ));
    }
    let name = format!("{}{base}", project_prefix(project));
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::invalid(
            "name",
            format!("table name '{basename}' is too long for project {project}"),
        ));
    }
    Ok(PhysicalName(name))
}

/// Index names are global per schema in both backends, so they carry the table's name.
pub fn physical_index_name(table: &PhysicalName, index: &str) -> EngineResult<String> {
    let base = sanitize(index);
    if base.is_empty() {
        return Err(EngineError::invalid(
            "indexName",
            format!("'{index}' does not contain any usable characters"),
        ));
    }
    let name = format!("{table}_{base}");
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::invalid(
            "indexName",
            format!("index name '{index}' is too long"),
        ));
    }
    Ok(name)
}

/// Inverse of [`physical_index_name`]; `None` for indexes the engine did not create.
pub fn logical_index_name(table: &PhysicalName, physical_index: &str) -> Option<String> {
    physical_index
        .strip_prefix(&format!("{table}_"))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

/// Prefix assertion on derived names. Authorization itself goes through the registry.
pub fn is_project_table(physical_name: &str, project: ProjectId) -> bool {
    physical_name.starts_with(&project_prefix(project))
}

/// Project id embedded in a name shaped like a physical identifier (`p<digits>_...`).
fn embedded_project(name: &str) -> Option<i64> {
    let rest = name.strip_prefix('p')?;
    let (digits, tail) = rest.split_once('_')?;
    if digits.is_empty() || tail.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ---------- registry-backed resolution ----------

/// A registered table of the requesting project, with its derived physical name.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub record: project_database::Model,
    pub physical: PhysicalName,
    pub structure: TableStructure,
}

impl ResolvedTable {
    pub fn logical_name(&self) -> &str {
        &self.record.table_name
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }
}

fn into_resolved(project: ProjectId, record: project_database::Model) -> EngineResult<ResolvedTable> {
    if record.project_id != project.get() {
        tracing::warn!(
            project = %project,
            owner = record.project_id,
            table = %record.table_name,
            "registry row belongs to another project"
        );
        return Err(EngineError::Forbidden(format!(
            "table '{}' does not belong to project {project}",
            record.table_name
        )));
    }
    let physical = physical_table_name(project, &record.table_name)?;
    if !is_project_table(physical.as_str(), project) {
        tracing::warn!(project = %project, physical = %physical, "derived name failed the prefix assertion");
        return Err(EngineError::Forbidden(format!(
            "table '{}' does not belong to project {project}",
            record.table_name
        )));
    }
    let structure = registry::decode_structure(&record)?;
    Ok(ResolvedTable {
        record,
        physical,
        structure,
    })
}

/// Resolve a logical table name within a project.
///
/// Fails with `NotFound` for unregistered names; the physical name is never guessed.
/// A name that looks like another project's physical table is `Forbidden`.
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    project: ProjectId,
    table_name: &str,
) -> EngineResult<ResolvedTable> {
    match registry::find(conn, project, table_name).await? {
        Some(record) => into_resolved(project, record),
        None => {
            if let Some(owner) = embedded_project(table_name)
                && owner != project.get()
            {
                tracing::warn!(project = %project, requested = %table_name, "cross-project table reference rejected");
                return Err(EngineError::Forbidden(format!(
                    "table '{table_name}' is outside project {project}"
                )));
            }
            Err(EngineError::NotFound(format!(
                "table '{table_name}' is not registered in project {project}"
            )))
        }
    }
}
