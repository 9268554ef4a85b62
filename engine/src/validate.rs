//! Table, alteration and record checks that run before any I/O.
//!
//! Every function here collects all violations instead of stopping at the
//! first one, so callers can report a complete list.

use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::codec::json_matches;
use crate::error::ValidationIssue;
use crate::model::{
    Alterations, CREATED_AT, DELETED_AT, LogicalType, Record, TableDefinition, TableStructure,
    UPDATED_AT, ValidatedColumn, ValidatedDefinition,
};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Check a proposed table definition.
pub fn validate(definition: &TableDefinition) -> Result<ValidatedDefinition, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. table name
    if !is_identifier(&definition.name) {
        issues.push(ValidationIssue::new(
            "name",
            format!(
                "table name '{}' must start with a letter and contain only letters, digits and underscores",
                definition.name
            ),
        ));
    }

    if definition.columns.is_empty() {
        issues.push(ValidationIssue::new("columns", "a table needs at least one column"));
    }

    // 2. column names: pattern and case-insensitive uniqueness
    let mut seen: HashSet<String> = HashSet::new();
    for (i, col) in definition.columns.iter().enumerate() {
        if !is_identifier(&col.name) {
            issues.push(ValidationIssue::new(
                format!("columns[{i}].name"),
                format!(
                    "column name '{}' must start with a letter and contain only letters, digits and underscores",
                    col.name
                ),
            ));
        }
        if !seen.insert(col.name.to_ascii_lowercase()) {
            issues.push(ValidationIssue::new(
                format!("columns[{i}].name"),
                format!("duplicate column name '{}'", col.name),
            ));
        }
    }

    // 3. logical types (and defaults, which need the type)
    let mut columns = Vec::with_capacity(definition.columns.len());
    for (i, col) in definition.columns.iter().enumerate() {
        let Some(logical_type) = LogicalType::parse(&col.data_type) else {
            issues.push(ValidationIssue::new(
                format!("columns[{i}].type"),
                format!("unsupported type '{}'", col.data_type),
            ));
            continue;
        };
        if let Some(default) = &col.default_value
            && !default.is_null()
            && !json_matches(logical_type, default)
        {
            issues.push(ValidationIssue::new(
                format!("columns[{i}].defaultValue"),
                format!("default value is not a valid {logical_type}"),
            ));
        }
        columns.push(ValidatedColumn {
            name: col.name.clone(),
            logical_type,
            // primary keys are always NOT NULL
            nullable: col.nullable && !col.is_primary,
            is_primary: col.is_primary,
            is_foreign: col.is_foreign,
            default_value: col.default_value.clone().filter(|v| !v.is_null()),
        });
    }

    // 4. exactly one primary key
    let primaries: Vec<(usize, &str)> = definition
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_primary)
        .map(|(i, c)| (i, c.name.as_str()))
        .collect();
    match primaries.as_slice() {
        [] => issues.push(ValidationIssue::new(
            "columns",
            "exactly one column must be the primary key (none given)",
        )),
        [(i, _)] => {
            if let Some(t) = LogicalType::parse(&definition.columns[*i].data_type)
                && !matches!(t, LogicalType::Integer | LogicalType::String)
            {
                issues.push(ValidationIssue::new(
                    format!("columns[{i}].type"),
                    format!("primary key must be integer or string, not {t}"),
                ));
            }
        }
        many => issues.push(ValidationIssue::new(
            "columns",
            format!(
                "exactly one column must be the primary key (got {}: {})",
                many.len(),
                many.iter().map(|(_, n)| *n).collect::<Vec<_>>().join(", ")
            ),
        )),
    }

    // 5. reserved names that would collide with injected columns
    for (i, col) in definition.columns.iter().enumerate() {
        let lower = col.name.to_ascii_lowercase();
        let injected = (definition.timestamps && (lower == CREATED_AT || lower == UPDATED_AT))
            || (definition.soft_delete && lower == DELETED_AT);
        if injected {
            issues.push(ValidationIssue::new(
                format!("columns[{i}].name"),
                format!("'{}' is added automatically and cannot be declared explicitly", col.name),
            ));
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(ValidatedDefinition {
        name: definition.name.clone(),
        display_name: definition.display_name.clone(),
        description: definition.description.clone(),
        columns,
        timestamps: definition.timestamps,
        soft_delete: definition.soft_delete,
        generate_api: definition.generate_api,
        is_built_in: definition.is_built_in,
        is_generated: definition.is_generated,
    })
}

// ---------- alterations ----------

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAlteration {
    pub name: String,
    pub new_name: Option<String>,
    /// Target type; always set so the column can be redefined in full.
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub default_value: Option<JsonValue>,
    pub changes_definition: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedAlterations {
    pub add: Vec<ValidatedColumn>,
    pub drop: Vec<String>,
    pub alter: Vec<ValidatedAlteration>,
}

/// Check an `alterTable` request against the table's current structure.
pub fn validate_alterations(
    structure: &TableStructure,
    alterations: &Alterations,
) -> Result<ValidatedAlterations, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut out = ValidatedAlterations::default();

    if alterations.is_empty() {
        issues.push(ValidationIssue::new("alterations", "no alterations requested"));
    }

    let existing: HashSet<String> = structure
        .columns
        .iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect();
    let mut claimed: HashSet<String> = HashSet::new();

    for (i, col) in alterations.add_columns.iter().enumerate() {
        let field = format!("addColumns[{i}]");
        let lower = col.name.to_ascii_lowercase();
        if !is_identifier(&col.name) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("column name '{}' is not a valid identifier", col.name),
            ));
        }
        if existing.contains(&lower) || !claimed.insert(lower.clone()) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("column '{}' already exists", col.name),
            ));
        }
        if structure.is_system_column(&lower) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("'{}' is managed by the engine", col.name),
            ));
        }
        if col.is_primary {
            issues.push(ValidationIssue::new(
                format!("{field}.isPrimary"),
                "a table has exactly one primary key; it cannot be added later",
            ));
        }
        let default = col.default_value.clone().filter(|v| !v.is_null());
        if !col.nullable && default.is_none() {
            issues.push(ValidationIssue::new(
                format!("{field}.nullable"),
                "a NOT NULL column added to an existing table needs a default value",
            ));
        }
        match LogicalType::parse(&col.data_type) {
            None => issues.push(ValidationIssue::new(
                format!("{field}.type"),
                format!("unsupported type '{}'", col.data_type),
            )),
            Some(logical_type) => {
                if let Some(d) = &default
                    && !json_matches(logical_type, d)
                {
                    issues.push(ValidationIssue::new(
                        format!("{field}.defaultValue"),
                        format!("default value is not a valid {logical_type}"),
                    ));
                }
                out.add.push(ValidatedColumn {
                    name: col.name.clone(),
                    logical_type,
                    nullable: col.nullable,
                    is_primary: false,
                    is_foreign: col.is_foreign,
                    default_value: default,
                });
            }
        }
    }

    let mut dropped: HashSet<&str> = HashSet::new();
    for (i, name) in alterations.drop_columns.iter().enumerate() {
        let field = format!("dropColumns[{i}]");
        match structure.column(name) {
            None => issues.push(ValidationIssue::new(field, format!("unknown column '{name}'"))),
            Some(col) if col.is_primary || name == "id" => issues.push(ValidationIssue::new(
                field,
                format!("primary key column '{name}' cannot be dropped"),
            )),
            Some(_) if structure.is_system_column(name) => issues.push(ValidationIssue::new(
                field,
                format!("'{name}' is managed by the engine"),
            )),
            Some(_) => {
                if !dropped.insert(name.as_str()) {
                    issues.push(ValidationIssue::new(field, format!("column '{name}' listed twice")));
                } else {
                    out.drop.push(name.clone());
                }
            }
        }
    }

    for (i, alt) in alterations.alter_columns.iter().enumerate() {
        let field = format!("alterColumns[{i}]");
        let Some(current) = structure.column(&alt.name) else {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("unknown column '{}'", alt.name),
            ));
            continue;
        };
        if dropped.contains(alt.name.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("column '{}' is also being dropped", alt.name),
            ));
        }
        if structure.is_system_column(&alt.name) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!("'{}' is managed by the engine", alt.name),
            ));
        }

        let new_type = match alt.data_type.as_deref() {
            None => None,
            Some(raw) => match LogicalType::parse(raw) {
                Some(t) => Some(t),
                None => {
                    issues.push(ValidationIssue::new(
                        format!("{field}.type"),
                        format!("unsupported type '{raw}'"),
                    ));
                    None
                }
            },
        };
        let type_changes = new_type.is_some_and(|t| t != current.logical_type);
        let nullability_changes = alt.nullable.is_some_and(|n| n != current.nullable);
        let renames = alt.new_name.as_ref().is_some_and(|n| n != &alt.name);

        let immutable = current.is_primary || alt.name == "id";
        if immutable && (type_changes || nullability_changes || renames) {
            issues.push(ValidationIssue::new(
                format!("{field}.name"),
                format!(
                    "primary key column '{}' is immutable (name, type and nullability cannot change)",
                    alt.name
                ),
            ));
        }

        if let Some(new_name) = &alt.new_name
            && renames
        {
            let lower = new_name.to_ascii_lowercase();
            if !is_identifier(new_name) {
                issues.push(ValidationIssue::new(
                    format!("{field}.newName"),
                    format!("column name '{new_name}' is not a valid identifier"),
                ));
            }
            let collides_with_existing =
                existing.contains(&lower) && lower != alt.name.to_ascii_lowercase();
            if collides_with_existing || !claimed.insert(lower) {
                issues.push(ValidationIssue::new(
                    format!("{field}.newName"),
                    format!("column '{new_name}' already exists"),
                ));
            }
        }

        let target_type = new_type.unwrap_or(current.logical_type);
        let default = alt.default_value.clone().filter(|v| !v.is_null());
        if let Some(d) = &default
            && !json_matches(target_type, d)
        {
            issues.push(ValidationIssue::new(
                format!("{field}.defaultValue"),
                format!("default value is not a valid {target_type}"),
            ));
        }

        if !type_changes && !nullability_changes && !renames && default.is_none() {
            issues.push(ValidationIssue::new(
                field.clone(),
                format!("nothing to change for column '{}'", alt.name),
            ));
        }

        out.alter.push(ValidatedAlteration {
            name: alt.name.clone(),
            new_name: alt.new_name.clone().filter(|_| renames),
            logical_type: target_type,
            nullable: alt.nullable.unwrap_or(current.nullable),
            default_value: default.clone(),
            changes_definition: type_changes || nullability_changes || default.is_some(),
        });
    }

    if issues.is_empty() { Ok(out) } else { Err(issues) }
}

// ---------- records ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    Insert,
    Update,
}

/// Whether the store generates this column's value on insert.
pub fn is_generated_key(structure: &TableStructure, column: &str) -> bool {
    structure
        .column(column)
        .is_some_and(|c| c.is_primary && c.logical_type == LogicalType::Integer)
}

/// Key-level checks applied to every write: unknown columns, engine-managed
/// columns, primary key updates, and missing non-generated keys on insert.
pub fn check_record_keys(
    structure: &TableStructure,
    data: &Record,
    mode: RecordMode,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for key in data.keys() {
        match structure.column(key) {
            None => issues.push(ValidationIssue::new(key.clone(), "unknown column")),
            Some(_) if structure.is_system_column(key) => issues.push(ValidationIssue::new(
                key.clone(),
                "column is managed by the engine and cannot be written",
            )),
            Some(col) if col.is_primary && mode == RecordMode::Update => issues.push(
                ValidationIssue::new(key.clone(), "the primary key cannot be modified"),
            ),
            Some(_) => {}
        }
    }
    if mode == RecordMode::Insert
        && let Some(pk) = structure.primary_key()
        && !is_generated_key(structure, &pk.name)
        && data.get(&pk.name).is_none_or(JsonValue::is_null)
    {
        issues.push(ValidationIssue::new(pk.name.clone(), "a value for the primary key is required"));
    }
    if mode == RecordMode::Update && data.is_empty() {
        issues.push(ValidationIssue::new("data", "no columns to update"));
    }
    issues
}

/// Full check of a record against a schema: keys, value types, nullability
/// and, on insert, presence of required columns.
pub fn validate_record(
    schema: &TableStructure,
    data: &Record,
    mode: RecordMode,
) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = check_record_keys(schema, data, mode);

    for (key, value) in data {
        let Some(col) = schema.column(key) else { continue };
        if value.is_null() {
            if !col.nullable {
                issues.push(ValidationIssue::new(key.clone(), "column does not accept null"));
            }
        } else if !json_matches(col.logical_type, value) {
            issues.push(ValidationIssue::new(
                key.clone(),
                format!("expected a {} value", col.logical_type),
            ));
        }
    }

    if mode == RecordMode::Insert {
        for col in &schema.columns {
            let required = !col.nullable
                && col.default_value.is_none()
                && !is_generated_key(schema, &col.name)
                && !schema.is_system_column(&col.name);
            if required && !data.contains_key(&col.name) && !col.is_primary {
                issues.push(ValidationIssue::new(col.name.clone(), "a value is required"));
            }
        }
    }

    if issues.is_empty() { Ok(()) } else { Err(issues) }
}
