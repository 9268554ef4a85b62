use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use table_engine::model::{
    ApiCascade, DeleteMode, DeleteOptions, OrderDirection, PaginationOptions, QueryFilter,
    ReadOptions, Record, TableDefinition,
};
use table_engine::{EngineConfig, EngineError, ProjectId, QueryResult, TableEngine};

#[derive(Parser)]
#[command(name = "table-engine", about = "Table Engine: per-project dynamic tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the registry schema
    Migrate,
    /// Manage a project's tables
    Tables {
        #[command(subcommand)]
        action: TableAction,
    },
    /// Read and write rows of a project's table
    Records {
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Args)]
struct ProjectArg {
    #[arg(long)]
    project: i64,
}

#[derive(Args)]
struct TableArg {
    #[command(flatten)]
    project: ProjectArg,
    #[arg(long)]
    table: String,
}

#[derive(Subcommand)]
enum TableAction {
    /// List the project's tables
    List {
        #[command(flatten)]
        project: ProjectArg,
    },
    /// Create a table from a JSON definition (inline or @file)
    Create {
        #[command(flatten)]
        project: ProjectArg,
        #[arg(long)]
        definition: String,
    },
    /// Drop a table and deactivate its APIs
    Drop {
        #[command(flatten)]
        target: TableArg,
        /// Delete the table's API rows instead of deactivating them
        #[arg(long, action = clap::ArgAction::SetTrue)]
        delete_apis: bool,
    },
    /// Print the live structure, refreshing the registry cache
    Schema {
        #[command(flatten)]
        target: TableArg,
    },
    /// Compare the registry cache with the live table without writing
    Drift {
        #[command(flatten)]
        target: TableArg,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Insert a JSON object (inline or @file)
    Insert {
        #[command(flatten)]
        target: TableArg,
        #[arg(long)]
        data: String,
    },
    /// Fetch one row by primary key
    Get {
        #[command(flatten)]
        target: TableArg,
        #[arg(long)]
        id: String,
        #[arg(long, action = clap::ArgAction::SetTrue)]
        include_deleted: bool,
    },
    /// Filtered, paginated query
    Query {
        #[command(flatten)]
        target: TableArg,
        /// JSON array of {"field","operator","value"} (inline or @file)
        #[arg(long)]
        filters: Option<String>,
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        page_size: Option<u64>,
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue)]
        desc: bool,
        #[arg(long, action = clap::ArgAction::SetTrue)]
        include_deleted: bool,
    },
    /// Delete one row by primary key
    Delete {
        #[command(flatten)]
        target: TableArg,
        #[arg(long)]
        id: String,
        /// soft or hard; defaults to the table's configured behaviour
        #[arg(long)]
        mode: Option<DeleteMode>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let engine = TableEngine::connect(config).await?;

    let success = match cli.command {
        Commands::Migrate => {
            tracing::info!("registry schema is up to date");
            true
        }
        Commands::Tables { action } => handle_table_action(&engine, action).await?,
        Commands::Records { action } => handle_record_action(&engine, action).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_table_action(
    engine: &TableEngine,
    action: TableAction,
) -> Result<bool, Box<dyn std::error::Error>> {
    match action {
        TableAction::List { project } => {
            let Some(project) = project_id(project.project)? else {
                return Ok(false);
            };
            emit(&engine.list_tables(project).await)
        }
        TableAction::Create { project, definition } => {
            let Some(project) = project_id(project.project)? else {
                return Ok(false);
            };
            let definition: TableDefinition = read_json(&definition)?;
            emit(&engine.create_table(project, &definition).await)
        }
        TableAction::Drop { target, delete_apis } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            let cascade = if delete_apis {
                ApiCascade::Delete
            } else {
                ApiCascade::Deactivate
            };
            emit(&engine.drop_table(project, &target.table, cascade).await)
        }
        TableAction::Schema { target } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            emit(&engine.get_table_schema(project, &target.table).await)
        }
        TableAction::Drift { target } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            emit(&engine.check_drift(project, &target.table).await)
        }
    }
}

async fn handle_record_action(
    engine: &TableEngine,
    action: RecordAction,
) -> Result<bool, Box<dyn std::error::Error>> {
    match action {
        RecordAction::Insert { target, data } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            let data: Record = read_json(&data)?;
            emit(&engine.insert_record(project, &target.table, &data, None).await)
        }
        RecordAction::Get {
            target,
            id,
            include_deleted,
        } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            let read = ReadOptions { include_deleted };
            emit(
                &engine
                    .get_record_by_id(project, &target.table, &parse_id(&id), read)
                    .await,
            )
        }
        RecordAction::Query {
            target,
            filters,
            page,
            page_size,
            order_by,
            desc,
            include_deleted,
        } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            let filters: Vec<QueryFilter> = match filters {
                Some(raw) => read_json(&raw)?,
                None => Vec::new(),
            };
            let pagination = PaginationOptions {
                page,
                page_size,
                order_by,
                order_direction: Some(if desc {
                    OrderDirection::Desc
                } else {
                    OrderDirection::Asc
                }),
            };
            let read = ReadOptions { include_deleted };
            emit(
                &engine
                    .query_records(project, &target.table, &filters, &pagination, read)
                    .await,
            )
        }
        RecordAction::Delete { target, id, mode } => {
            let Some(project) = project_id(target.project.project)? else {
                return Ok(false);
            };
            emit(
                &engine
                    .delete_record(project, &target.table, &parse_id(&id), DeleteOptions { mode })
                    .await,
            )
        }
    }
}

/// An invalid project id is reported as a failed envelope, like any other rejection.
fn project_id(raw: i64) -> Result<Option<ProjectId>, Box<dyn std::error::Error>> {
    match ProjectId::new(raw) {
        Ok(id) => Ok(Some(id)),
        Err(e) => {
            emit(&QueryResult::<()>::err(&e))?;
            Ok(None)
        }
    }
}

/// Print the envelope as JSON on stdout; returns whether the operation succeeded.
fn emit<T: Serialize>(result: &QueryResult<T>) -> Result<bool, Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(result.is_success())
}

/// `@path` reads the JSON from a file, anything else is parsed as inline JSON.
fn read_json<T: DeserializeOwned>(arg: &str) -> Result<T, Box<dyn std::error::Error>> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .map_err(|e| format!("cannot read {path}: {e}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).map_err(|e| {
        EngineError::invalid("input", format!("invalid JSON input: {e}")).into()
    })
}

/// Numeric ids stay numbers; anything else is sent as a string key.
fn parse_id(raw: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(v @ (JsonValue::Number(_) | JsonValue::String(_))) => v,
        _ => JsonValue::String(raw.to_string()),
    }
}
