//! Connection bootstrap, transactions and per-operation deadlines.

use std::future::Future;

use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend, TransactionTrait,
};

use crate::catalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Connect to the configured store and bring the registry schema up to date.
pub async fn connect(config: &EngineConfig) -> EngineResult<DatabaseConnection> {
    tracing::info!(database = %redact_db_url(&config.database_url), "connecting to database");

    let db = Database::connect(&config.database_url)
        .await
        .map_err(|e| EngineError::from_db("failed to connect to the database", e))?;
    catalog::dialect(db.get_database_backend())?;

    Migrator::up(&db, None)
        .await
        .map_err(|e| EngineError::from_db("failed to migrate the registry", e))?;

    tracing::info!(backend = ?db.get_database_backend(), "database initialized");
    Ok(db)
}

/// Begin a transaction with the statement timeout applied (PostgreSQL only).
pub async fn begin(db: &DatabaseConnection, config: &EngineConfig) -> EngineResult<DatabaseTransaction> {
    let txn = db
        .begin()
        .await
        .map_err(|e| EngineError::from_db("failed to start a transaction", e))?;
    if db.get_database_backend() == DbBackend::Postgres {
        catalog::apply_statement_timeout(&txn, config.timeout_ms()).await?;
    }
    Ok(txn)
}

pub async fn commit(txn: DatabaseTransaction) -> EngineResult<()> {
    txn.commit()
        .await
        .map_err(|e| EngineError::from_db("failed to commit the transaction", e))
}

/// Bound `fut` by the configured timeout. Dropping the future rolls back any open transaction.
pub async fn with_timeout<T, F>(config: &EngineConfig, operation: &'static str, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(config.statement_timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = config.timeout_ms(), "operation timed out");
            Err(EngineError::Timeout(config.timeout_ms()))
        }
    }
}

/// Connection string as it may appear in logs: no query string, password masked.
pub fn redact_db_url(url: &str) -> String {
    let base = url.split_once('?').map_or(url, |(base, _)| base);
    let Some((scheme, rest)) = base.split_once("://") else {
        return base.to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
            None => base.to_string(),
        },
        None => base.to_string(),
    }
}
