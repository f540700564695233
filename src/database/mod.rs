// ABOUTME: Database abstraction used by the sync engine (introspection + row access)
// ABOUTME: Implemented for MySQL and PostgreSQL; connect() picks one from the config

pub mod mysql;
pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{DbConfig, Driver};
use crate::utils::retry_with_backoff;
use crate::value::Row;

pub use mysql::MysqlDatabase;
pub use postgres::PostgresDatabase;

/// Information about a table column, as reported by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Column with only a name and type; handy for tests and fixtures.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            default: None,
        }
    }
}

/// Parameters of a single bounded read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Projection, in order. Also the INSERT column list on the target.
    pub columns: Vec<String>,
    /// Optional ORDER BY columns; empty means the engine's natural order.
    pub order_by: Vec<String>,
    pub limit: u64,
    pub offset: u64,
}

/// One open connection to a source or target database.
///
/// Calls are issued strictly one at a time; every method takes `&mut self`.
#[async_trait]
pub trait Database: Send {
    fn driver(&self) -> Driver;

    /// List user tables in the connected database.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Column definitions for `table`, in ordinal order.
    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Primary key columns for `table`, in key order. Empty if none.
    async fn primary_key(&mut self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name)
            .collect())
    }

    /// `SELECT COUNT(*)` for `table`.
    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    /// Read at most `request.limit` rows starting at `request.offset`.
    async fn fetch_rows(&mut self, table: &str, request: &BatchRequest) -> Result<Vec<Row>>;

    /// Insert one row using a parameterized statement.
    async fn insert_row(&mut self, table: &str, columns: &[String], row: &Row) -> Result<()>;
}

/// Open a connection for `config`, bounded by `timeout` per attempt.
///
/// `role` ("source"/"target") only feeds log lines and error context.
pub async fn connect(
    role: &str,
    config: &DbConfig,
    timeout: Duration,
    retries: u32,
) -> Result<Box<dyn Database>> {
    let driver = config.driver()?;

    tracing::info!(
        "Connecting to {} database ({} at {})",
        role,
        driver,
        config.display_target()
    );

    let db: Box<dyn Database> = match driver {
        Driver::Mysql => Box::new(
            retry_with_backoff(
                || MysqlDatabase::connect(config, timeout),
                retries,
                Duration::from_secs(1),
            )
            .await
            .with_context(|| format!("Connection failed to {} database", role))?,
        ),
        Driver::Postgres => Box::new(
            retry_with_backoff(
                || PostgresDatabase::connect(config, timeout),
                retries,
                Duration::from_secs(1),
            )
            .await
            .with_context(|| format!("Connection failed to {} database", role))?,
        ),
    };

    tracing::info!("Connected to {} database", role);

    Ok(db)
}
