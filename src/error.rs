// ABOUTME: Fatal error reasons that stop a replication run
// ABOUTME: Carried inside anyhow::Error so main and tests can downcast them

use thiserror::Error;

/// Reasons a run must stop before (or while) touching rows.
///
/// Plumbing failures (I/O, driver errors) stay plain `anyhow::Error`s with
/// context attached; these variants are the conditions the operator has to
/// fix before the next run can make progress.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Tables are missing in target database: {}", .0.join(", "))]
    MissingTables(Vec<String>),

    #[error(
        "Table '{table}' has different number of columns (source: {source_columns}, target: {target_columns})"
    )]
    ColumnCountMismatch {
        table: String,
        source_columns: usize,
        target_columns: usize,
    },

    #[error(
        "Table '{table}' column #{position} differs (source: '{source_column}', target: '{target_column}')"
    )]
    ColumnNameMismatch {
        table: String,
        position: usize,
        source_column: String,
        target_column: String,
    },

    #[error("Unsupported database driver '{0}' (supported: mysql, pgsql)")]
    UnsupportedDriver(String),

    #[error("{0} row(s) could not be inserted into the target database")]
    RowsDropped(u64),
}
