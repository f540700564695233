// ABOUTME: Batch sync engine - copies one bounded window of missing rows into the target
// ABOUTME: Validates column compatibility, reads LIMIT/OFFSET from source, inserts row by row

use anyhow::{Context, Result};

use super::SyncOptions;
use crate::database::{BatchRequest, ColumnInfo, Database};
use crate::error::SyncError;
use crate::utils::sanitize_identifier;

/// A row that could not be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Absolute position of the row in the source read order.
    pub position: u64,
    pub message: String,
}

/// Outcome of one table's batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub table: String,
    pub offset: u64,
    pub fetched: u64,
    pub inserted: u64,
    pub failures: Vec<RowFailure>,
}

impl SyncResult {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }
}

/// Copy up to `options.max_rows` rows of `table`, starting at `target_rows`.
///
/// The column lists of both sides must agree in count and, by position, in
/// name; otherwise nothing is read and a [`SyncError`] is returned. Each row
/// is inserted on its own: a failed insert is logged and recorded, and the
/// remaining rows are still attempted. Earlier inserts are never rolled back.
pub async fn sync_table(
    source: &mut dyn Database,
    target: &mut dyn Database,
    table: &str,
    target_rows: u64,
    options: &SyncOptions,
) -> Result<SyncResult> {
    let source_columns = source
        .list_columns(table)
        .await
        .context("Failed to list source columns")?;
    let target_columns = target
        .list_columns(table)
        .await
        .context("Failed to list target columns")?;
    check_columns_match(table, &source_columns, &target_columns)?;

    let columns: Vec<String> = source_columns.into_iter().map(|c| c.name).collect();

    let order_by = if options.order_by_primary_key {
        let key = source.primary_key(table).await?;
        if key.is_empty() {
            tracing::warn!(
                "Table '{}' has no primary key; reading in natural order",
                sanitize_identifier(table)
            );
        }
        key
    } else {
        Vec::new()
    };

    let request = BatchRequest {
        columns,
        order_by,
        limit: options.max_rows,
        offset: target_rows,
    };
    let rows = source.fetch_rows(table, &request).await?;
    let fetched = rows.len() as u64;

    tracing::debug!(
        "Fetched {} rows from '{}' (offset {}, limit {})",
        fetched,
        sanitize_identifier(table),
        request.offset,
        request.limit
    );

    let mut inserted = 0u64;
    let mut failures = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        match target.insert_row(table, &request.columns, row).await {
            Ok(()) => inserted += 1,
            Err(e) => {
                let position = request.offset + idx as u64;
                tracing::error!("Error: {:#}", e);
                failures.push(RowFailure {
                    position,
                    message: format!("{:#}", e),
                });
            }
        }
    }

    tracing::info!(
        "Total rows inserted '{}' into '{}'",
        inserted,
        sanitize_identifier(table)
    );

    Ok(SyncResult {
        table: table.to_string(),
        offset: request.offset,
        fetched,
        inserted,
        failures,
    })
}

fn check_columns_match(
    table: &str,
    source: &[ColumnInfo],
    target: &[ColumnInfo],
) -> Result<(), SyncError> {
    if source.len() != target.len() {
        return Err(SyncError::ColumnCountMismatch {
            table: table.to_string(),
            source_columns: source.len(),
            target_columns: target.len(),
        });
    }

    if let Some((position, (s, t))) = source
        .iter()
        .zip(target)
        .enumerate()
        .find(|(_, (s, t))| s.name != t.name)
    {
        return Err(SyncError::ColumnNameMismatch {
            table: table.to_string(),
            position: position + 1,
            source_column: s.name.clone(),
            target_column: t.name.clone(),
        });
    }

    Ok(())
}
