// ABOUTME: Row count comparison between source and target for one table
// ABOUTME: Classifies a table as in sync or needing a catch-up batch

use anyhow::Result;

use crate::database::Database;

/// Drift state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDrift {
    InSync { rows: u64 },
    NeedsSync { source_rows: u64, target_rows: u64 },
}

impl TableDrift {
    /// Offset the next batch should be read from, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            TableDrift::InSync { .. } => None,
            TableDrift::NeedsSync { target_rows, .. } => Some(*target_rows),
        }
    }

    /// Rows the target lacks; zero when it is even or ahead.
    pub fn missing_rows(&self) -> u64 {
        match self {
            TableDrift::InSync { .. } => 0,
            TableDrift::NeedsSync {
                source_rows,
                target_rows,
            } => source_rows.saturating_sub(*target_rows),
        }
    }

    pub fn target_ahead(&self) -> bool {
        matches!(
            self,
            TableDrift::NeedsSync { source_rows, target_rows } if target_rows > source_rows
        )
    }
}

/// Count rows of `table` on both sides and classify the table.
pub async fn compare(
    source: &mut dyn Database,
    target: &mut dyn Database,
    table: &str,
) -> Result<TableDrift> {
    let source_rows = source.count_rows(table).await?;
    let target_rows = target.count_rows(table).await?;

    tracing::debug!(
        "Table '{}': source has {} rows, target has {} rows",
        table,
        source_rows,
        target_rows
    );

    if source_rows == target_rows {
        return Ok(TableDrift::InSync { rows: source_rows });
    }

    Ok(TableDrift::NeedsSync {
        source_rows,
        target_rows,
    })
}
