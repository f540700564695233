// ABOUTME: Run driver - gate, then compare and sync every source table in order
// ABOUTME: Stops on the first fatal error; per-row failures only show up in the summary

use anyhow::{Context, Result};
use std::time::Instant;

use super::compare::{compare, TableDrift};
use super::engine::{sync_table, SyncResult};
use super::gate::check_tables_match;
use super::SyncOptions;
use crate::database::Database;
use crate::error::SyncError;
use crate::utils::sanitize_identifier;

/// What happened to one table during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    InSync { rows: u64 },
    Synced(SyncResult),
    /// Dry run: the window that would have been copied.
    Planned {
        offset: u64,
        limit: u64,
        missing: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Per-table results of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tables: Vec<TableReport>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn total_inserted(&self) -> u64 {
        self.synced().map(|r| r.inserted).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.synced().map(|r| r.failed()).sum()
    }

    /// Rows that failed to insert are only a warning unless `strict` is set.
    pub fn ensure_no_dropped_rows(&self, strict: bool) -> Result<(), SyncError> {
        let failed = self.total_failed();
        if failed == 0 {
            return Ok(());
        }

        tracing::warn!("{} row(s) failed to insert; see errors above", failed);
        if strict {
            return Err(SyncError::RowsDropped(failed));
        }
        Ok(())
    }

    fn synced(&self) -> impl Iterator<Item = &SyncResult> {
        self.tables.iter().filter_map(|t| match &t.outcome {
            TableOutcome::Synced(r) => Some(r),
            _ => None,
        })
    }

    /// Print a one-line-per-table summary to stdout.
    pub fn print(&self) {
        println!();
        if self.dry_run {
            println!("Sync Plan (dry run)");
        } else {
            println!("Sync Summary");
        }
        println!("{}", "═".repeat(61));

        for report in &self.tables {
            let (icon, message) = match &report.outcome {
                TableOutcome::InSync { rows } => ("✓", format!("in sync ({} rows)", rows)),
                TableOutcome::Synced(r) if r.failures.is_empty() => {
                    ("✓", format!("{} rows inserted (offset {})", r.inserted, r.offset))
                }
                TableOutcome::Synced(r) => (
                    "✗",
                    format!(
                        "{} rows inserted, {} failed (offset {})",
                        r.inserted,
                        r.failed(),
                        r.offset
                    ),
                ),
                TableOutcome::Planned {
                    offset,
                    limit,
                    missing,
                } => (
                    "•",
                    format!(
                        "{} rows missing; would copy up to {} from offset {}",
                        missing, limit, offset
                    ),
                ),
            };
            println!("  {} {}: {}", icon, sanitize_identifier(&report.table), message);
        }

        println!("{}", "═".repeat(61));
        if !self.dry_run {
            println!(
                "Inserted {} rows, {} failed, in {} ms",
                self.total_inserted(),
                self.total_failed(),
                self.duration_ms
            );
        }
    }
}

/// Bring every source table's row count closer to the target's, one batch each.
///
/// The table-set gate runs before any row count is taken. A column mismatch
/// (or any database error) ends the run at that table.
pub async fn run(
    source: &mut dyn Database,
    target: &mut dyn Database,
    options: &SyncOptions,
) -> Result<RunSummary> {
    let start = Instant::now();
    let mut summary = RunSummary {
        dry_run: options.dry_run,
        ..RunSummary::default()
    };

    let source_tables = source
        .list_tables()
        .await
        .context("Failed to list source tables")?;
    let target_tables = target
        .list_tables()
        .await
        .context("Failed to list target tables")?;

    check_tables_match(&source_tables, &target_tables)?;

    tracing::info!(
        "Comparing {} tables {} -> {} (max {} rows per table)",
        source_tables.len(),
        source.driver(),
        target.driver(),
        options.max_rows
    );

    for table in &source_tables {
        let name = sanitize_identifier(table);
        let drift = compare(source, target, table)
            .await
            .with_context(|| format!("Failed to compare row counts for '{}'", name))?;

        let outcome = match drift {
            TableDrift::InSync { rows } => {
                tracing::info!("Number of rows for table '{}' are identical", name);
                TableOutcome::InSync { rows }
            }
            TableDrift::NeedsSync {
                source_rows,
                target_rows,
            } => {
                if drift.target_ahead() {
                    tracing::warn!(
                        "Table '{}' has more rows in target ({}) than in source ({})",
                        name,
                        target_rows,
                        source_rows
                    );
                }

                if options.dry_run {
                    tracing::info!(
                        "Table '{}' is missing {} rows (offset {})",
                        name,
                        drift.missing_rows(),
                        target_rows
                    );
                    TableOutcome::Planned {
                        offset: target_rows,
                        limit: options.max_rows.min(drift.missing_rows()),
                        missing: drift.missing_rows(),
                    }
                } else {
                    let result = sync_table(source, target, table, target_rows, options)
                        .await
                        .with_context(|| format!("Failed to sync table '{}'", name))?;
                    TableOutcome::Synced(result)
                }
            }
        };

        summary.tables.push(TableReport {
            table: table.clone(),
            outcome,
        });
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;

    tracing::info!("FINISHED");

    Ok(summary)
}
