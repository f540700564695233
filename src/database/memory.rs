// ABOUTME: In-memory Database used by unit tests of the sync engine and runner
// ABOUTME: Records every call so tests can assert which queries a run issued

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{BatchRequest, ColumnInfo, Database};
use crate::config::Driver;
use crate::value::{Row, Value};

/// A call made against a `MemoryDatabase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTables,
    ListColumns(String),
    PrimaryKey(String),
    Count(String),
    Fetch {
        table: String,
        limit: u64,
        offset: u64,
        order_by: Vec<String>,
    },
    Insert(String),
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

/// Tables live in insertion order. The first primary-key column (if any)
/// acts as a unique key: inserting a duplicate fails like a real database.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Vec<MemoryTable>,
    calls: Vec<Call>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table whose first column `id` is an integer primary key,
    /// filled with rows `id = 1..=rows`.
    pub fn with_table(mut self, name: &str, columns: &[&str], rows: u64) -> Self {
        let columns: Vec<ColumnInfo> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnInfo {
                is_primary_key: i == 0,
                ..ColumnInfo::new(*c, if i == 0 { "int" } else { "varchar(255)" })
            })
            .collect();
        let rows = (1..=rows).map(|id| sample_row(&columns, id)).collect();
        self.tables.push(MemoryTable {
            name: name.to_string(),
            columns,
            rows,
        });
        self
    }

    /// Append a row with the given id to an existing table.
    pub fn push_row(&mut self, table: &str, id: u64) {
        let table = self
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .expect("table exists");
        let row = sample_row(&table.columns, id);
        table.rows.push(row);
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn row_count(&self, table: &str) -> u64 {
        self.rows(table).len() as u64
    }

    /// Calls that read or write rows (anything beyond introspection and COUNT).
    pub fn data_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Fetch { .. } | Call::Insert(_)))
            .collect()
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))
    }
}

fn sample_row(columns: &[ColumnInfo], id: u64) -> Row {
    let mut row = Row::new();
    for (i, column) in columns.iter().enumerate() {
        let value = if i == 0 {
            Value::Int(id as i64)
        } else {
            Value::Text(format!("{}-{}", column.name, id))
        };
        row.push(column.name.clone(), value);
    }
    row
}

#[async_trait]
impl Database for MemoryDatabase {
    fn driver(&self) -> Driver {
        Driver::Mysql
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.calls.push(Call::ListTables);
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.calls.push(Call::ListColumns(table.to_string()));
        Ok(self.table(table)?.columns.clone())
    }

    async fn primary_key(&mut self, table: &str) -> Result<Vec<String>> {
        self.calls.push(Call::PrimaryKey(table.to_string()));
        Ok(self
            .table(table)?
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        self.calls.push(Call::Count(table.to_string()));
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn fetch_rows(&mut self, table: &str, request: &BatchRequest) -> Result<Vec<Row>> {
        self.calls.push(Call::Fetch {
            table: table.to_string(),
            limit: request.limit,
            offset: request.offset,
            order_by: request.order_by.clone(),
        });
        let rows = &self.table(table)?.rows;
        Ok(rows
            .iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .map(|row| Row::from_parts(&request.columns, row.values_for(&request.columns)))
            .collect())
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], row: &Row) -> Result<()> {
        self.calls.push(Call::Insert(table.to_string()));
        let target = self
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", table))?;

        if let Some(key) = target.columns.iter().find(|c| c.is_primary_key) {
            let new_key = row.get(&key.name);
            if target.rows.iter().any(|r| r.get(&key.name) == new_key) {
                bail!(
                    "Duplicate entry '{:?}' for key '{}.PRIMARY'",
                    new_key,
                    table
                );
            }
        }

        target
            .rows
            .push(Row::from_parts(columns, row.values_for(columns)));
        Ok(())
    }
}
