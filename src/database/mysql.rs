// ABOUTME: MySQL/MariaDB backend built on mysql_async
// ABOUTME: SHOW TABLES / DESCRIBE introspection, LIMIT/OFFSET reads, positional inserts

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Params, Value as MyValue};
use std::time::Duration;

use super::{BatchRequest, ColumnInfo, Database};
use crate::config::{DbConfig, Driver};
use crate::utils::quote_mysql_ident;
use crate::value::{Row, Value};

/// A single MySQL connection.
pub struct MysqlDatabase {
    conn: Conn,
}

impl MysqlDatabase {
    /// Open a connection, giving up after `timeout`.
    pub async fn connect(config: &DbConfig, timeout: Duration) -> Result<Self> {
        let mut opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.db_name.clone()))
            .user(Some(config.user_name.clone()))
            .pass(Some(config.password.clone()));
        if let Some(stmt) = set_names_statement(&config.charset)? {
            opts = opts.init(vec![stmt]);
        }

        let conn = tokio::time::timeout(timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                anyhow!(
                    "Timed out after {:?} connecting to MySQL at {}",
                    timeout,
                    config.display_target()
                )
            })?
            .with_context(|| format!("Failed to connect to MySQL at {}", config.display_target()))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl Database for MysqlDatabase {
    fn driver(&self) -> Driver {
        Driver::Mysql
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let tables: Vec<String> = self
            .conn
            .query("SHOW TABLES")
            .await
            .context("Failed to list tables")?;

        tracing::debug!("Found {} tables", tables.len());

        Ok(tables)
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let query = format!("DESCRIBE {}", quote_mysql_ident(table));
        let rows: Vec<mysql_async::Row> = self
            .conn
            .query(query)
            .await
            .with_context(|| format!("Failed to describe table '{}'", table))?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo> {
                let name = text_column(row, "Field")?
                    .ok_or_else(|| anyhow!("DESCRIBE '{}' returned a column without a name", table))?;
                Ok(ColumnInfo {
                    name,
                    data_type: text_column(row, "Type")?.unwrap_or_default(),
                    is_nullable: text_column(row, "Null")?.as_deref() == Some("YES"),
                    is_primary_key: text_column(row, "Key")?.as_deref() == Some("PRI"),
                    default: text_column(row, "Default")?,
                })
            })
            .collect()
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let count: Option<u64> = self
            .conn
            .query_first(build_count_query(table))
            .await
            .with_context(|| format!("Failed to count rows in table '{}'", table))?;

        count.ok_or_else(|| anyhow!("COUNT(*) on '{}' returned no row", table))
    }

    async fn fetch_rows(&mut self, table: &str, request: &BatchRequest) -> Result<Vec<Row>> {
        let query = build_select_query(table, request);
        tracing::debug!("Source query: {}", query);

        // Prepared (binary protocol) so values come back typed
        let rows: Vec<mysql_async::Row> = self
            .conn
            .exec(query, ())
            .await
            .with_context(|| format!("Failed to read rows from table '{}'", table))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let values = row.unwrap().into_iter().map(from_mysql).collect();
                Row::from_parts(&request.columns, values)
            })
            .collect())
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], row: &Row) -> Result<()> {
        let query = build_insert_query(table, columns);
        let params: Vec<MyValue> = row.values_for(columns).iter().map(to_mysql).collect();

        self.conn
            .exec_drop(query, Params::Positional(params))
            .await
            .with_context(|| format!("Failed to insert row into '{}'", table))?;

        Ok(())
    }
}

/// `SET NAMES <charset>` for the connection init, if a charset is configured.
fn set_names_statement(charset: &str) -> Result<Option<String>> {
    let charset = charset.trim();
    if charset.is_empty() {
        return Ok(None);
    }
    if !charset.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid character set name '{}'", charset);
    }
    Ok(Some(format!("SET NAMES {}", charset)))
}

/// Read a textual column from a DESCRIBE row; NULL becomes `None`.
fn text_column(row: &mysql_async::Row, name: &str) -> Result<Option<String>> {
    match row.get_opt::<Option<String>, _>(name) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(anyhow!("Unexpected value in DESCRIBE column '{}': {}", name, e)),
        None => Ok(None),
    }
}

fn build_count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_mysql_ident(table))
}

/// `SELECT <cols> FROM <table> [ORDER BY ..] LIMIT <limit> OFFSET <offset>`
fn build_select_query(table: &str, request: &BatchRequest) -> String {
    let projection = if request.columns.is_empty() {
        "*".to_string()
    } else {
        join_idents(&request.columns)
    };

    let order_by = if request.order_by.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", join_idents(&request.order_by))
    };

    format!(
        "SELECT {} FROM {}{} LIMIT {} OFFSET {}",
        projection,
        quote_mysql_ident(table),
        order_by,
        request.limit,
        request.offset
    )
}

/// `INSERT INTO <table> (<cols>) VALUES (?, ?, ...)`
fn build_insert_query(table: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_mysql_ident(table),
        join_idents(columns),
        placeholders
    )
}

fn join_idents(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_mysql_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn from_mysql(value: MyValue) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) => Value::Bytes(bytes),
        MyValue::Int(v) => Value::Int(v),
        MyValue::UInt(v) => Value::UInt(v),
        MyValue::Float(v) => Value::Float(f64::from(v)),
        MyValue::Double(v) => Value::Float(v),
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(Value::DateTime)
                // Zero dates ('0000-00-00') have no chrono equivalent
                .unwrap_or_else(|| {
                    Value::Text(format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                        year, month, day, hour, minute, second
                    ))
                })
        }
        MyValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            let sign = if negative { "-" } else { "" };
            let text = if micros > 0 {
                format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                )
            } else {
                format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
            };
            Value::Time(text)
        }
    }
}

fn to_mysql(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(i64::from(*b)),
        Value::Int(v) => MyValue::Int(*v),
        Value::UInt(v) => MyValue::UInt(*v),
        Value::Float(v) => MyValue::Double(*v),
        Value::Decimal(s) | Value::Text(s) | Value::Time(s) => MyValue::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Date(d) => MyValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::DateTime(dt) => naive_datetime_to_mysql(dt),
        Value::Timestamp(ts) => naive_datetime_to_mysql(&ts.naive_utc()),
        Value::Json(j) => MyValue::Bytes(j.to_string().into_bytes()),
        Value::Uuid(u) => MyValue::Bytes(u.to_string().into_bytes()),
    }
}

fn naive_datetime_to_mysql(dt: &chrono::NaiveDateTime) -> MyValue {
    // Leap-second nanos (>= 1e9) are clamped to the last representable microsecond
    let micros = (dt.nanosecond() / 1_000).min(999_999);
    MyValue::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        micros,
    )
}
