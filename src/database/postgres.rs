// ABOUTME: PostgreSQL backend built on tokio-postgres
// ABOUTME: Introspects the current schema and coerces values to the server-inferred parameter types

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};

use super::{BatchRequest, ColumnInfo, Database};
use crate::config::{DbConfig, Driver};
use crate::utils::quote_ident;
use crate::value::{Row, Value};

/// A single PostgreSQL connection, scoped to the connection's current schema.
pub struct PostgresDatabase {
    client: Client,
    /// Prepared INSERT statements keyed by query text.
    statements: HashMap<String, Statement>,
}

impl PostgresDatabase {
    /// Open a connection, giving up after `timeout`.
    pub async fn connect(config: &DbConfig, timeout: Duration) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.db_name)
            .user(&config.user_name)
            .password(&config.password)
            .connect_timeout(timeout);

        let (client, connection) = tokio::time::timeout(timeout, pg_config.connect(NoTls))
            .await
            .map_err(|_| {
                anyhow!(
                    "Timed out after {:?} connecting to PostgreSQL at {}",
                    timeout,
                    config.display_target()
                )
            })?
            .with_context(|| {
                format!(
                    "Failed to connect to PostgreSQL at {}",
                    config.display_target()
                )
            })?;

        // The connection object performs the actual I/O
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            statements: HashMap::new(),
        })
    }

    async fn prepare(&self, query: &str) -> Result<Statement> {
        self.client
            .prepare(query)
            .await
            .with_context(|| format!("Failed to prepare statement: {}", query))
    }

    /// Prepared INSERT for `columns`, with text casts for parameters that
    /// have no native binding.
    async fn insert_statement(&mut self, table: &str, columns: &[String]) -> Result<Statement> {
        let query = build_insert_query(table, columns, &[]);
        if let Some(stmt) = self.statements.get(&query) {
            return Ok(stmt.clone());
        }

        let stmt = self.prepare(&query).await?;
        let casts: Vec<(usize, Type)> = text_positions(stmt.params())
            .into_iter()
            .map(|idx| (idx, stmt.params()[idx].clone()))
            .collect();
        let stmt = if casts.is_empty() {
            stmt
        } else {
            self.prepare(&build_insert_query(table, columns, &casts))
                .await?
        };

        self.statements.insert(query, stmt.clone());
        Ok(stmt)
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename::text FROM pg_tables WHERE schemaname = current_schema() ORDER BY tablename",
                &[],
            )
            .await
            .context("Failed to list tables")?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
                 FROM information_schema.columns
                 WHERE table_schema = current_schema() AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to get columns for table '{}'", table))?;

        let primary_key = self.primary_key(table).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                ColumnInfo {
                    is_primary_key: primary_key.contains(&name),
                    name,
                    data_type: row.get(1),
                    is_nullable: row.get::<_, String>(2) == "YES",
                    default: row.get(3),
                }
            })
            .collect())
    }

    async fn primary_key(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 JOIN pg_class c ON c.oid = i.indrelid
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE i.indisprimary
                   AND n.nspname = current_schema()
                   AND c.relname = $1
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to get primary key for table '{}'", table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let row = self
            .client
            .query_one(&build_count_query(table), &[])
            .await
            .with_context(|| format!("Failed to count rows in table '{}'", table))?;

        let count: i64 = row.get(0);
        u64::try_from(count).context("COUNT(*) returned a negative value")
    }

    async fn fetch_rows(&mut self, table: &str, request: &BatchRequest) -> Result<Vec<Row>> {
        let query = build_select_query(table, &request.columns, &[], request);
        let stmt = self
            .prepare(&query)
            .await
            .with_context(|| format!("Failed to read rows from table '{}'", table))?;

        // Columns without a native decoder are re-selected as ::text
        let source_types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();
        let as_text = text_positions(&source_types);
        let (stmt, query) = if as_text.is_empty() {
            (stmt, query)
        } else {
            let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
            let query = build_select_query(table, &columns, &as_text, request);
            (self.prepare(&query).await?, query)
        };
        tracing::debug!("Source query: {}", query);

        let rows = self
            .client
            .query(&stmt, &[])
            .await
            .with_context(|| format!("Failed to read rows from table '{}'", table))?;

        rows.iter()
            .map(|pg_row| -> Result<Row> {
                let mut row = Row::new();
                for (idx, column) in pg_row.columns().iter().enumerate() {
                    let decoded = if as_text.contains(&idx) {
                        pg_row
                            .try_get::<_, Option<String>>(idx)
                            .map(|text| text_value(&source_types[idx], text))
                            .map_err(anyhow::Error::from)
                    } else {
                        from_postgres(pg_row, idx)
                    };
                    let value = decoded.with_context(|| {
                        format!("Failed to read column '{}' of '{}'", column.name(), table)
                    })?;
                    row.push(column.name(), value);
                }
                Ok(row)
            })
            .collect()
    }

    async fn insert_row(&mut self, table: &str, columns: &[String], row: &Row) -> Result<()> {
        let stmt = self.insert_statement(table, columns).await?;

        let params = row
            .values_for(columns)
            .iter()
            .zip(stmt.params())
            .map(|(value, ty)| to_sql_param(value, ty))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .with_context(|| format!("Failed to insert row into '{}'", table))?;

        Ok(())
    }
}

fn build_count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

/// `SELECT` for one batch window; columns at `as_text` positions are cast
/// with `::text` and keep their name.
fn build_select_query(
    table: &str,
    columns: &[String],
    as_text: &[usize],
    request: &BatchRequest,
) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                if as_text.contains(&idx) {
                    format!("{0}::text AS {0}", quote_ident(c))
                } else {
                    quote_ident(c)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    let order_by = if request.order_by.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", join_idents(&request.order_by))
    };

    format!(
        "SELECT {} FROM {}{} LIMIT {} OFFSET {}",
        projection,
        quote_ident(table),
        order_by,
        request.limit,
        request.offset
    )
}

/// `INSERT INTO "t" ("a", "b") VALUES ($1, $2::text::"public"."mood")`
///
/// Each `(position, type)` in `casts` binds that parameter as text and lets
/// the server parse it into the column type.
fn build_insert_query(table: &str, columns: &[String], casts: &[(usize, Type)]) -> String {
    let placeholders: Vec<String> = (0..columns.len())
        .map(|idx| match casts.iter().find(|(pos, _)| *pos == idx) {
            Some((_, ty)) => format!(
                "${}::text::{}.{}",
                idx + 1,
                quote_ident(ty.schema()),
                quote_ident(ty.name())
            ),
            None => format!("${}", idx + 1),
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        join_idents(columns),
        placeholders.join(", ")
    )
}

fn join_idents(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read column `idx` of a source row into a driver-neutral value.
fn from_postgres(row: &tokio_postgres::Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_();
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| Value::UInt(u64::from(v))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::Timestamp),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|t| Value::Time(t.format("%H:%M:%S%.f").to_string())),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(Value::Uuid),
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Types read and bound through their binary representation. Everything
/// else (numeric, enums, inet, intervals, arrays, ...) travels as text.
fn has_native_codec(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::BYTEA
            | Type::DATE
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::TIME
            | Type::JSON
            | Type::JSONB
            | Type::UUID
    )
}

/// Positions whose type has no native codec.
fn text_positions(types: &[Type]) -> Vec<usize> {
    types
        .iter()
        .enumerate()
        .filter(|(_, ty)| !has_native_codec(ty))
        .map(|(idx, _)| idx)
        .collect()
}

/// A `::text` projection, typed by the column it came from.
fn text_value(source_type: &Type, text: Option<String>) -> Value {
    match text {
        None => Value::Null,
        Some(text) if *source_type == Type::NUMERIC => Value::Decimal(text),
        Some(text) => Value::Text(text),
    }
}

/// Convert a value into a parameter accepted by a column of type `ty`.
fn to_sql_param(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync + Send>> {
    let param: Box<dyn ToSql + Sync + Send> = match *ty {
        Type::BOOL => Box::new(coerce(value, ty, as_bool)?),
        Type::INT2 => Box::new(coerce(value, ty, |v| {
            as_i64(v).and_then(|i| i16::try_from(i).ok())
        })?),
        Type::INT4 => Box::new(coerce(value, ty, |v| {
            as_i64(v).and_then(|i| i32::try_from(i).ok())
        })?),
        Type::INT8 => Box::new(coerce(value, ty, as_i64)?),
        Type::OID => Box::new(coerce(value, ty, |v| {
            as_i64(v).and_then(|i| u32::try_from(i).ok())
        })?),
        Type::FLOAT4 => Box::new(coerce(value, ty, |v| as_f64(v).map(|f| f as f32))?),
        Type::FLOAT8 => Box::new(coerce(value, ty, as_f64)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            Box::new(coerce(value, ty, Value::to_text)?)
        }
        Type::BYTEA => Box::new(coerce(value, ty, as_bytes)?),
        Type::DATE => Box::new(coerce(value, ty, as_date)?),
        Type::TIMESTAMP => Box::new(coerce(value, ty, as_datetime)?),
        Type::TIMESTAMPTZ => Box::new(coerce(value, ty, as_timestamp)?),
        Type::TIME => Box::new(coerce(value, ty, as_time)?),
        Type::JSON | Type::JSONB => Box::new(coerce(value, ty, as_json)?),
        Type::UUID => Box::new(coerce(value, ty, as_uuid)?),
        _ => bail!("Unsupported PostgreSQL parameter type '{}'", ty),
    };
    Ok(param)
}

fn coerce<T>(value: &Value, ty: &Type, convert: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    convert(value).map(Some).ok_or_else(|| {
        anyhow!(
            "Cannot convert {} value {:?} to PostgreSQL type '{}'",
            value.kind(),
            value,
            ty
        )
    })
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::UInt(u) => Some(*u != 0),
        other => match other.to_text()?.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
            "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
            _ => None,
        },
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::UInt(u) => i64::try_from(*u).ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        Value::Float(_) => None,
        other => other.to_text()?.trim().parse().ok(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        other => other.to_text()?.trim().parse().ok(),
    }
}

fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(b) => Some(b.clone()),
        Value::Uuid(u) => Some(u.as_bytes().to_vec()),
        other => other.to_text().map(String::into_bytes),
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        Value::Timestamp(ts) => Some(ts.naive_utc().date()),
        other => {
            let text = other.to_text()?;
            let text = text.trim();
            NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d").ok()
        }
    }
}

fn as_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Timestamp(ts) => Some(ts.naive_utc()),
        other => parse_naive_datetime(other.to_text()?.trim()),
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::DateTime(dt) => Some(Utc.from_utc_datetime(dt)),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt)),
        other => {
            let text = other.to_text()?;
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z"))
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_naive_datetime(text).map(|dt| Utc.from_utc_datetime(&dt)))
        }
    }
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn as_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::DateTime(dt) => Some(dt.time()),
        Value::Timestamp(ts) => Some(ts.naive_utc().time()),
        other => NaiveTime::parse_from_str(other.to_text()?.trim(), "%H:%M:%S%.f").ok(),
    }
}

fn as_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Json(j) => Some(j.clone()),
        other => serde_json::from_str(&other.to_text()?).ok(),
    }
}

fn as_uuid(value: &Value) -> Option<uuid::Uuid> {
    match value {
        Value::Uuid(u) => Some(*u),
        Value::Bytes(b) if b.len() == 16 => uuid::Uuid::from_slice(b).ok(),
        other => uuid::Uuid::parse_str(other.to_text()?.trim()).ok(),
    }
}
