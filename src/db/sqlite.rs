//! SQLite database client implementation.
//!
//! File-backed databases only; the resolver requires the file to exist
//! before a connection is attempted, so a typo'd path cannot silently
//! create an empty database.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseClient, DatabaseKind, QueryResult, Row, Schema, Table, Value,
};
use crate::error::{AskError, ConnectionError, Result};
use crate::safety;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteClient {
    /// Opens the database file named by the configuration.
    pub async fn connect(config: &ConnectionConfig, query_timeout: Duration) -> Result<Self> {
        let path = config
            .database
            .as_deref()
            .ok_or(ConnectionError::MissingField("database"))?;
        debug!("Opening SQLite database at {path}");

        let options = SqliteConnectOptions::new()
            .filename(Path::new(path))
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                AskError::Connection(ConnectionError::Other(format!(
                    "Failed to open {path}: {e}"
                )))
            })?;

        Ok(Self {
            pool,
            query_timeout,
        })
    }

    /// Fetches column metadata for a statement that produced zero rows, by
    /// preparing it without execution.
    async fn fetch_column_metadata(&self, sql: &str) -> Vec<ColumnInfo> {
        match self.pool.describe(sql).await {
            Ok(described) => described
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn fetch_table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::introspection(format!("Failed to fetch tables: {e}")))
    }

    /// Reads column metadata for one table via PRAGMA table_info.
    async fn fetch_table(&self, table_name: &str) -> Result<Table> {
        let pragma = format!("PRAGMA table_info({})", quote_ident(table_name));
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> = sqlx::query_as(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AskError::introspection(format!("Failed to fetch columns for {table_name}: {e}"))
            })?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut primary_key = Vec::new();

        for (_cid, name, data_type, notnull, _default, pk) in rows {
            if pk > 0 {
                primary_key.push((pk, name.clone()));
            }
            columns.push(Column {
                name,
                data_type: if data_type.is_empty() {
                    "ANY".to_string()
                } else {
                    data_type
                },
                is_nullable: notnull == 0,
                is_primary_key: false,
            });
        }

        // PRAGMA reports the 1-based position of each column within the key
        primary_key.sort_by_key(|(pos, _)| *pos);
        let key: Vec<String> = primary_key.into_iter().map(|(_, name)| name).collect();

        Ok(Table {
            name: table_name.to_string(),
            columns,
            primary_key: Vec::new(),
        }
        .with_primary_key(key))
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let names = self.fetch_table_names().await?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            tables.push(self.fetch_table(&name).await?);
        }
        Ok(Schema { tables })
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let classification = safety::classify_with_kind(DatabaseKind::Sqlite, sql);

        if classification.returns_rows {
            let result = tokio::time::timeout(
                self.query_timeout,
                sqlx::query(sql).fetch_all(&self.pool),
            )
            .await
            .map_err(|_| timeout_error(self.query_timeout))?
            .map_err(|e| AskError::execution(format_query_error(e)))?;

            let columns = if let Some(first_row) = result.first() {
                column_info(first_row)
            } else {
                self.fetch_column_metadata(sql).await
            };

            let rows: Vec<Row> = result.iter().map(convert_row).collect();

            Ok(QueryResult::rows(columns, rows))
        } else {
            let done = tokio::time::timeout(
                self.query_timeout,
                sqlx::query(sql).execute(&self.pool),
            )
            .await
            .map_err(|_| timeout_error(self.query_timeout))?
            .map_err(|e| AskError::execution(format_query_error(e)))?;

            Ok(QueryResult::affected(done.rows_affected()))
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn timeout_error(timeout: Duration) -> AskError {
    AskError::execution(format!(
        "Statement timed out after {} seconds",
        timeout.as_secs()
    ))
}

/// SQLite uses double quotes for identifier quoting.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Extracts column metadata from a fetched row.
fn column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a SqliteRow to our Value type.
///
/// SQLite's storage classes are INTEGER, REAL, TEXT, BLOB and NULL; declared
/// column types beyond those fall back to text.
fn convert_value(row: &SqliteRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Formats a query error from the driver.
fn format_query_error(error: sqlx::Error) -> String {
    if let Some(db_error) = error.as_database_error() {
        format!("ERROR: {}", db_error.message())
    } else {
        error.to_string()
    }
}
