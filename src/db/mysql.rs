//! MySQL database client implementation.
//!
//! Implements the `DatabaseClient` trait for MySQL/MariaDB using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseClient, DatabaseKind, QueryResult, Row, Schema, Table, Value,
};
use crate::error::{AskError, ConnectionError, Result};
use crate::safety;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::debug;

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
    query_timeout: Duration,
}

impl MySqlClient {
    /// Opens a connection pool for the given configuration.
    pub async fn connect(config: &ConnectionConfig, query_timeout: Duration) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        debug!("Connecting to MySQL at {}", config.display_string());

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&conn_str)
            .await
            .map_err(|e| map_connection_error(e, config))?;

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

    /// Fetches all tables in the connection's default database, columns in
    /// ordinal order with primary-key membership from the column key flag.
    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::introspection(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());

        for table_name in table_names {
            let rows: Vec<(String, String, String, String)> = sqlx::query_as(
                r#"
                SELECT column_name, column_type, is_nullable, column_key
                FROM information_schema.columns
                WHERE table_schema = DATABASE() AND table_name = ?
                ORDER BY ordinal_position
                "#,
            )
            .bind(&table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AskError::introspection(format!("Failed to fetch columns for {table_name}: {e}"))
            })?;

            let mut columns = Vec::with_capacity(rows.len());
            let mut primary_key = Vec::new();

            for (name, data_type, is_nullable, column_key) in rows {
                if column_key == "PRI" {
                    primary_key.push(name.clone());
                }
                columns.push(Column {
                    name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                    is_primary_key: false,
                });
            }

            tables.push(
                Table {
                    name: table_name,
                    columns,
                    primary_key: Vec::new(),
                }
                .with_primary_key(primary_key),
            );
        }

        Ok(tables)
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Mysql
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let tables = self.fetch_tables().await?;
        Ok(Schema { tables })
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let classification = safety::classify_with_kind(DatabaseKind::Mysql, sql);

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

/// Extracts column metadata from a fetched row.
fn column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DECIMAL" | "NEWDECIMAL" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)
            .ok()
            .flatten()
            .and_then(|d| d.to_f64())
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" | "BINARY" => row
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

/// Maps sqlx connection errors to the connection error taxonomy.
///
/// MySQL reports bad credentials as "Access denied" (ER_ACCESS_DENIED_ERROR)
/// and a missing database as "Unknown database" (ER_BAD_DB_ERROR).
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> AskError {
    let host = config.host.as_deref().unwrap_or("localhost").to_string();
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown").to_string();
    let database = config.database.as_deref().unwrap_or("unknown").to_string();

    let error_str = error.to_string().to_lowercase();

    let mapped = if error_str.contains("access denied") {
        ConnectionError::AuthenticationFailed { user }
    } else if error_str.contains("unknown database") {
        ConnectionError::DatabaseNotFound { database }
    } else if error_str.contains("connection refused") || error_str.contains("could not connect") {
        ConnectionError::Refused { host, port }
    } else {
        ConnectionError::Other(error.to_string())
    };

    AskError::Connection(mapped)
}

/// Formats a query error from the driver.
fn format_query_error(error: sqlx::Error) -> String {
    if let Some(db_error) = error.as_database_error() {
        format!("ERROR: {}", db_error.message())
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a running MySQL server; skipped unless MYSQL_URL is set.

    async fn get_test_client() -> Option<MySqlClient> {
        let url = std::env::var("MYSQL_URL").ok()?;
        let config = ConnectionConfig::from_connection_string(&url).ok()?;
        MySqlClient::connect(&config, Duration::from_secs(30)).await.ok()
    }

    #[tokio::test]
    async fn test_execute_select_one() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: MYSQL_URL not set");
            return;
        };

        let result = client.execute("SELECT 1 AS x").await.unwrap();
        match result {
            QueryResult::Rows { columns, rows } => {
                assert_eq!(columns[0].name, "x");
                assert_eq!(rows, vec![vec![Value::Int(1)]]);
            }
            QueryResult::Affected { .. } => panic!("expected rows"),
        }

        client.close().await.unwrap();
    }
}
