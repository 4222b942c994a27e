//! SQL Server database client implementation.
//!
//! Implements the `DatabaseClient` trait for Microsoft SQL Server using
//! tiberius over the TDS protocol. One statement is in flight per session,
//! so a single client behind a mutex stands in for a pool.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseClient, DatabaseKind, QueryResult, Row, Schema, Table, Value,
};
use crate::error::{AskError, ConnectionError, Result};
use crate::safety;
use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use std::time::Duration;
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server database client.
pub struct MssqlClient {
    conn: Mutex<Option<TdsClient>>,
    query_timeout: Duration,
}

impl MssqlClient {
    /// Connects a TDS client for the given configuration.
    pub async fn connect(config: &ConnectionConfig, query_timeout: Duration) -> Result<Self> {
        let tds_config = build_config(config);
        debug!("Connecting to SQL Server at {}", config.display_string());

        let host = config.host.as_deref().unwrap_or("localhost").to_string();
        let port = config.effective_port();

        let tcp = TcpStream::connect(tds_config.get_addr())
            .await
            .map_err(|_| {
                AskError::Connection(ConnectionError::Refused {
                    host: host.clone(),
                    port,
                })
            })?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds_config, tcp.compat_write())
            .await
            .map_err(|e| map_connection_error(e, config))?;

        Ok(Self {
            conn: Mutex::new(Some(client)),
            query_timeout,
        })
    }

    /// Runs a metadata query and collects one string column per row.
    async fn fetch_string_column(&self, sql: &str) -> Result<Vec<String>> {
        let mut guard = self.conn.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AskError::introspection("connection already closed"))?;

        let rows = client
            .simple_query(sql)
            .await
            .map_err(|e| AskError::introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| AskError::introspection(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten())
            .map(str::to_string)
            .collect())
    }

    async fn fetch_table(&self, table_name: &str) -> Result<Table> {
        let escaped = table_name.replace('\'', "''");

        let column_sql = format!(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = '{escaped}' \
             ORDER BY ORDINAL_POSITION"
        );

        let rows = {
            let mut guard = self.conn.lock().await;
            let client = guard
                .as_mut()
                .ok_or_else(|| AskError::introspection("connection already closed"))?;
            client
                .simple_query(&column_sql)
                .await
                .map_err(|e| AskError::introspection(e.to_string()))?
                .into_first_result()
                .await
                .map_err(|e| AskError::introspection(e.to_string()))?
        };

        let columns: Vec<Column> = rows
            .iter()
            .filter_map(|row| {
                let name = row.try_get::<&str, _>(0).ok().flatten()?;
                let data_type = row.try_get::<&str, _>(1).ok().flatten().unwrap_or("unknown");
                let is_nullable = row.try_get::<&str, _>(2).ok().flatten().unwrap_or("YES");
                Some(Column {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                    is_nullable: is_nullable == "YES",
                    is_primary_key: false,
                })
            })
            .collect();

        let pk_sql = format!(
            "SELECT kcu.COLUMN_NAME \
             FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
               AND kcu.TABLE_NAME = '{escaped}' \
             ORDER BY kcu.ORDINAL_POSITION"
        );
        let primary_key = self.fetch_string_column(&pk_sql).await?;

        Ok(Table {
            name: table_name.to_string(),
            columns,
            primary_key: Vec::new(),
        }
        .with_primary_key(primary_key))
    }
}

#[async_trait]
impl DatabaseClient for MssqlClient {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Mssql
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let names = self
            .fetch_string_column(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            )
            .await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            tables.push(self.fetch_table(&name).await?);
        }
        Ok(Schema { tables })
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let classification = safety::classify_with_kind(DatabaseKind::Mssql, sql);

        let mut guard = self.conn.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AskError::execution("connection already closed"))?;

        if classification.returns_rows {
            let work = async {
                let mut stream = client
                    .simple_query(sql)
                    .await
                    .map_err(|e| AskError::execution(e.to_string()))?;

                // Column metadata is available before any row, so empty
                // result sets still report their column list.
                let columns: Vec<ColumnInfo> = stream
                    .columns()
                    .await
                    .map_err(|e| AskError::execution(e.to_string()))?
                    .map(|cols| {
                        cols.iter()
                            .map(|c| {
                                ColumnInfo::new(c.name(), format!("{:?}", c.column_type()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let result_set = stream
                    .into_first_result()
                    .await
                    .map_err(|e| AskError::execution(e.to_string()))?;

                let rows: Vec<Row> = result_set.iter().map(convert_row).collect();
                Ok(QueryResult::rows(columns, rows))
            };

            tokio::time::timeout(self.query_timeout, work)
                .await
                .map_err(|_| timeout_error(self.query_timeout))?
        } else {
            let work = async {
                let done = client
                    .execute(sql, &[])
                    .await
                    .map_err(|e| AskError::execution(e.to_string()))?;
                Ok(QueryResult::affected(done.total()))
            };

            tokio::time::timeout(self.query_timeout, work)
                .await
                .map_err(|_| timeout_error(self.query_timeout))?
        }
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if let Some(client) = guard.take() {
            client
                .close()
                .await
                .map_err(|e| AskError::execution(format!("Failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

fn timeout_error(timeout: Duration) -> AskError {
    AskError::execution(format!(
        "Statement timed out after {} seconds",
        timeout.as_secs()
    ))
}

/// Builds a tiberius Config from a ConnectionConfig.
fn build_config(config: &ConnectionConfig) -> Config {
    let mut tds_config = Config::new();
    tds_config.host(config.host.as_deref().unwrap_or("localhost"));
    tds_config.port(config.effective_port());
    tds_config.authentication(AuthMethod::sql_server(
        config.user.as_deref().unwrap_or_default(),
        config.password.as_deref().unwrap_or_default(),
    ));
    if let Some(database) = config.database.as_deref() {
        tds_config.database(database);
    }
    tds_config.encryption(EncryptionLevel::NotSupported);
    tds_config.trust_cert();
    tds_config
}

/// Maps tiberius errors to the connection error taxonomy.
fn map_connection_error(error: tiberius::error::Error, config: &ConnectionConfig) -> AskError {
    let user = config.user.as_deref().unwrap_or("unknown").to_string();
    let database = config.database.as_deref().unwrap_or("unknown").to_string();

    let error_str = error.to_string().to_lowercase();

    let mapped = if error_str.contains("login failed") {
        ConnectionError::AuthenticationFailed { user }
    } else if error_str.contains("cannot open database") {
        ConnectionError::DatabaseNotFound { database }
    } else {
        ConnectionError::Other(error.to_string())
    };

    AskError::Connection(mapped)
}

/// Converts a tiberius Row to our Row type.
///
/// Date/time values go through chrono's typed getters; everything else
/// converts straight from the wire representation.
fn convert_row(row: &tiberius::Row) -> Row {
    row.cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_rfc3339()))
                .unwrap_or(Value::Null),
            other => convert_column_data(other),
        })
        .collect()
}

/// Converts a tiberius ColumnData to our Value type.
fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::Numeric(Some(n)) => {
            let value = n.value() as f64 / 10f64.powi(n.scale() as i32);
            Value::Float(value)
        }
        ColumnData::String(Some(s)) => Value::String(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::String(g.to_string()),
        ColumnData::Binary(Some(b)) => Value::Bytes(b.to_vec()),
        ColumnData::Xml(Some(xml)) => Value::String(xml.to_string()),
        _ => Value::Null,
    }
}
