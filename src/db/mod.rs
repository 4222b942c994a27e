//! Database abstraction layer for askdb.
//!
//! Provides a trait-based interface for database operations, allowing the
//! supported backends (SQLite, MySQL, PostgreSQL, SQL Server) to be used
//! interchangeably behind one handle type.

mod mock;
mod mssql;
mod mysql;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use mssql::MssqlClient;
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use schema::{Column, Schema, Table};
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
    Mysql,
    #[default]
    Postgres,
    Mssql,
}

impl DatabaseKind {
    /// Returns the kind as a string for display and persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Mssql => "mssql",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mssql" | "sqlserver" => Some(Self::Mssql),
            _ => None,
        }
    }

    /// Returns the default port for this kind. SQLite has no port; its
    /// value is never used for connecting.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Sqlite => 0,
            Self::Mysql => 3306,
            Self::Postgres => 5432,
            Self::Mssql => 1433,
        }
    }

    /// Returns the URL scheme for this kind.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Mssql => "mssql",
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown database kind: {s}"))
    }
}

/// Resolves a connection configuration into a live handle.
///
/// Validates the configuration's required fields for the selected kind, then
/// attempts to open the connection exactly once. The caller owns the returned
/// handle and is responsible for closing it.
pub async fn connect(
    config: &ConnectionConfig,
    query_timeout: Duration,
) -> Result<Box<dyn DatabaseClient>> {
    config.validate()?;

    match config.kind {
        DatabaseKind::Sqlite => {
            let client = SqliteClient::connect(config, query_timeout).await?;
            Ok(Box::new(client))
        }
        DatabaseKind::Mysql => {
            let client = MySqlClient::connect(config, query_timeout).await?;
            Ok(Box::new(client))
        }
        DatabaseKind::Postgres => {
            let client = PostgresClient::connect(config, query_timeout).await?;
            Ok(Box::new(client))
        }
        DatabaseKind::Mssql => {
            let client = MssqlClient::connect(config, query_timeout).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for database clients.
///
/// All operations are async and return Results with AskError. A handle must
/// not be used after `close`.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The backend kind this handle talks to.
    fn kind(&self) -> DatabaseKind;

    /// Introspects the database schema: tables, columns, types, nullability
    /// and primary keys, via read-only metadata queries.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL statement exactly once and classifies the outcome as
    /// row-returning or mutation. A failed statement leaves the connection
    /// usable for subsequent statements.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
