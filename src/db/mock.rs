//! Mock database client for testing.
//!
//! Returns scripted results so the pipeline can be exercised without a
//! database server.

use super::{ColumnInfo, DatabaseClient, DatabaseKind, QueryResult, Schema, Value};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A mock database client that returns predefined results.
pub struct MockDatabaseClient {
    schema: Schema,
    /// Pattern -> result mappings, checked in insertion order.
    responses: Vec<(String, QueryResult)>,
    /// When set, every execute call fails with this message.
    fail_with: Option<String>,
    /// When set, introspection fails with this message.
    introspection_fail_with: Option<String>,
    /// Statements seen by execute, shared so tests can observe the log
    /// after the client has been boxed into a session.
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            responses: Vec::new(),
            fail_with: None,
            introspection_fail_with: None,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Returns the given result when the executed SQL contains `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses.push((pattern.into(), result));
        self
    }

    /// Makes every execute call fail with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Makes introspection fail with the given message.
    pub fn failing_introspection(mut self, message: impl Into<String>) -> Self {
        self.introspection_fail_with = Some(message.into());
        self
    }

    /// Statements that have been executed so far.
    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.lock().expect("mock lock").clone()
    }

    /// A shared handle to the execution log.
    pub fn execution_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        if let Some(message) = &self.introspection_fail_with {
            return Err(AskError::introspection(message.clone()));
        }
        Ok(self.schema.clone())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.executed
            .lock()
            .expect("mock lock")
            .push(sql.to_string());

        if let Some(message) = &self.fail_with {
            return Err(AskError::execution(message.clone()));
        }

        for (pattern, result) in &self.responses {
            if sql.to_lowercase().contains(&pattern.to_lowercase()) {
                return Ok(result.clone());
            }
        }

        let sql_upper = sql.trim().to_uppercase();
        if sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH") {
            Ok(QueryResult::rows(
                vec![ColumnInfo::new("result", "text")],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            ))
        } else {
            Ok(QueryResult::affected(0))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
