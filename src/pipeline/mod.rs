//! The question-to-answer pipeline.
//!
//! A `Session` owns the live connection handle, the introspected schema, the
//! generation client and the pipeline options. Each question runs the stage
//! sequence compose -> generate -> sanitize -> execute -> present, returning
//! to idle on completion and short-circuiting to the caller at the first
//! failure. One question is in flight at a time.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{ConnectionConfig, PipelineConfig};
use crate::db::{self, DatabaseClient, QueryResult, Schema};
use crate::error::{AskError, GenerationError, Result};
use crate::llm::{compose, sanitize, LlmClient, PromptContext};
use crate::present::{present, DisplayModel};
use crate::safety;

/// Pipeline tuning resolved from configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum composed prompt size in characters.
    pub max_prompt_chars: usize,

    /// Statement execution timeout.
    pub query_timeout: Duration,

    /// Refuse mutating/destructive statements before execution.
    pub read_only: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_prompt_chars: config.max_prompt_chars,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            read_only: config.read_only,
        }
    }
}

/// The stage a question is in, for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Composing,
    Generating,
    Sanitizing,
    Executing,
    Presenting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::Generating => "generating",
            Self::Sanitizing => "sanitizing",
            Self::Executing => "executing",
            Self::Presenting => "presenting",
        };
        write!(f, "{name}")
    }
}

/// The SQL produced for one question. Created fresh per question and never
/// cached or reused.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    /// The model's output as received.
    pub raw: String,

    /// The executable statement after sanitization.
    pub sanitized: String,
}

/// The complete outcome of one question.
#[derive(Debug)]
pub struct Answer {
    /// The question as asked.
    pub question: String,

    /// The generated SQL (raw and sanitized forms).
    pub query: GeneratedQuery,

    /// The execution outcome.
    pub result: QueryResult,

    /// The presentation-ready rendering of the outcome.
    pub display: DisplayModel,

    /// Wall-clock time for the full stage sequence.
    pub elapsed: Duration,
}

/// A connected session: handle, schema, generation client and options.
///
/// Created on first connect, replaced wholesale on reconnect, discarded on
/// session end. The handle is owned exclusively and closed on teardown.
pub struct Session {
    config: ConnectionConfig,
    db: Box<dyn DatabaseClient>,
    schema: Schema,
    llm: Arc<dyn LlmClient>,
    context: PromptContext,
    options: PipelineOptions,
}

impl Session {
    /// Resolves the connection, introspects the schema and assembles a
    /// session.
    ///
    /// Introspection failure degrades to an empty schema with a warning;
    /// schema context is advisory and manual SQL still works without it.
    pub async fn connect(
        config: ConnectionConfig,
        llm: Arc<dyn LlmClient>,
        context: PromptContext,
        options: PipelineOptions,
    ) -> Result<Self> {
        let db = db::connect(&config, options.query_timeout).await?;
        let schema = introspect_or_empty(db.as_ref()).await;

        Ok(Self {
            config,
            db,
            schema,
            llm,
            context,
            options,
        })
    }

    /// Assembles a session around an existing handle, primarily for tests.
    pub fn with_client(
        db: Box<dyn DatabaseClient>,
        schema: Schema,
        llm: Arc<dyn LlmClient>,
        context: PromptContext,
        options: PipelineOptions,
    ) -> Self {
        Self {
            config: ConnectionConfig::default(),
            db,
            schema,
            llm,
            context,
            options,
        }
    }

    /// Replaces the connection with a new one.
    ///
    /// The new handle is resolved first; only then is the previous handle
    /// released, so a failed reconnect leaves the session usable.
    pub async fn reconnect(&mut self, config: ConnectionConfig) -> Result<()> {
        let db = db::connect(&config, self.options.query_timeout).await?;
        let schema = introspect_or_empty(db.as_ref()).await;

        if let Err(e) = self.db.close().await {
            warn!("Error closing previous connection: {e}");
        }

        self.config = config;
        self.db = db;
        self.schema = schema;
        Ok(())
    }

    /// The schema introspected at connect time.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The connection configuration this session was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Runs the full stage sequence for one question.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::config("Question is empty"));
        }

        let start = Instant::now();

        debug!(stage = %Stage::Composing, "composing prompt");
        let messages = compose(
            question,
            &self.context,
            &self.schema,
            self.options.max_prompt_chars,
        )
        .map_err(|e| self.fail(Stage::Composing, e))?;

        debug!(stage = %Stage::Generating, "requesting SQL from model");
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| self.fail(Stage::Generating, e))?;

        debug!(stage = %Stage::Sanitizing, "sanitizing model output");
        let sanitized = sanitize(&raw);
        if sanitized.is_empty() {
            return Err(self.fail(Stage::Sanitizing, GenerationError::EmptyOutput.into()));
        }

        debug!(stage = %Stage::Executing, sql = %sanitized, "executing statement");
        let result = self
            .execute_with_policy(&sanitized)
            .await
            .map_err(|e| self.fail(Stage::Executing, e))?;

        debug!(stage = %Stage::Presenting, rows = result.row_count(), "presenting result");
        let display = present(&result);

        Ok(Answer {
            question: question.to_string(),
            query: GeneratedQuery {
                raw,
                sanitized,
            },
            result,
            display,
            elapsed: start.elapsed(),
        })
    }

    /// Executes operator-typed SQL directly, sharing the executor policy and
    /// presenter with the generated path.
    pub async fn run_sql(&self, sql: &str) -> Result<(QueryResult, DisplayModel)> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(AskError::config("Statement is empty"));
        }

        let result = self.execute_with_policy(sql).await?;
        let display = present(&result);
        Ok((result, display))
    }

    /// Closes the session, releasing the connection handle.
    pub async fn close(self) -> Result<()> {
        self.db.close().await
    }

    /// Applies the write policy, then hands the statement to the driver.
    async fn execute_with_policy(&self, sql: &str) -> Result<QueryResult> {
        if self.options.read_only {
            let classification = safety::classify_with_kind(self.db.kind(), sql);
            if classification.level.blocked_when_read_only() {
                return Err(AskError::Blocked(format!(
                    "refusing {} statement ({}) in a read-only session",
                    classification.level, classification.kind
                )));
            }
        }

        self.db.execute(sql).await
    }

    fn fail(&self, stage: Stage, error: AskError) -> AskError {
        warn!(stage = %stage, error = %error, "question failed");
        error
    }
}

async fn introspect_or_empty(db: &dyn DatabaseClient) -> Schema {
    match db.introspect_schema().await {
        Ok(schema) => {
            debug!(tables = schema.tables.len(), "schema introspected");
            schema
        }
        Err(e) => {
            warn!("Schema introspection failed, continuing without schema context: {e}");
            Schema::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, ColumnInfo, MockDatabaseClient, Table, Value};
    use crate::llm::MockLlmClient;

    fn clinic_schema() -> Schema {
        Schema {
            tables: vec![Table {
                name: "patients".to_string(),
                columns: vec![
                    Column::new("patient_id", "integer").nullable(false).primary_key(),
                    Column::new("first_name", "varchar(100)"),
                ],
                primary_key: vec!["patient_id".to_string()],
            }],
        }
    }

    fn count_result() -> QueryResult {
        QueryResult::rows(
            vec![ColumnInfo::new("COUNT(*)", "INTEGER")],
            vec![vec![Value::Int(3)]],
        )
    }

    fn session_with(db: MockDatabaseClient, llm: MockLlmClient) -> Session {
        Session::with_client(
            Box::new(db),
            clinic_schema(),
            Arc::new(llm),
            PromptContext::Introspected,
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_ask_end_to_end() {
        let db = MockDatabaseClient::with_schema(clinic_schema())
            .with_result("count(*)", count_result());
        let llm = MockLlmClient::new()
            .with_response("how many rows", "```sql\nSELECT COUNT(*) FROM patients\n```");

        let session = session_with(db, llm);
        let answer = session
            .ask("How many rows are in table patients?")
            .await
            .unwrap();

        assert_eq!(answer.query.raw, "```sql\nSELECT COUNT(*) FROM patients\n```");
        assert_eq!(answer.query.sanitized, "SELECT COUNT(*) FROM patients");

        match &answer.result {
            QueryResult::Rows { columns, rows } => {
                assert_eq!(columns[0].name, "COUNT(*)");
                assert_eq!(rows, &vec![vec![Value::Int(3)]]);
            }
            QueryResult::Affected { .. } => panic!("expected rows"),
        }

        // One cell: table, no chart
        match &answer.display {
            DisplayModel::Table(view) => {
                assert_eq!(view.rows, vec![vec!["3".to_string()]]);
                assert!(view.chart.is_none());
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let session = session_with(MockDatabaseClient::new(), MockLlmClient::new());
        let err = session.ask("   ").await.unwrap_err();
        assert!(matches!(err, AskError::Config(_)));
    }

    #[tokio::test]
    async fn test_ask_surfaces_generation_failure() {
        let llm = MockLlmClient::new().failing("quota exhausted");
        let db = MockDatabaseClient::new();
        let session = session_with(db, llm);

        let err = session.ask("anything").await.unwrap_err();
        assert!(matches!(err, AskError::Generation(_)));
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_ask_empty_model_output_fails() {
        let llm = MockLlmClient::new().returning_empty();
        let session = session_with(MockDatabaseClient::new(), llm);

        let err = session.ask("anything").await.unwrap_err();
        assert!(matches!(
            err,
            AskError::Generation(GenerationError::EmptyOutput)
        ));
    }

    #[tokio::test]
    async fn test_generation_failure_short_circuits_execution() {
        let db = MockDatabaseClient::new();
        let log = db.execution_log();
        let llm = MockLlmClient::new().failing("down");
        let session = session_with(db, llm);

        let _ = session.ask("anything").await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ask_surfaces_execution_failure() {
        let db = MockDatabaseClient::new().failing("no such table: t");
        let llm = MockLlmClient::new().with_response("anything", "```sql\nSELEKT * FROM t\n```");
        let session = session_with(db, llm);

        let err = session.ask("anything").await.unwrap_err();
        assert!(matches!(err, AskError::Execution(_)));
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_read_only_blocks_mutation() {
        let db = MockDatabaseClient::new();
        let llm = MockLlmClient::new()
            .with_response("delete", "```sql\nDELETE FROM patients\n```");
        let mut session = session_with(db, llm);
        session.options.read_only = true;

        let err = session.ask("delete everything").await.unwrap_err();
        assert!(matches!(err, AskError::Blocked(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn test_read_only_allows_select() {
        let db = MockDatabaseClient::new();
        let llm = MockLlmClient::new();
        let mut session = session_with(db, llm);
        session.options.read_only = true;

        let answer = session.ask("list patients please").await.unwrap();
        assert!(answer.query.sanitized.to_uppercase().starts_with("SELECT"));
    }

    #[tokio::test]
    async fn test_run_sql_manual_path() {
        let db = MockDatabaseClient::new().with_result("count(*)", count_result());
        let session = session_with(db, MockLlmClient::new());

        let (result, display) = session
            .run_sql("SELECT COUNT(*) FROM patients")
            .await
            .unwrap();
        assert_eq!(result.row_count(), 1);
        assert!(matches!(display, DisplayModel::Table(_)));
    }

    #[tokio::test]
    async fn test_run_sql_rejects_empty() {
        let session = session_with(MockDatabaseClient::new(), MockLlmClient::new());
        assert!(session.run_sql("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_introspection_degrades_to_empty_schema() {
        let db = MockDatabaseClient::new().failing_introspection("metadata query failed");
        let schema = introspect_or_empty(&db).await;
        assert!(schema.is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_handle() {
        let session = session_with(MockDatabaseClient::new(), MockLlmClient::new());
        assert!(session.close().await.is_ok());
    }
}
