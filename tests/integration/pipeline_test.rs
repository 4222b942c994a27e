//! End-to-end pipeline tests: real SQLite database, mock generation client.

use std::sync::Arc;
use std::time::Duration;

use askdb::config::ConnectionConfig;
use askdb::db::{self, DatabaseKind, QueryResult, Value};
use askdb::error::AskError;
use askdb::llm::{MockLlmClient, PromptContext};
use askdb::pipeline::{PipelineOptions, Session};
use askdb::present::DisplayModel;
use tempfile::NamedTempFile;

fn sqlite_config(path: &std::path::Path) -> ConnectionConfig {
    ConnectionConfig {
        kind: DatabaseKind::Sqlite,
        database: Some(path.to_string_lossy().into_owned()),
        ..Default::default()
    }
}

/// Creates a clinic database with three patients and returns its config.
async fn seeded_database(file: &NamedTempFile) -> ConnectionConfig {
    let config = sqlite_config(file.path());
    let handle = db::connect(&config, Duration::from_secs(30)).await.unwrap();

    handle
        .execute(
            "CREATE TABLE patients (
                patient_id INTEGER NOT NULL PRIMARY KEY,
                first_name TEXT NOT NULL
            )",
        )
        .await
        .unwrap();
    handle
        .execute("INSERT INTO patients (first_name) VALUES ('Ada'), ('Grace'), ('Edsger')")
        .await
        .unwrap();
    handle.close().await.unwrap();

    config
}

async fn connect_session(
    config: ConnectionConfig,
    llm: MockLlmClient,
    options: PipelineOptions,
) -> Session {
    Session::connect(config, Arc::new(llm), PromptContext::Introspected, options)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_count_question_end_to_end() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new()
        .with_response("how many rows", "```sql\nSELECT COUNT(*) FROM patients\n```");
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    // Schema context was introspected from the live database
    assert_eq!(session.schema().tables.len(), 1);
    assert!(session.schema().table("patients").is_some());

    let answer = session
        .ask("How many rows are in table patients?")
        .await
        .unwrap();

    assert_eq!(answer.query.sanitized, "SELECT COUNT(*) FROM patients");

    let QueryResult::Rows { columns, rows } = &answer.result else {
        panic!("expected rows");
    };
    assert_eq!(columns[0].name, "COUNT(*)");
    assert_eq!(rows, &vec![vec![Value::Int(3)]]);

    // One-cell result: a table and no chart
    let DisplayModel::Table(view) = &answer.display else {
        panic!("expected table display");
    };
    assert_eq!(view.rows, vec![vec!["3".to_string()]]);
    assert!(view.chart.is_none());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_generated_mutation_end_to_end() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new().with_response(
        "discharge",
        "```sql\nDELETE FROM patients WHERE first_name = 'Edsger'\n```",
    );
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    let answer = session.ask("discharge Edsger").await.unwrap();
    assert!(matches!(answer.result, QueryResult::Affected { count: 1 }));
    assert!(matches!(
        answer.display,
        DisplayModel::Mutation { affected: 1 }
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_read_only_session_blocks_generated_writes() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new()
        .with_response("discharge", "```sql\nDELETE FROM patients\n```");
    let options = PipelineOptions {
        read_only: true,
        ..Default::default()
    };
    let session = connect_session(config, llm, options).await;

    let err = session.ask("discharge everyone").await.unwrap_err();
    assert!(matches!(err, AskError::Blocked(_)));

    // Nothing was deleted
    let (result, _) = session
        .run_sql("SELECT COUNT(*) FROM patients")
        .await
        .unwrap();
    let QueryResult::Rows { rows, .. } = result else {
        panic!("expected rows");
    };
    assert_eq!(rows, vec![vec![Value::Int(3)]]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_row_answer_presents_no_results() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new().with_response(
        "named zorp",
        "```sql\nSELECT * FROM patients WHERE first_name = 'Zorp'\n```",
    );
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    let answer = session.ask("patients named Zorp").await.unwrap();
    assert!(answer.result.is_empty());
    assert!(matches!(answer.display, DisplayModel::NoResults));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_syntax_error_surfaces_and_session_survives() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new()
        .with_response("broken", "```sql\nSELEKT * FROM patients\n```")
        .with_response("how many rows", "```sql\nSELECT COUNT(*) FROM patients\n```");
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    let err = session.ask("broken question").await.unwrap_err();
    assert!(matches!(err, AskError::Execution(_)));

    // The session remains usable for the next question
    let answer = session
        .ask("How many rows are in table patients?")
        .await
        .unwrap();
    assert_eq!(answer.result.row_count(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_generation_failure_is_surfaced_verbatim() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new().failing("model is over capacity");
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    let err = session.ask("anything").await.unwrap_err();
    assert!(matches!(err, AskError::Generation(_)));
    assert!(err.to_string().contains("model is over capacity"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_chart_offered_for_multi_row_numeric_results() {
    let file = NamedTempFile::new().unwrap();
    let config = seeded_database(&file).await;

    let llm = MockLlmClient::new().with_response(
        "name lengths",
        "```sql\nSELECT first_name, LENGTH(first_name) AS len FROM patients ORDER BY patient_id\n```",
    );
    let session = connect_session(config, llm, PipelineOptions::default()).await;

    let answer = session.ask("name lengths").await.unwrap();
    let DisplayModel::Table(view) = &answer.display else {
        panic!("expected table display");
    };

    assert_eq!(view.numeric_columns, vec![1]);
    let chart = view.chart.as_ref().expect("chart offered");
    assert_eq!(chart.label, "len");
    assert_eq!(chart.points, vec![3.0, 5.0, 6.0]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_replaces_handle_and_schema() {
    let first = NamedTempFile::new().unwrap();
    let second = NamedTempFile::new().unwrap();

    let first_config = seeded_database(&first).await;

    // Second database has a different table
    let second_config = sqlite_config(second.path());
    let handle = db::connect(&second_config, Duration::from_secs(30))
        .await
        .unwrap();
    handle
        .execute("CREATE TABLE doctors (doctor_id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    handle.close().await.unwrap();

    let llm = MockLlmClient::new();
    let mut session = connect_session(first_config, llm, PipelineOptions::default()).await;
    assert!(session.schema().table("patients").is_some());

    session.reconnect(second_config).await.unwrap();
    assert!(session.schema().table("patients").is_none());
    assert!(session.schema().table("doctors").is_some());

    // The new handle answers queries against the new database
    let (result, _) = session.run_sql("SELECT COUNT(*) FROM doctors").await.unwrap();
    assert_eq!(result.row_count(), 1);

    session.close().await.unwrap();
}
