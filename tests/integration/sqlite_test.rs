//! Driver-level tests against on-disk SQLite databases.

use std::time::Duration;

use askdb::config::ConnectionConfig;
use askdb::db::{self, DatabaseKind, QueryResult, Value};
use askdb::error::{AskError, ConnectionError};
use tempfile::NamedTempFile;

fn sqlite_config(path: &std::path::Path) -> ConnectionConfig {
    ConnectionConfig {
        kind: DatabaseKind::Sqlite,
        database: Some(path.to_string_lossy().into_owned()),
        ..Default::default()
    }
}

fn timeout() -> Duration {
    Duration::from_secs(30)
}

#[tokio::test]
async fn test_resolver_rejects_missing_file() {
    let config = ConnectionConfig {
        kind: DatabaseKind::Sqlite,
        database: Some("/tmp/askdb-does-not-exist-xyz.db".to_string()),
        ..Default::default()
    };

    let err = db::connect(&config, timeout()).await.unwrap_err();
    assert!(matches!(
        err,
        AskError::Connection(ConnectionError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn test_select_one_shape() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    let result = handle.execute("SELECT 1 AS x").await.unwrap();
    match result {
        QueryResult::Rows { columns, rows } => {
            assert_eq!(columns.len(), 1);
            assert_eq!(columns[0].name, "x");
            assert_eq!(rows, vec![vec![Value::Int(1)]]);
        }
        QueryResult::Affected { .. } => panic!("expected rows"),
    }

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_mutations_report_affected_rows() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    let created = handle
        .execute("CREATE TABLE patients (patient_id INTEGER PRIMARY KEY, first_name TEXT NOT NULL)")
        .await
        .unwrap();
    assert!(matches!(created, QueryResult::Affected { .. }));

    let inserted = handle
        .execute("INSERT INTO patients (first_name) VALUES ('Ada'), ('Grace'), ('Edsger')")
        .await
        .unwrap();
    assert!(matches!(inserted, QueryResult::Affected { count: 3 }));

    let updated = handle
        .execute("UPDATE patients SET first_name = 'Ada L' WHERE first_name = 'Ada'")
        .await
        .unwrap();
    assert!(matches!(updated, QueryResult::Affected { count: 1 }));

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_row_width_invariant() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    handle
        .execute("CREATE TABLE t (a INTEGER, b TEXT, c REAL)")
        .await
        .unwrap();
    handle
        .execute("INSERT INTO t VALUES (1, 'x', 1.5), (2, NULL, 2.5)")
        .await
        .unwrap();

    let result = handle.execute("SELECT * FROM t").await.unwrap();
    let QueryResult::Rows { columns, rows } = result else {
        panic!("expected rows");
    };
    assert_eq!(columns.len(), 3);
    for row in &rows {
        assert_eq!(row.len(), columns.len());
    }
    assert_eq!(rows[1][1], Value::Null);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_syntax_error_leaves_connection_usable() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    let err = handle.execute("SELEKT * FROM t").await.unwrap_err();
    assert!(matches!(err, AskError::Execution(_)));

    // The same handle still works for a correct statement
    let result = handle.execute("SELECT 1 AS x").await.unwrap();
    assert_eq!(result.row_count(), 1);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_introspect_empty_database() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    let schema = handle.introspect_schema().await.unwrap();
    assert!(schema.tables.is_empty());

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_introspect_tables_columns_and_keys() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    handle
        .execute(
            "CREATE TABLE patients (
                patient_id INTEGER NOT NULL PRIMARY KEY,
                first_name TEXT NOT NULL,
                dob TEXT
            )",
        )
        .await
        .unwrap();
    handle
        .execute(
            "CREATE TABLE appointments (
                appointment_id INTEGER NOT NULL PRIMARY KEY,
                patient_id INTEGER NOT NULL,
                status TEXT
            )",
        )
        .await
        .unwrap();

    let schema = handle.introspect_schema().await.unwrap();
    assert_eq!(schema.tables.len(), 2);

    let patients = schema.table("patients").expect("patients table");
    assert_eq!(patients.primary_key, vec!["patient_id".to_string()]);

    let names: Vec<&str> = patients.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["patient_id", "first_name", "dob"]);

    let patient_id = &patients.columns[0];
    assert!(patient_id.is_primary_key);
    assert!(!patient_id.is_nullable);
    assert_eq!(patient_id.data_type, "INTEGER");

    let dob = &patients.columns[2];
    assert!(!dob.is_primary_key);
    assert!(dob.is_nullable);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_result_keeps_column_names() {
    let file = NamedTempFile::new().unwrap();
    let handle = db::connect(&sqlite_config(file.path()), timeout())
        .await
        .unwrap();

    handle
        .execute("CREATE TABLE t (id INTEGER, name TEXT)")
        .await
        .unwrap();

    let result = handle.execute("SELECT id, name FROM t").await.unwrap();
    let QueryResult::Rows { columns, rows } = result else {
        panic!("expected rows");
    };
    assert!(rows.is_empty());
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name"]);

    handle.close().await.unwrap();
}
