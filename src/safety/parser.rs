//! SQL parsing and classification logic.
//!
//! Uses sqlparser with the dialect matching the connected backend to decide
//! the execution path and safety level of a statement.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::db::DatabaseKind;

use super::{Classification, SafetyLevel, StatementKind};

/// Classifies a SQL string using the generic dialect.
pub fn classify(sql: &str) -> Classification {
    classify_dialect(&GenericDialect {}, sql)
}

/// Classifies a SQL string using the dialect for the given backend.
pub fn classify_with_kind(kind: DatabaseKind, sql: &str) -> Classification {
    match kind {
        DatabaseKind::Sqlite => classify_dialect(&SQLiteDialect {}, sql),
        DatabaseKind::Mysql => classify_dialect(&MySqlDialect {}, sql),
        DatabaseKind::Postgres => classify_dialect(&PostgreSqlDialect {}, sql),
        DatabaseKind::Mssql => classify_dialect(&MsSqlDialect {}, sql),
    }
}

fn classify_dialect(dialect: &dyn Dialect, sql: &str) -> Classification {
    let statements = match Parser::parse_sql(dialect, sql) {
        Ok(statements) if !statements.is_empty() => statements,
        // Unparseable or empty text: the driver is the authority on whether
        // it runs, but a read-only session must refuse it.
        _ => return Classification::new(SafetyLevel::Destructive, StatementKind::Unknown, true),
    };

    // Most dangerous statement decides the level; the last decides the
    // execution path (only the last result set is observable anyway).
    let mut level = SafetyLevel::Safe;
    let mut kind = StatementKind::Select;
    for statement in &statements {
        let (stmt_level, stmt_kind) = classify_statement(statement);
        if level_priority(stmt_level) >= level_priority(level) {
            level = stmt_level;
            kind = stmt_kind;
        }
    }

    let last = statements.last().expect("non-empty statement list");
    let returns_rows = statement_returns_rows(last);

    Classification::new(level, kind, returns_rows)
}

/// Returns a priority value for safety levels (higher = more dangerous).
fn level_priority(level: SafetyLevel) -> u8 {
    match level {
        SafetyLevel::Safe => 0,
        SafetyLevel::Mutating => 1,
        SafetyLevel::Destructive => 2,
    }
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (SafetyLevel, StatementKind) {
    match statement {
        // A query can still mutate through data-modifying CTEs
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the inner statement
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementKind::Explain)
            } else {
                (SafetyLevel::Safe, StatementKind::Explain)
            }
        }
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => (SafetyLevel::Safe, StatementKind::Show),

        Statement::Insert(_) => (SafetyLevel::Mutating, StatementKind::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementKind::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementKind::Merge),

        Statement::Delete(_) => (SafetyLevel::Destructive, StatementKind::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementKind::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementKind::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => (SafetyLevel::Destructive, StatementKind::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => (SafetyLevel::Destructive, StatementKind::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementKind::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementKind::Revoke),

        // Conservative default: treat unknown statements as destructive
        _ => (SafetyLevel::Destructive, StatementKind::Unknown),
    }
}

/// Classifies a query, recursing into WITH-clause bodies for mutations.
fn classify_query(query: &Query) -> (SafetyLevel, StatementKind) {
    let mut level = SafetyLevel::Safe;
    let mut kind = StatementKind::Select;

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let (cte_level, cte_kind) = classify_set_expr(&cte.query.body);
            if level_priority(cte_level) > level_priority(level) {
                level = cte_level;
                kind = cte_kind;
            }
        }
    }

    let (body_level, body_kind) = classify_set_expr(&query.body);
    if level_priority(body_level) > level_priority(level) {
        level = body_level;
        kind = body_kind;
    }

    (level, kind)
}

fn classify_set_expr(set_expr: &SetExpr) -> (SafetyLevel, StatementKind) {
    match set_expr {
        SetExpr::Insert(stmt)
        | SetExpr::Update(stmt)
        | SetExpr::Delete(stmt)
        | SetExpr::Merge(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            let (left_level, left_kind) = classify_set_expr(left);
            let (right_level, right_kind) = classify_set_expr(right);
            if level_priority(left_level) >= level_priority(right_level) {
                (left_level, left_kind)
            } else {
                (right_level, right_kind)
            }
        }
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => {
            (SafetyLevel::Safe, StatementKind::Select)
        }
    }
}

/// Whether a statement produces a result set.
fn statement_returns_rows(statement: &Statement) -> bool {
    match statement {
        Statement::Query(_) | Statement::Explain { .. } => true,
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => true,
        // INSERT/UPDATE/DELETE ... RETURNING produce rows
        Statement::Insert(insert) => insert.returning.is_some(),
        Statement::Update { returning, .. } => returning.is_some(),
        Statement::Delete(delete) => delete.returning.is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_safe_and_returns_rows() {
        let c = classify("SELECT * FROM patients");
        assert_eq!(c.level, SafetyLevel::Safe);
        assert_eq!(c.kind, StatementKind::Select);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_select_with_subquery_is_safe() {
        let c = classify("SELECT * FROM patients WHERE patient_id IN (SELECT patient_id FROM appointments)");
        assert_eq!(c.level, SafetyLevel::Safe);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_cte_select_is_safe() {
        let c = classify("WITH recent AS (SELECT * FROM lab_results) SELECT * FROM recent");
        assert_eq!(c.level, SafetyLevel::Safe);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_data_modifying_cte_is_not_safe() {
        let c = classify_with_kind(
            DatabaseKind::Postgres,
            "WITH gone AS (DELETE FROM lab_results RETURNING *) SELECT * FROM gone",
        );
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Delete);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_cte_update_is_mutating() {
        let c = classify_with_kind(
            DatabaseKind::Postgres,
            "WITH touched AS (UPDATE appointments SET status = 'done' RETURNING *) SELECT * FROM touched",
        );
        assert_eq!(c.level, SafetyLevel::Mutating);
        assert_eq!(c.kind, StatementKind::Update);
    }

    #[test]
    fn test_explain_is_safe() {
        let c = classify("EXPLAIN SELECT * FROM patients");
        assert_eq!(c.level, SafetyLevel::Safe);
        assert_eq!(c.kind, StatementKind::Explain);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_explain_analyze_delete_is_destructive() {
        let c = classify("EXPLAIN ANALYZE DELETE FROM patients");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Explain);
    }

    #[test]
    fn test_insert_is_mutating_no_rows() {
        let c = classify("INSERT INTO patients (first_name) VALUES ('Ada')");
        assert_eq!(c.level, SafetyLevel::Mutating);
        assert_eq!(c.kind, StatementKind::Insert);
        assert!(!c.returns_rows);
    }

    #[test]
    fn test_insert_returning_returns_rows() {
        let c = classify_with_kind(
            DatabaseKind::Postgres,
            "INSERT INTO patients (first_name) VALUES ('Ada') RETURNING patient_id",
        );
        assert_eq!(c.level, SafetyLevel::Mutating);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_update_is_mutating() {
        let c = classify("UPDATE appointments SET status = 'done' WHERE appointment_id = 1");
        assert_eq!(c.level, SafetyLevel::Mutating);
        assert_eq!(c.kind, StatementKind::Update);
        assert!(!c.returns_rows);
    }

    #[test]
    fn test_delete_is_destructive() {
        let c = classify("DELETE FROM lab_results WHERE lab_id = 9");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Delete);
    }

    #[test]
    fn test_drop_is_destructive() {
        let c = classify("DROP TABLE patients");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Drop);
        assert!(!c.returns_rows);
    }

    #[test]
    fn test_create_table_is_destructive() {
        let c = classify("CREATE TABLE t (id INTEGER PRIMARY KEY)");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Create);
    }

    #[test]
    fn test_multi_statement_most_dangerous_wins() {
        let c = classify("SELECT 1; DELETE FROM logs");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Delete);
        // Last statement decides the execution path
        assert!(!c.returns_rows);
    }

    #[test]
    fn test_multi_statement_ends_in_select() {
        let c = classify("INSERT INTO logs (msg) VALUES ('x'); SELECT COUNT(*) FROM logs");
        assert_eq!(c.level, SafetyLevel::Mutating);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_unparseable_is_destructive_but_runs() {
        let c = classify("SELEKT * FROM t");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Unknown);
        assert!(c.returns_rows);
    }

    #[test]
    fn test_empty_sql_is_destructive() {
        let c = classify("");
        assert_eq!(c.level, SafetyLevel::Destructive);
        assert_eq!(c.kind, StatementKind::Unknown);
    }

    #[test]
    fn test_dialect_specific_quoting() {
        // MySQL backtick quoting parses under the MySQL dialect
        let c = classify_with_kind(DatabaseKind::Mysql, "SELECT `first_name` FROM `patients`");
        assert_eq!(c.level, SafetyLevel::Safe);
        assert!(c.returns_rows);

        // SQL Server bracket quoting parses under the MSSQL dialect
        let c = classify_with_kind(DatabaseKind::Mssql, "SELECT [first_name] FROM [patients]");
        assert_eq!(c.level, SafetyLevel::Safe);
    }

    #[test]
    fn test_case_insensitive() {
        let c = classify("select * from patients");
        assert_eq!(c.level, SafetyLevel::Safe);
    }
}
