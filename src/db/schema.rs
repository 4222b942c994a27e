//! Database schema types for askdb.
//!
//! Represents the structure of a database: tables, columns, nullability and
//! primary keys. Rebuilt in full on every successful connection.

use serde::{Deserialize, Serialize};

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// All tables in the schema, in database-reported order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no tables were discovered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Formats the schema for inclusion in a generation prompt.
    ///
    /// Produces a compact human-readable rendering that gives the model the
    /// table and column structure.
    pub fn format_for_llm(&self) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(format_table_for_llm)
            .collect::<Vec<_>>()
            .join("");

        format!("Database Schema:\n\n{tables_text}")
    }
}

fn format_table_for_llm(table: &Table) -> String {
    let column_lines = table
        .columns
        .iter()
        .map(format_column_line)
        .collect::<Vec<_>>()
        .join("");

    format!("Table: {}\n{}\n", table.name, column_lines)
}

fn format_column_line(column: &Column) -> String {
    let annotations = [
        column.is_primary_key.then_some("PK"),
        (!column.is_nullable).then_some("NOT NULL"),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    if annotations.is_empty() {
        format!("  - {}: {}\n", column.name, column.data_type)
    } else {
        format!(
            "  - {}: {} ({})\n",
            column.name,
            column.data_type,
            annotations.join(", ")
        )
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table name, unique within the schema.
    pub name: String,

    /// Columns in database-reported order; names unique within the table.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Adds the primary-key column names and marks the matching columns.
    pub fn with_primary_key(mut self, key: Vec<String>) -> Self {
        for column in &mut self.columns {
            column.is_primary_key = key.contains(&column.name);
        }
        self.primary_key = key;
        self
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type as a string (e.g., "integer", "varchar(255)").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Whether the column participates in the primary key.
    pub is_primary_key: bool,
}

impl Column {
    /// Creates a new column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Marks the column as part of the primary key.
    pub fn primary_key(self) -> Self {
        Self {
            is_primary_key: true,
            ..self
        }
    }
}
