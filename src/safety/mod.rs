//! Statement classification module.
//!
//! Parses SQL to decide two things before a statement reaches the database:
//! whether it returns rows (fetch path) or mutates (execute path), and how
//! dangerous it is for the optional read-only policy.

mod parser;

pub use parser::{classify, classify_with_kind};

use std::fmt;

/// Safety level classification for SQL statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Read-only statements (SELECT, EXPLAIN, SHOW).
    Safe,
    /// Data modification statements (INSERT, UPDATE, MERGE).
    Mutating,
    /// Data-loss or schema-changing statements (DELETE, DROP, TRUNCATE,
    /// ALTER, CREATE, GRANT, REVOKE).
    Destructive,
}

impl SafetyLevel {
    /// Returns true if a read-only session must refuse this statement.
    pub fn blocked_when_read_only(&self) -> bool {
        matches!(self, Self::Mutating | Self::Destructive)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Mutating => write!(f, "mutating"),
            Self::Destructive => write!(f, "destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Explain,
    Show,
    Insert,
    Update,
    Merge,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Explain => "EXPLAIN",
            Self::Show => "SHOW",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Merge => "MERGE",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Truncate => "TRUNCATE",
            Self::Alter => "ALTER",
            Self::Create => "CREATE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The most dangerous safety level found across all statements.
    pub level: SafetyLevel,

    /// The kind of the statement that set the level.
    pub kind: StatementKind,

    /// Whether execution should use the row-fetching path. For text the
    /// parser cannot understand, this defaults to true so that execution
    /// (the authority on validity) still gets to run the statement.
    pub returns_rows: bool,
}

impl Classification {
    fn new(level: SafetyLevel, kind: StatementKind, returns_rows: bool) -> Self {
        Self {
            level,
            kind,
            returns_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_level_display() {
        assert_eq!(SafetyLevel::Safe.to_string(), "safe");
        assert_eq!(SafetyLevel::Mutating.to_string(), "mutating");
        assert_eq!(SafetyLevel::Destructive.to_string(), "destructive");
    }

    #[test]
    fn test_read_only_blocking() {
        assert!(!SafetyLevel::Safe.blocked_when_read_only());
        assert!(SafetyLevel::Mutating.blocked_when_read_only());
        assert!(SafetyLevel::Destructive.blocked_when_read_only());
    }

    #[test]
    fn test_statement_kind_display() {
        assert_eq!(StatementKind::Select.to_string(), "SELECT");
        assert_eq!(StatementKind::Truncate.to_string(), "TRUNCATE");
        assert_eq!(StatementKind::Unknown.to_string(), "unknown");
    }
}
