//! Error types for askdb.
//!
//! Every pipeline stage returns a tagged outcome; failures short-circuit the
//! remaining stages of the same question and are surfaced verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for askdb operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection resolution errors (missing fields, auth, unreachable host).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// SQL generation errors (empty model output, unreachable service).
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Statement execution errors (syntax, missing tables/columns).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Statement refused by the session's write policy before execution.
    #[error("Statement blocked: {0}")]
    Blocked(String),

    /// Schema introspection errors. Non-fatal: the pipeline degrades to an
    /// empty schema, but callers that introspect directly see the cause.
    #[error("Introspection error: {0}")]
    Introspection(String),
}

/// Why a connection could not be resolved.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("database file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    #[error("database '{database}' does not exist")]
    DatabaseNotFound { database: String },

    #[error("unsupported database kind '{0}'")]
    UnsupportedKind(String),

    #[error("connection refused at {host}:{port}")]
    Refused { host: String, port: u16 },

    #[error("{0}")]
    Other(String),
}

/// Why the model produced no usable SQL.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("model returned no text")]
    EmptyOutput,

    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("composed prompt is {chars} characters, over the {limit} limit")]
    PromptTooLong { chars: usize, limit: usize },
}

impl AskError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates an introspection error with the given message.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
            Self::Generation(_) => "Generation Error",
            Self::Execution(_) => "Execution Error",
            Self::Blocked(_) => "Blocked Statement",
            Self::Introspection(_) => "Introspection Error",
        }
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;
