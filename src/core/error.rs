use thiserror::Error;

/// Failures reported by a backend connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("SQL error: {0}")]
    Sql(String),
    #[error("Transaction error: {0}")]
    Transaction(String),
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors surfaced by the temporal adapter.
///
/// Syntax, catalog and translation errors are raised before any statement
/// reaches the backend. `Execution` always carries the statement that failed.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Syntax error at position {position} near '{token}': {message}")]
    Syntax {
        position: usize,
        token: String,
        message: String,
    },
    #[error("Table '{0}' not found in temporal catalog")]
    UnknownTable(String),
    #[error("Table '{0}' already exists in temporal catalog")]
    DuplicateTable(String),
    #[error("Cannot translate statement on '{table}': {message}")]
    Translation { table: String, message: String },
    #[error("Execution failed on '{}' for `{statement}`: {source}", .table.as_deref().unwrap_or("-"))]
    Execution {
        statement: String,
        table: Option<String>,
        #[source]
        source: BackendError,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Catalog metadata error: {0}")]
    Metadata(String),
}

impl AdapterError {
    pub fn translation(table: &str, message: impl Into<String>) -> Self {
        Self::Translation {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// The backend error behind an `Execution` failure.
    #[must_use]
    pub const fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Execution { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
