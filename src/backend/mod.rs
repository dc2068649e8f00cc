//! Connection abstraction over the database that stores the physical tables.

pub mod memory;

pub use memory::MemoryConnection;

use crate::types::{BackendError, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of one statement on a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows { columns: Vec<String>, rows: Vec<Row> },
    Count(u64),
}

impl Outcome {
    /// Number of rows returned, or rows affected.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        match self {
            Self::Rows { rows, .. } => rows.len() as u64,
            Self::Count(n) => *n,
        }
    }
}

/// A database connection able to run standard SQL.
///
/// Implementations wrap a driver; statements run inside the transaction
/// opened by `begin` until `commit` or `rollback`.
pub trait Connection: Send {
    fn execute(&mut self, sql: &str) -> Result<Outcome, BackendError>;
    fn begin(&mut self) -> Result<(), BackendError>;
    fn commit(&mut self) -> Result<(), BackendError>;
    fn rollback(&mut self) -> Result<(), BackendError>;
    fn close(&mut self) -> Result<(), BackendError>;
    fn table_exists(&mut self, name: &str) -> Result<bool, BackendError>;
    fn is_closed(&self) -> bool;
}

/// Shared ownership of one connection.
///
/// Cloning the handle shares the connection, which lets several adapters
/// run against it one after another.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl ConnectionHandle {
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(connection))),
        }
    }

    /// Locks the connection for the duration of one statement plan.
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Connection>>, BackendError> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Connection("connection lock poisoned".to_string()))
    }

    /// Number of handles sharing the connection.
    #[must_use]
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("shared_by", &self.share_count())
            .finish()
    }
}

/// Target database family; decides the default type of time columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    MySql,
    Oracle,
}

impl Dialect {
    #[must_use]
    pub const fn default_time_type(self) -> &'static str {
        match self {
            Self::Generic | Self::MySql => "BIGINT",
            Self::Oracle => "NUMBER(19)",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::MySql => write!(f, "mysql"),
            Self::Oracle => write!(f, "oracle"),
        }
    }
}
