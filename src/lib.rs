// tsql2bridge - TSQL2-style temporal SQL over an ordinary relational database
// Temporal statements are rewritten into standard SQL plans and run in one transaction each

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

// Core types: values, rows, time, errors
pub mod core;

// Re-export all core types as types module
pub mod types {
    pub use crate::core::*;
}

// Temporal SQL parser and statement classification
pub mod parser;

// Registry of temporal tables and its metadata table
pub mod catalog;

// Temporal statement -> standard SQL plan
pub mod translator;

// Plan execution and result reconstruction
pub mod executor;

// Backend connections (trait + in-memory reference backend)
pub mod backend;

// Adapter settings (file + environment)
pub mod config;

// Re-export commonly used types for convenience
pub use backend::{Connection, ConnectionHandle, Dialect, MemoryConnection, Outcome};
pub use catalog::{Catalog, LogicalTable};
pub use config::AdapterConfig;
pub use core::{AdapterError, BackendError, Chronon, Clock, ManualClock, Period, Row, SystemClock, Value};
pub use executor::{RowSet, StatementPhase, StatementResult, TemporalAdapter};
pub use parser::{parse_statement, Statement};
