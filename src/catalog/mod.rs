//! In-memory registry of logical temporal tables and their physical layout.

mod metadata;

pub use metadata::{
    catalog_table_ddl, decode_catalog_rows, delete_entry_sql, insert_entry_sql, latest_stamp_sql, select_entries_sql,
    CATALOG_COLUMNS,
};

use crate::parser::{ColumnDef, TemporalKind};
use crate::types::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

pub const VALID_FROM: &str = "valid_from";
pub const VALID_TO: &str = "valid_to";
pub const TXN_FROM: &str = "txn_from";
pub const TXN_TO: &str = "txn_to";

/// Column names the adapter maintains itself.
pub const RESERVED_COLUMNS: [&str; 4] = [VALID_FROM, VALID_TO, TXN_FROM, TXN_TO];

/// A `[from, to)` pair of physical time columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeColumns {
    pub from: String,
    pub to: String,
}

impl TimeColumns {
    fn named(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Where a logical table lives and which of its columns encode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalColumnMapping {
    pub physical_name: String,
    pub valid: Option<TimeColumns>,
    pub transaction: Option<TimeColumns>,
}

impl PhysicalColumnMapping {
    #[must_use]
    pub fn for_kind(physical_name: String, kind: TemporalKind) -> Self {
        Self {
            physical_name,
            valid: kind.has_valid_time().then(|| TimeColumns::named(VALID_FROM, VALID_TO)),
            transaction: kind.has_transaction_time().then(|| TimeColumns::named(TXN_FROM, TXN_TO)),
        }
    }

    /// Time column names in physical order: valid bounds, then transaction bounds.
    #[must_use]
    pub fn time_column_names(&self) -> Vec<&str> {
        self.valid
            .iter()
            .chain(self.transaction.iter())
            .flat_map(|tc| [tc.from.as_str(), tc.to.as_str()])
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalTable {
    pub name: String,
    pub kind: TemporalKind,
    pub columns: Vec<ColumnDef>,
    pub mapping: PhysicalColumnMapping,
}

impl LogicalTable {
    /// Builds the entry for a new table, rejecting reserved and repeated column names.
    pub fn new(name: &str, kind: TemporalKind, columns: Vec<ColumnDef>, table_prefix: &str) -> Result<Self> {
        if columns.is_empty() {
            return Err(AdapterError::translation(name, "a temporal table needs at least one column"));
        }
        let mut seen: Vec<String> = Vec::with_capacity(columns.len());
        for col in &columns {
            let lowered = col.name.to_lowercase();
            if RESERVED_COLUMNS.contains(&lowered.as_str()) {
                return Err(AdapterError::translation(
                    name,
                    format!("column name '{}' is reserved for time bounds", col.name),
                ));
            }
            if seen.contains(&lowered) {
                return Err(AdapterError::translation(name, format!("duplicate column '{}'", col.name)));
            }
            seen.push(lowered);
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            columns,
            mapping: PhysicalColumnMapping::for_kind(format!("{table_prefix}{name}"), kind),
        })
    }

    #[must_use]
    pub fn physical_name(&self) -> &str {
        &self.mapping.physical_name
    }

    #[must_use]
    pub fn user_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Natural key: the columns declared PRIMARY KEY.
    #[must_use]
    pub fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Registry of temporal tables, keyed case-insensitively.
///
/// Reads may run concurrently; register and unregister take the write lock.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<LogicalTable>>>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, table: LogicalTable) -> Result<Arc<LogicalTable>> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let k = key(&table.name);
        if tables.contains_key(&k) {
            return Err(AdapterError::DuplicateTable(table.name));
        }
        info!(table = %table.name, kind = %table.kind, physical = %table.physical_name(), "registered temporal table");
        let table = Arc::new(table);
        tables.insert(k, Arc::clone(&table));
        Ok(table)
    }

    /// Registers `table` over any entry of the same name, returning the old one.
    pub fn replace(&self, table: LogicalTable) -> Option<Arc<LogicalTable>> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        info!(table = %table.name, kind = %table.kind, physical = %table.physical_name(), "registered temporal table");
        tables.insert(key(&table.name), Arc::new(table))
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<LogicalTable>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&key(name))
            .cloned()
            .ok_or_else(|| AdapterError::UnknownTable(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.contains_key(&key(name))
    }

    /// Removes a table; unknown names are ignored.
    pub fn unregister(&self, name: &str) -> Option<Arc<LogicalTable>> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let removed = tables.remove(&key(name));
        if removed.is_some() {
            info!(table = %name, "unregistered temporal table");
        }
        removed
    }

    /// Sorted logical table names.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
