//! Embedded reference backend executing standard SQL against in-memory tables.

mod eval;
mod sql;
mod table;

use super::{Connection, Outcome};
use crate::types::{BackendError, Row, Value};
use eval::{eval, matches, sort_order, Scope};
use sql::{InsertSource, OrderKey, SelectItem, SelectQuery, SqlStatement};
use std::collections::HashMap;
use table::MemTable;
use tracing::debug;

pub use sql::parse_sql;

type Tables = HashMap<String, MemTable>;

/// In-memory database with snapshot transactions.
///
/// `begin` takes a copy of every table; `rollback` restores it. Outside a
/// transaction each statement commits on its own, and a failing statement
/// never leaves partial changes behind.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    tables: Tables,
    snapshot: Option<Tables>,
    closed: bool,
    statements: u64,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl MemoryConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tables currently defined, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    /// Number of statements executed so far.
    #[must_use]
    pub const fn statements_executed(&self) -> u64 {
        self.statements
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::ConnectionClosed);
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemTable, BackendError> {
        self.tables
            .get(&key(name))
            .ok_or_else(|| BackendError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, BackendError> {
        self.tables
            .get_mut(&key(name))
            .ok_or_else(|| BackendError::TableNotFound(name.to_string()))
    }

    fn run_select(&self, query: &SelectQuery) -> Result<(Vec<String>, Vec<Row>), BackendError> {
        let table = self.table(&query.table)?;
        let source_columns = table.column_names();

        let mut filtered: Vec<&Row> = Vec::new();
        for row in &table.rows {
            if matches(query.filter.as_ref(), &Scope::row(&source_columns, row))? {
                filtered.push(row);
            }
        }

        let mut names = Vec::new();
        for item in &query.items {
            match item {
                SelectItem::Wildcard => names.extend(source_columns.iter().cloned()),
                SelectItem::Expr { name, .. } => names.push(name.clone()),
            }
        }

        let aggregated = query.items.iter().any(|i| match i {
            SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
            SelectItem::Wildcard => false,
        });
        if aggregated {
            let group: Vec<Row> = filtered.into_iter().cloned().collect();
            let empty = Row::new(vec![Value::Null; source_columns.len()]);
            let first = group.first().unwrap_or(&empty);
            let scope = Scope {
                columns: &source_columns,
                row: first,
                group: Some(&group),
            };
            let mut values = Vec::with_capacity(names.len());
            for item in &query.items {
                match item {
                    SelectItem::Wildcard => values.extend(first.values.iter().cloned()),
                    SelectItem::Expr { expr, .. } => values.push(eval(expr, &scope)?),
                }
            }
            return Ok((names, vec![Row::new(values)]));
        }

        // Output values paired with sort keys computed from the source row
        let mut produced: Vec<(Row, Vec<Value>)> = Vec::with_capacity(filtered.len());
        for row in filtered {
            let scope = Scope::row(&source_columns, row);
            let mut values = Vec::with_capacity(names.len());
            for item in &query.items {
                match item {
                    SelectItem::Wildcard => values.extend(row.values.iter().cloned()),
                    SelectItem::Expr { expr, .. } => values.push(eval(expr, &scope)?),
                }
            }
            let mut keys = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                let key = match &order.key {
                    OrderKey::Position(p) => values
                        .get(p.wrapping_sub(1))
                        .cloned()
                        .ok_or_else(|| BackendError::Sql(format!("ORDER BY position {p} is out of range")))?,
                    OrderKey::Expr(sql::Expr::Column(c)) if names.iter().any(|n| n.eq_ignore_ascii_case(c)) => {
                        let idx = names.iter().position(|n| n.eq_ignore_ascii_case(c)).unwrap_or(0);
                        values[idx].clone()
                    }
                    OrderKey::Expr(e) => eval(e, &scope)?,
                };
                keys.push(key);
            }
            produced.push((Row::new(values), keys));
        }

        if !query.order_by.is_empty() {
            produced.sort_by(|(_, a), (_, b)| {
                for (i, order) in query.order_by.iter().enumerate() {
                    let ord = sort_order(&a[i], &b[i]);
                    let ord = if order.descending { ord.reverse() } else { ord };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let mut rows: Vec<Row> = produced.into_iter().map(|(r, _)| r).collect();
        if query.distinct {
            let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }
        Ok((names, rows))
    }

    fn run_insert(&mut self, table_name: &str, columns: Option<&[String]>, source: &InsertSource) -> Result<u64, BackendError> {
        let raw_rows: Vec<Vec<Value>> = match source {
            InsertSource::Values(tuples) => {
                let no_columns: Vec<String> = Vec::new();
                let empty = Row::new(Vec::new());
                let scope = Scope::row(&no_columns, &empty);
                tuples
                    .iter()
                    .map(|t| t.iter().map(|e| eval(e, &scope)).collect::<Result<Vec<_>, _>>())
                    .collect::<Result<_, _>>()?
            }
            InsertSource::Select(query) => self.run_select(query)?.1.into_iter().map(|r| r.values).collect(),
        };

        let table = self.table(table_name)?;
        let mut new_rows = Vec::with_capacity(raw_rows.len());
        for values in raw_rows {
            let ordered = table.reorder_values(columns, values)?;
            new_rows.push(table.validate_and_coerce_types(ordered)?);
        }
        let mut candidate = table.rows.clone();
        candidate.extend(new_rows.iter().cloned());
        table.check_primary_key(&candidate)?;

        let count = new_rows.len() as u64;
        self.table_mut(table_name)?.rows = candidate;
        Ok(count)
    }

    fn run_update(&mut self, table_name: &str, assignments: &[(String, sql::Expr)], filter: Option<&sql::Expr>) -> Result<u64, BackendError> {
        let table = self.table(table_name)?;
        let names = table.column_names();
        let targets: Vec<(usize, &sql::Expr)> = assignments
            .iter()
            .map(|(col, e)| table.column_index(col).map(|i| (i, e)))
            .collect::<Result<_, _>>()?;

        let mut updated = Vec::with_capacity(table.rows.len());
        let mut count = 0;
        for row in &table.rows {
            let scope = Scope::row(&names, row);
            if !matches(filter, &scope)? {
                updated.push(row.clone());
                continue;
            }
            // Right-hand sides all see the row as it was
            let mut values = row.values.clone();
            for (idx, e) in &targets {
                values[*idx] = eval(e, &scope)?;
            }
            updated.push(table.validate_and_coerce_types(values)?);
            count += 1;
        }
        table.check_primary_key(&updated)?;

        self.table_mut(table_name)?.rows = updated;
        Ok(count)
    }

    fn run_delete(&mut self, table_name: &str, filter: Option<&sql::Expr>) -> Result<u64, BackendError> {
        let table = self.table(table_name)?;
        let names = table.column_names();
        let mut kept = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            if !matches(filter, &Scope::row(&names, row))? {
                kept.push(row.clone());
            }
        }
        let count = (table.rows.len() - kept.len()) as u64;
        self.table_mut(table_name)?.rows = kept;
        Ok(count)
    }

    fn run(&mut self, stmt: SqlStatement) -> Result<Outcome, BackendError> {
        match stmt {
            SqlStatement::CreateTable { name, columns, if_not_exists } => {
                if self.tables.contains_key(&key(&name)) {
                    if if_not_exists {
                        return Ok(Outcome::Count(0));
                    }
                    return Err(BackendError::TableAlreadyExists(name));
                }
                let table = MemTable::new(name.clone(), columns)?;
                self.tables.insert(key(&name), table);
                Ok(Outcome::Count(0))
            }
            SqlStatement::DropTable { name, if_exists } => {
                if self.tables.remove(&key(&name)).is_none() && !if_exists {
                    return Err(BackendError::TableNotFound(name));
                }
                Ok(Outcome::Count(0))
            }
            SqlStatement::Insert { table, columns, source } => {
                self.run_insert(&table, columns.as_deref(), &source).map(Outcome::Count)
            }
            SqlStatement::Update { table, assignments, filter } => {
                self.run_update(&table, &assignments, filter.as_ref()).map(Outcome::Count)
            }
            SqlStatement::Delete { table, filter } => self.run_delete(&table, filter.as_ref()).map(Outcome::Count),
            SqlStatement::Select(query) => {
                let (columns, rows) = self.run_select(&query)?;
                Ok(Outcome::Rows { columns, rows })
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str) -> Result<Outcome, BackendError> {
        self.ensure_open()?;
        self.statements += 1;
        debug!(sql, "memory backend executing");
        let stmt = parse_sql(sql)?;
        self.run(stmt)
    }

    fn begin(&mut self) -> Result<(), BackendError> {
        self.ensure_open()?;
        if self.snapshot.is_some() {
            return Err(BackendError::Transaction("transaction already in progress".to_string()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| BackendError::Transaction("no transaction in progress".to_string()))
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.ensure_open()?;
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| BackendError::Transaction("no transaction in progress".to_string()))?;
        self.tables = snapshot;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
        self.closed = true;
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, BackendError> {
        self.ensure_open()?;
        Ok(self.tables.contains_key(&key(name)))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_items() -> MemoryConnection {
        let mut conn = MemoryConnection::new();
        conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name VARCHAR(20) NOT NULL, qty INTEGER)").unwrap();
        conn.execute("INSERT INTO items VALUES (1, 'apple', 5), (2, 'pear', NULL), (3, 'plum', 7)").unwrap();
        conn
    }

    fn rows(conn: &mut MemoryConnection, sql: &str) -> Vec<Vec<Value>> {
        match conn.execute(sql).unwrap() {
            Outcome::Rows { rows, .. } => rows.into_iter().map(|r| r.values).collect(),
            Outcome::Count(n) => panic!("Expected rows, got count {n}"),
        }
    }

    #[test]
    fn test_select_where_order() {
        let mut conn = conn_with_items();
        let result = rows(&mut conn, "SELECT name FROM items WHERE qty > 1 ORDER BY qty DESC");
        assert_eq!(result, vec![vec![Value::Text("plum".into())], vec![Value::Text("apple".into())]]);
    }

    #[test]
    fn test_update_uses_old_values() {
        let mut conn = conn_with_items();
        let n = conn.execute("UPDATE items SET qty = qty + 1, name = 'x' WHERE qty IS NOT NULL").unwrap();
        assert_eq!(n, Outcome::Count(2));
        let result = rows(&mut conn, "SELECT qty FROM items ORDER BY 1");
        assert_eq!(result, vec![vec![Value::Null], vec![Value::Integer(6)], vec![Value::Integer(8)]]);
    }

    #[test]
    fn test_insert_select_and_delete() {
        let mut conn = conn_with_items();
        conn.execute("CREATE TABLE copy (id INTEGER, name VARCHAR(20))").unwrap();
        let n = conn.execute("INSERT INTO copy (id, name) SELECT id + 10, name FROM items WHERE id < 3").unwrap();
        assert_eq!(n, Outcome::Count(2));
        assert_eq!(conn.execute("DELETE FROM copy WHERE name LIKE 'p%'").unwrap(), Outcome::Count(1));
        assert_eq!(rows(&mut conn, "SELECT COUNT(*) FROM copy"), vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn test_constraint_violation_leaves_table_unchanged() {
        let mut conn = conn_with_items();
        let err = conn.execute("INSERT INTO items VALUES (4, 'fig', 1), (1, 'dup', 1)").unwrap_err();
        assert!(matches!(err, BackendError::ConstraintViolation(_)));
        assert_eq!(rows(&mut conn, "SELECT COUNT(*) FROM items"), vec![vec![Value::Integer(3)]]);

        let err = conn.execute("UPDATE items SET name = NULL WHERE id = 2").unwrap_err();
        assert!(matches!(err, BackendError::ConstraintViolation(_)));
    }

    #[test]
    fn test_transaction_rollback_restores_snapshot() {
        let mut conn = conn_with_items();
        conn.begin().unwrap();
        conn.execute("DELETE FROM items").unwrap();
        conn.execute("CREATE TABLE temp (a INTEGER)").unwrap();
        conn.rollback().unwrap();
        assert_eq!(rows(&mut conn, "SELECT COUNT(*) FROM items"), vec![vec![Value::Integer(3)]]);
        assert!(!conn.table_exists("temp").unwrap());
        assert!(conn.commit().is_err());
    }

    #[test]
    fn test_distinct_and_aggregates() {
        let mut conn = conn_with_items();
        conn.execute("INSERT INTO items VALUES (4, 'apple', 5)").unwrap();
        assert_eq!(rows(&mut conn, "SELECT DISTINCT name, qty FROM items WHERE name = 'apple'").len(), 1);
        assert_eq!(
            rows(&mut conn, "SELECT SUM(qty), MAX(name) FROM items"),
            vec![vec![Value::Integer(17), Value::Text("plum".into())]]
        );
    }

    #[test]
    fn test_closed_connection_rejects_statements() {
        let mut conn = conn_with_items();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert_eq!(conn.execute("SELECT * FROM items").unwrap_err(), BackendError::ConnectionClosed);
    }

    #[test]
    fn test_unknown_table() {
        let mut conn = MemoryConnection::new();
        assert_eq!(
            conn.execute("SELECT * FROM nowhere").unwrap_err(),
            BackendError::TableNotFound("nowhere".into())
        );
    }
}
