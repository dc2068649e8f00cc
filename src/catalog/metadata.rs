//! SQL for the metadata table that mirrors the catalog in the backend.

use super::{LogicalTable, PhysicalColumnMapping, TXN_FROM, TXN_TO};
use crate::parser::{ColumnDef, TemporalKind};
use crate::types::{quote_sql_string, AdapterError, Chronon, Result, Row, Value};

pub const CATALOG_COLUMNS: [&str; 4] = ["table_name", "temporal_kind", "physical_name", "columns_json"];

#[must_use]
pub fn catalog_table_ddl(catalog_table: &str) -> String {
    format!(
        "CREATE TABLE {catalog_table} (table_name VARCHAR(128) NOT NULL PRIMARY KEY, \
         temporal_kind VARCHAR(16) NOT NULL, physical_name VARCHAR(128) NOT NULL, \
         columns_json VARCHAR(4000) NOT NULL)"
    )
}

#[must_use]
pub fn select_entries_sql(catalog_table: &str) -> String {
    format!("SELECT {} FROM {catalog_table} ORDER BY 1", CATALOG_COLUMNS.join(", "))
}

pub fn insert_entry_sql(catalog_table: &str, table: &LogicalTable) -> Result<String> {
    let columns_json = serde_json::to_string(&table.columns)
        .map_err(|e| AdapterError::Metadata(format!("cannot encode columns of '{}': {e}", table.name)))?;
    Ok(format!(
        "INSERT INTO {catalog_table} ({}) VALUES ({}, {}, {}, {})",
        CATALOG_COLUMNS.join(", "),
        quote_sql_string(&table.name),
        quote_sql_string(table.kind.as_str()),
        quote_sql_string(table.physical_name()),
        quote_sql_string(&columns_json),
    ))
}

/// Latest transaction time written to a table's versions, as a single value.
///
/// Closed versions count with their `txn_to`, current ones with their `txn_from`.
#[must_use]
pub fn latest_stamp_sql(table: &LogicalTable) -> Option<String> {
    if !table.kind.has_transaction_time() {
        return None;
    }
    Some(format!(
        "SELECT MAX(CASE WHEN {TXN_TO} < {forever} THEN {TXN_TO} ELSE {TXN_FROM} END) FROM {}",
        table.physical_name(),
        forever = Chronon::FOREVER.as_micros(),
    ))
}

#[must_use]
pub fn delete_entry_sql(catalog_table: &str, table_name: &str) -> String {
    format!("DELETE FROM {catalog_table} WHERE table_name = {}", quote_sql_string(table_name))
}

fn text_field(row: &Row, index: usize, field: &str) -> Result<String> {
    match row.get(index) {
        Some(Value::Text(s)) => Ok(s.clone()),
        other => Err(AdapterError::Metadata(format!("catalog field '{field}' is not text: {other:?}"))),
    }
}

/// Rebuilds catalog entries from rows of `select_entries_sql`.
pub fn decode_catalog_rows(rows: &[Row]) -> Result<Vec<LogicalTable>> {
    rows.iter()
        .map(|row| {
            let name = text_field(row, 0, CATALOG_COLUMNS[0])?;
            let kind_text = text_field(row, 1, CATALOG_COLUMNS[1])?;
            let physical_name = text_field(row, 2, CATALOG_COLUMNS[2])?;
            let columns_json = text_field(row, 3, CATALOG_COLUMNS[3])?;

            let kind = TemporalKind::parse(&kind_text)
                .ok_or_else(|| AdapterError::Metadata(format!("unknown temporal kind '{kind_text}' for '{name}'")))?;
            let columns: Vec<ColumnDef> = serde_json::from_str(&columns_json)
                .map_err(|e| AdapterError::Metadata(format!("cannot decode columns of '{name}': {e}")))?;

            Ok(LogicalTable {
                mapping: PhysicalColumnMapping::for_kind(physical_name, kind),
                name,
                kind,
                columns,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_entry_quotes_json() {
        let columns = vec![ColumnDef {
            name: "note".to_string(),
            type_sql: "VARCHAR(10)".to_string(),
            nullable: true,
            primary_key: false,
        }];
        let table = LogicalTable::new("memo", TemporalKind::Bitemporal, columns, "").unwrap();
        let sql = insert_entry_sql("tsql2_catalog", &table).unwrap();
        assert!(sql.starts_with("INSERT INTO tsql2_catalog (table_name, temporal_kind, physical_name, columns_json)"));
        assert!(sql.contains("'bitemporal'"));
        assert!(sql.contains(r#"'[{"name":"note","type_sql":"VARCHAR(10)","nullable":true,"primary_key":false}]'"#));
    }

    #[test]
    fn test_latest_stamp_only_for_transaction_time() {
        let columns = vec![ColumnDef { name: "a".into(), type_sql: "INT".into(), nullable: true, primary_key: false }];
        let valid = LogicalTable::new("v", TemporalKind::Valid, columns.clone(), "").unwrap();
        assert_eq!(latest_stamp_sql(&valid), None);

        let txn = LogicalTable::new("t", TemporalKind::Transaction, columns, "").unwrap();
        assert_eq!(
            latest_stamp_sql(&txn).unwrap(),
            format!("SELECT MAX(CASE WHEN txn_to < {m} THEN txn_to ELSE txn_from END) FROM t", m = i64::MAX)
        );
    }

    #[test]
    fn test_decode_rows() {
        let row = Row::new(vec![
            Value::Text("price".into()),
            Value::Text("valid".into()),
            Value::Text("t_price".into()),
            Value::Text(r#"[{"name":"item","type_sql":"INT","nullable":false,"primary_key":true}]"#.into()),
        ]);
        let tables = decode_catalog_rows(&[row]).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].physical_name(), "t_price");
        assert_eq!(tables[0].kind, TemporalKind::Valid);
        assert_eq!(tables[0].key_columns(), vec!["item"]);
        assert!(tables[0].mapping.transaction.is_none());
    }

    #[test]
    fn test_decode_rejects_bad_kind() {
        let row = Row::new(vec![
            Value::Text("price".into()),
            Value::Text("sometimes".into()),
            Value::Text("price".into()),
            Value::Text("[]".into()),
        ]);
        assert!(matches!(decode_catalog_rows(&[row]), Err(AdapterError::Metadata(_))));
    }
}
