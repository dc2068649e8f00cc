//! Rewrites classified temporal statements into plans of standard SQL.

mod ddl;
mod dml;
mod plan;
mod queries;
pub mod sql;

pub use plan::{AffectedCount, CatalogChange, Plan, PlanOutput, PlanStep, Reconstruction, StepRole};

use crate::catalog::Catalog;
use crate::parser::{referenced_tables, Statement};
use crate::types::{AdapterError, Chronon, Result};

/// Per-statement inputs to translation.
#[derive(Debug, Clone, Copy)]
pub struct TranslationContext<'a> {
    /// Statement time: "now" for defaults and the transaction stamp
    pub stamp: Chronon,
    /// SQL type of physical time columns
    pub time_type: &'a str,
    pub table_prefix: &'a str,
    /// Metadata table mirroring the catalog, when persisted
    pub catalog_table: Option<&'a str>,
}

/// Builds the plan for one parsed statement.
///
/// `sql` is the original text, forwarded when the statement turns out not
/// to be temporal. Nothing here touches the backend.
pub fn translate(sql: &str, stmt: &Statement, catalog: &Catalog, ctx: &TranslationContext<'_>) -> Result<Plan> {
    match stmt {
        Statement::PassThrough(text) => {
            if let Some(table) = referenced_tables(text).into_iter().find(|t| catalog.contains(t)) {
                return Err(AdapterError::translation(
                    &table,
                    "statement is not a supported temporal form for a temporal table",
                ));
            }
            Ok(Plan::pass_through(text, ctx.stamp))
        }
        Statement::CreateTemporalTable(create) => ddl::create_table(create, catalog, ctx),
        Statement::Drop { table } => {
            if catalog.contains(table) {
                let table = catalog.lookup(table)?;
                ddl::drop_table(&table, ctx)
            } else {
                Ok(Plan::pass_through(sql.trim().trim_end_matches(';').trim_end(), ctx.stamp))
            }
        }
        other => {
            let name = other.table().unwrap_or_default();
            let table = match catalog.lookup(name) {
                Ok(table) => table,
                // Plain SQL on an ordinary table
                Err(AdapterError::UnknownTable(_)) if !other.is_explicitly_temporal() => {
                    return Ok(Plan::pass_through(sql.trim().trim_end_matches(';').trim_end(), ctx.stamp));
                }
                Err(e) => return Err(e),
            };
            match other {
                Statement::TemporalInsert(insert) => dml::insert(insert, &table, ctx),
                Statement::TemporalUpdate(update) => dml::update(update, &table, ctx),
                Statement::TemporalDelete(delete) => dml::delete(delete, &table, ctx),
                Statement::TemporalSelect(select) => queries::select(select, &table, ctx),
                _ => Err(AdapterError::translation(name, "unexpected statement kind")),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::LogicalTable;
    use crate::parser::{parse_statement, ColumnDef, TemporalKind};
    use chrono::NaiveDate;

    pub fn day(s: &str) -> Chronon {
        Chronon::from_date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    pub fn ctx(stamp: Chronon) -> TranslationContext<'static> {
        TranslationContext {
            stamp,
            time_type: "BIGINT",
            table_prefix: "",
            catalog_table: Some("tsql2_catalog"),
        }
    }

    pub fn catalog_with(kind: TemporalKind, key: bool) -> Catalog {
        let catalog = Catalog::new();
        let columns = vec![
            ColumnDef { name: "item".into(), type_sql: "VARCHAR(20)".into(), nullable: !key, primary_key: key },
            ColumnDef { name: "amount".into(), type_sql: "INTEGER".into(), nullable: true, primary_key: false },
        ];
        catalog.register(LogicalTable::new("price", kind, columns, "").unwrap()).unwrap();
        catalog
    }

    pub fn plan_for(sql: &str, catalog: &Catalog, stamp: Chronon) -> Result<Plan> {
        let stmt = parse_statement(sql)?;
        translate(sql, &stmt, catalog, &ctx(stamp))
    }

    #[test]
    fn test_plain_statement_on_ordinary_table_passes_through() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let plan = plan_for("SELECT * FROM other;", &catalog, day("2021-01-01")).unwrap();
        assert!(plan.is_pass_through());
        assert_eq!(plan.statements(), vec!["SELECT * FROM other"]);
    }

    #[test]
    fn test_explicit_temporal_statement_on_unknown_table_fails() {
        let catalog = Catalog::new();
        let err = plan_for("VALIDTIME SELECT * FROM ghost", &catalog, day("2021-01-01")).unwrap_err();
        assert!(matches!(err, AdapterError::UnknownTable(t) if t == "ghost"));
    }

    #[test]
    fn test_unsupported_statement_on_temporal_table_is_rejected() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let err = plan_for("SELECT p.item FROM price p JOIN x ON p.item = x.id", &catalog, day("2021-01-01")).unwrap_err();
        assert!(matches!(err, AdapterError::Translation { .. }));
    }

    #[test]
    fn test_drop_of_unknown_table_passes_through() {
        let catalog = Catalog::new();
        let plan = plan_for("DROP TABLE plain", &catalog, day("2021-01-01")).unwrap();
        assert!(plan.is_pass_through());
    }
}
