use super::plan::{AffectedCount, CatalogChange, Plan, PlanOutput, PlanStep};
use super::TranslationContext;
use crate::catalog::{delete_entry_sql, insert_entry_sql, Catalog, LogicalTable};
use crate::parser::CreateTable;
use crate::types::{AdapterError, Result};

/// Physical table: user columns as declared, then NOT NULL time bounds.
///
/// PRIMARY KEY is not carried over; a key only holds per instant, which the
/// INSERT guard checks instead.
pub fn create_table(create: &CreateTable, catalog: &Catalog, ctx: &TranslationContext<'_>) -> Result<Plan> {
    if catalog.contains(&create.name) {
        return Err(AdapterError::DuplicateTable(create.name.clone()));
    }
    let table = LogicalTable::new(&create.name, create.kind, create.columns.clone(), ctx.table_prefix)?;

    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            if c.nullable {
                format!("{} {}", c.name, c.type_sql)
            } else {
                format!("{} {} NOT NULL", c.name, c.type_sql)
            }
        })
        .collect();
    defs.extend(
        table
            .mapping
            .time_column_names()
            .into_iter()
            .map(|name| format!("{name} {} NOT NULL", ctx.time_type)),
    );

    let mut steps = vec![PlanStep::write(format!(
        "CREATE TABLE {} ({})",
        table.physical_name(),
        defs.join(", ")
    ))];
    if let Some(catalog_table) = ctx.catalog_table {
        steps.push(PlanStep::write(insert_entry_sql(catalog_table, &table)?));
    }

    Ok(Plan {
        table: Some(table.name.clone()),
        stamp: ctx.stamp,
        steps,
        output: PlanOutput::Affected(AffectedCount::Fixed(0)),
        catalog_change: Some(CatalogChange::Register(table)),
    })
}

pub fn drop_table(table: &LogicalTable, ctx: &TranslationContext<'_>) -> Result<Plan> {
    let mut steps = vec![PlanStep::write(format!("DROP TABLE {}", table.physical_name()))];
    if let Some(catalog_table) = ctx.catalog_table {
        steps.push(PlanStep::write(delete_entry_sql(catalog_table, &table.name)));
    }
    Ok(Plan {
        table: Some(table.name.clone()),
        stamp: ctx.stamp,
        steps,
        output: PlanOutput::Affected(AffectedCount::Fixed(0)),
        catalog_change: Some(CatalogChange::Unregister(table.name.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{catalog_with, day, plan_for};
    use super::*;
    use crate::parser::TemporalKind;

    #[test]
    fn test_create_bitemporal_table() {
        let catalog = Catalog::new();
        let plan = plan_for(
            "CREATE TABLE acct (id INTEGER PRIMARY KEY, owner VARCHAR(30)) AS VALID STATE AND TRANSACTION",
            &catalog,
            day("2021-01-01"),
        )
        .unwrap();
        assert_eq!(
            plan.steps[0].sql,
            "CREATE TABLE acct (id INTEGER NOT NULL, owner VARCHAR(30), valid_from BIGINT NOT NULL, \
             valid_to BIGINT NOT NULL, txn_from BIGINT NOT NULL, txn_to BIGINT NOT NULL)"
        );
        assert!(plan.steps[1].sql.starts_with("INSERT INTO tsql2_catalog"));
        match plan.catalog_change {
            Some(CatalogChange::Register(t)) => assert_eq!(t.kind, TemporalKind::Bitemporal),
            other => panic!("Expected Register, got {other:?}"),
        }
        // Nothing is registered until the plan runs
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_create_duplicate_fails_before_execution() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let err = plan_for("CREATE TABLE price (a INT) AS VALID", &catalog, day("2021-01-01")).unwrap_err();
        assert!(matches!(err, AdapterError::DuplicateTable(_)));
    }

    #[test]
    fn test_create_with_reserved_column_fails() {
        let catalog = Catalog::new();
        let err = plan_for("CREATE TABLE t (valid_from INT) AS VALID", &catalog, day("2021-01-01")).unwrap_err();
        assert!(matches!(err, AdapterError::Translation { .. }));
    }

    #[test]
    fn test_drop_catalogued_table() {
        let catalog = catalog_with(TemporalKind::Transaction, false);
        let plan = plan_for("DROP TABLE Price", &catalog, day("2021-01-01")).unwrap();
        assert_eq!(
            plan.statements(),
            vec!["DROP TABLE price", "DELETE FROM tsql2_catalog WHERE table_name = 'price'"]
        );
        assert_eq!(plan.catalog_change, Some(CatalogChange::Unregister("price".into())));
    }
}
