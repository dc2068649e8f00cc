use super::plan::{Plan, PlanOutput, PlanStep, Reconstruction};
use super::sql::{lit, Conditions};
use super::TranslationContext;
use crate::catalog::{LogicalTable, TXN_FROM, TXN_TO, VALID_FROM, VALID_TO};
use crate::parser::{called_functions, AsOf, Projection, Select, SelectFlavour};
use crate::types::{AdapterError, Chronon, Result};

const AGGREGATES: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// Instants the query is pinned to, one per time dimension.
#[derive(Debug, Default)]
struct Pins {
    valid: Option<Chronon>,
    transaction: Option<Chronon>,
}

fn pins(select: &Select, table: &LogicalTable, now: Chronon) -> Result<Pins> {
    let mut pins = Pins::default();
    for as_of in &select.as_of {
        let (slot, instant, dimension) = match *as_of {
            AsOf::Valid(i) => (&mut pins.valid, i, "valid"),
            AsOf::Transaction(i) => (&mut pins.transaction, i, "transaction"),
            AsOf::Unqualified(i) if table.kind.has_valid_time() => (&mut pins.valid, i, "valid"),
            AsOf::Unqualified(i) => (&mut pins.transaction, i, "transaction"),
        };
        if slot.is_some() {
            return Err(AdapterError::translation(&table.name, format!("AS OF {dimension} given twice")));
        }
        *slot = Some(instant.resolve(now));
    }
    if pins.valid.is_some() && !table.kind.has_valid_time() {
        return Err(AdapterError::translation(&table.name, "table has no valid time"));
    }
    if pins.transaction.is_some() && !table.kind.has_transaction_time() {
        return Err(AdapterError::translation(&table.name, "table has no transaction time"));
    }
    Ok(pins)
}

/// Versions visible at transaction instant `at`, or the current ones.
fn transaction_filter(conditions: Conditions, table: &LogicalTable, at: Option<Chronon>) -> Conditions {
    if !table.kind.has_transaction_time() {
        return conditions;
    }
    match at {
        Some(t) => conditions
            .and(format!("{TXN_FROM} <= {}", lit(t)))
            .and(format!("{TXN_TO} > {}", lit(t))),
        None => conditions.and(format!("{TXN_TO} = {}", lit(Chronon::FOREVER))),
    }
}

fn valid_at(conditions: Conditions, at: Chronon) -> Conditions {
    conditions
        .and(format!("{VALID_FROM} <= {}", lit(at)))
        .and(format!("{VALID_TO} > {}", lit(at)))
}

fn projected(select: &Select, table: &LogicalTable) -> Vec<String> {
    match &select.projection {
        Projection::All => table.user_column_names().into_iter().map(str::to_string).collect(),
        Projection::Items(items) => items.clone(),
    }
}

fn render(select: &Select, table: &LogicalTable, items: &[String], conditions: &Conditions, order_by: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT {}{} FROM {}{}",
        if select.distinct { "DISTINCT " } else { "" },
        items.join(", "),
        table.physical_name(),
        conditions.to_where()
    );
    if let Some(order) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    sql
}

fn query_plan(table: &LogicalTable, stamp: Chronon, sql: String, reconstruction: Reconstruction) -> Plan {
    Plan {
        table: Some(table.name.clone()),
        stamp,
        steps: vec![PlanStep::query(sql)],
        output: PlanOutput::Rows(reconstruction),
        catalog_change: None,
    }
}

fn require_valid_time(table: &LogicalTable) -> Result<()> {
    if table.kind.has_valid_time() {
        Ok(())
    } else {
        Err(AdapterError::translation(&table.name, "table has no valid time"))
    }
}

pub fn select(select: &Select, table: &LogicalTable, ctx: &TranslationContext<'_>) -> Result<Plan> {
    let stamp = ctx.stamp;
    let pins = pins(select, table, stamp)?;
    let predicate = select.predicate.as_deref();
    let mut items = projected(select, table);

    match select.flavour {
        SelectFlavour::Snapshot => {
            let mut conditions = Conditions::from_predicate(predicate);
            if table.kind.has_valid_time() {
                conditions = valid_at(conditions, pins.valid.unwrap_or(stamp));
            }
            conditions = transaction_filter(conditions, table, pins.transaction);
            let sql = render(select, table, &items, &conditions, select.order_by.as_deref());
            Ok(query_plan(table, stamp, sql, Reconstruction::Plain))
        }
        SelectFlavour::Sequenced(period) => {
            require_valid_time(table)?;
            if pins.valid.is_some() {
                return Err(AdapterError::translation(&table.name, "AS OF VALID cannot be combined with VALIDTIME"));
            }
            if select.order_by.is_some() {
                return Err(AdapterError::translation(&table.name, "ORDER BY is not supported on coalesced results"));
            }
            if items
                .iter()
                .flat_map(|item| called_functions(item))
                .any(|f| AGGREGATES.contains(&f.to_uppercase().as_str()))
            {
                return Err(AdapterError::translation(&table.name, "aggregates are not supported on coalesced results"));
            }

            let clip = period
                .map(|p| {
                    p.resolve(stamp)
                        .ok_or_else(|| AdapterError::translation(&table.name, "valid period is empty"))
                })
                .transpose()?;
            let mut conditions = transaction_filter(Conditions::from_predicate(predicate), table, pins.transaction);
            if let Some(p) = clip {
                conditions = conditions
                    .and(format!("{VALID_FROM} < {}", lit(p.to)))
                    .and(format!("{VALID_TO} > {}", lit(p.from)));
            }

            // Coalescing needs equal attributes adjacent, ordered by start
            let order: Vec<String> = (1..=items.len() + 1).map(|i| i.to_string()).collect();
            items.extend([VALID_FROM.to_string(), VALID_TO.to_string()]);
            let sql = render(select, table, &items, &conditions, Some(&order.join(", ")));
            Ok(query_plan(table, stamp, sql, Reconstruction::Coalesce { clip }))
        }
        SelectFlavour::NonSequenced => {
            require_valid_time(table)?;
            if pins.valid.is_some() {
                return Err(AdapterError::translation(&table.name, "AS OF VALID cannot be combined with NONSEQUENCED"));
            }
            let conditions = transaction_filter(Conditions::from_predicate(predicate), table, pins.transaction);
            items.extend([VALID_FROM.to_string(), VALID_TO.to_string()]);
            let sql = render(select, table, &items, &conditions, select.order_by.as_deref());
            Ok(query_plan(table, stamp, sql, Reconstruction::Intervals { time_columns: 2 }))
        }
        SelectFlavour::TransactionHistory => {
            if !table.kind.has_transaction_time() {
                return Err(AdapterError::translation(&table.name, "table has no transaction time"));
            }
            if pins.transaction.is_some() {
                return Err(AdapterError::translation(
                    &table.name,
                    "AS OF TRANSACTION cannot be combined with TRANSACTIONTIME",
                ));
            }
            let mut conditions = Conditions::from_predicate(predicate);
            if let Some(at) = pins.valid {
                conditions = valid_at(conditions, at);
            }
            let mut time_columns = 2;
            if table.kind.has_valid_time() {
                items.extend([VALID_FROM.to_string(), VALID_TO.to_string()]);
                time_columns = 4;
            }
            items.extend([TXN_FROM.to_string(), TXN_TO.to_string()]);
            let default_order = (items.len() - 1).to_string();
            let order = select.order_by.as_deref().unwrap_or(&default_order);
            let sql = render(select, table, &items, &conditions, Some(order));
            Ok(query_plan(table, stamp, sql, Reconstruction::Intervals { time_columns }))
        }
    }
}
