//! INSERT, UPDATE and DELETE on temporal tables.
//!
//! Changes are set-oriented: each step touches every qualifying row at once,
//! so a plan's length does not depend on how many rows it changes. Rows a
//! plan inserts carry the statement stamp as `txn_from`, and later steps skip
//! them with `txn_from < stamp`.

use super::plan::{AffectedCount, Plan, PlanOutput, PlanStep};
use super::sql::{clamp_from, clamp_to, column_list, lit, Conditions};
use super::TranslationContext;
use crate::catalog::{LogicalTable, TXN_FROM, TXN_TO, VALID_FROM, VALID_TO};
use crate::parser::{Assignment, Delete, Insert, Update, ValidScope};
use crate::types::{AdapterError, Chronon, Period, Result};

/// Valid-time extent of a change, or `None` for transaction-time-only tables.
fn scope_period(scope: ValidScope, table: &LogicalTable, now: Chronon) -> Result<Option<Period>> {
    if !table.kind.has_valid_time() {
        return match scope {
            ValidScope::FromNow => Ok(None),
            _ => Err(AdapterError::translation(&table.name, "table has no valid time")),
        };
    }
    let period = match scope {
        ValidScope::FromNow => Period::starting_at(now),
        ValidScope::All => Period::ALL,
        ValidScope::Period(p) => p
            .resolve(now)
            .ok_or_else(|| AdapterError::translation(&table.name, "valid period is empty"))?,
    };
    Ok(Some(period))
}

/// Current rows matching the user's predicate.
fn current(table: &LogicalTable, predicate: Option<&str>) -> Conditions {
    Conditions::from_predicate(predicate).and_if(
        table.kind.has_transaction_time(),
        format!("{TXN_TO} = {}", lit(Chronon::FOREVER)),
    )
}

fn overlapping(conditions: Conditions, period: Period) -> Conditions {
    conditions
        .and(format!("{VALID_FROM} < {}", lit(period.to)))
        .and(format!("{VALID_TO} > {}", lit(period.from)))
}

/// Rows whose valid interval strictly contains `instant`.
fn straddling(conditions: Conditions, instant: Chronon) -> Conditions {
    let at = lit(instant);
    conditions
        .and(format!("{VALID_FROM} < {at}"))
        .and(format!("{VALID_TO} > {at}"))
}

/// Excludes versions written by this statement.
fn older_than(conditions: Conditions, stamp: Chronon) -> Conditions {
    conditions.and(format!("{TXN_FROM} < {}", lit(stamp)))
}

/// Physical column list for a full version row.
fn physical_columns(table: &LogicalTable) -> String {
    let mut columns = table.user_column_names();
    columns.extend(table.mapping.time_column_names());
    column_list(&columns)
}

/// `INSERT INTO p (...) SELECT <values> FROM p WHERE ...`
fn copy_rows(table: &LogicalTable, values: &[String], conditions: &Conditions) -> String {
    format!(
        "INSERT INTO {p} ({cols}) SELECT {vals} FROM {p}{w}",
        p = table.physical_name(),
        cols = physical_columns(table),
        vals = values.join(", "),
        w = conditions.to_where(),
    )
}

fn user_values(table: &LogicalTable) -> Vec<String> {
    table.user_column_names().into_iter().map(str::to_string).collect()
}

/// Fails the plan when a matched current version is not older than the
/// stamp, so a lagging clock never leaves rows it cannot close.
fn stamp_guard(table: &LogicalTable, matching: &Conditions, stamp: Chronon) -> PlanStep {
    let newer = matching.clone().and(format!("{TXN_FROM} >= {}", lit(stamp)));
    PlanStep::guard(
        format!("SELECT {TXN_FROM} FROM {}{}", table.physical_name(), newer.to_where()),
        format!("'{}' has versions newer than the statement time", table.name),
    )
}

/// Stamp guard and probe over the versions the writes will close.
fn versioned_probe(table: &LogicalTable, matching: &Conditions, stamp: Chronon) -> [PlanStep; 2] {
    [
        stamp_guard(table, matching, stamp),
        probe(table, &older_than(matching.clone(), stamp)),
    ]
}

fn probe(table: &LogicalTable, conditions: &Conditions) -> PlanStep {
    let mut columns = table.user_column_names();
    if table.kind.has_valid_time() {
        columns.extend([VALID_FROM, VALID_TO]);
    }
    PlanStep::probe(format!(
        "SELECT {} FROM {}{}",
        column_list(&columns),
        table.physical_name(),
        conditions.to_where()
    ))
}

/// Copies of the unchanged parts of rows cut by the period bounds.
///
/// `txn` carries the transaction bounds to give the copies, if the table has them.
fn remainder_pieces(
    table: &LogicalTable,
    predicate: Option<&str>,
    period: Period,
    txn: Option<Chronon>,
) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    let txn_values = |values: &mut Vec<String>| {
        if let Some(stamp) = txn {
            values.push(lit(stamp));
            values.push(lit(Chronon::FOREVER));
        }
    };
    let guard = |c: Conditions| match txn {
        Some(stamp) => older_than(c, stamp),
        None => c,
    };

    if period.from != Chronon::BEGINNING {
        let mut values = user_values(table);
        values.extend([VALID_FROM.to_string(), lit(period.from)]);
        txn_values(&mut values);
        let conditions = guard(straddling(current(table, predicate), period.from));
        steps.push(PlanStep::write(copy_rows(table, &values, &conditions)));
    }
    if period.to != Chronon::FOREVER {
        let mut values = user_values(table);
        values.extend([lit(period.to), VALID_TO.to_string()]);
        txn_values(&mut values);
        let conditions = guard(straddling(current(table, predicate), period.to));
        steps.push(PlanStep::write(copy_rows(table, &values, &conditions)));
    }
    steps
}

/// Closes the transaction interval of the current versions matching `conditions`.
fn close_versions(table: &LogicalTable, conditions: &Conditions, stamp: Chronon) -> PlanStep {
    PlanStep::write(format!(
        "UPDATE {} SET {TXN_TO} = {}{}",
        table.physical_name(),
        lit(stamp),
        conditions.to_where()
    ))
}

fn dml_plan(table: &LogicalTable, stamp: Chronon, steps: Vec<PlanStep>) -> Plan {
    Plan {
        table: Some(table.name.clone()),
        stamp,
        steps,
        output: PlanOutput::Affected(AffectedCount::Probe),
        catalog_change: None,
    }
}

pub fn insert(insert: &Insert, table: &LogicalTable, ctx: &TranslationContext<'_>) -> Result<Plan> {
    let stamp = ctx.stamp;
    let columns: Vec<&str> = match &insert.columns {
        Some(names) => names
            .iter()
            .map(|name| {
                table
                    .columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|c| c.name.as_str())
                    .ok_or_else(|| AdapterError::translation(&table.name, format!("unknown column '{name}'")))
            })
            .collect::<Result<_>>()?,
        None => table.user_column_names(),
    };

    let period = if table.kind.has_valid_time() {
        match &insert.valid {
            Some(p) => Some(
                p.resolve(stamp)
                    .ok_or_else(|| AdapterError::translation(&table.name, "valid period is empty"))?,
            ),
            None => Some(Period::starting_at(stamp)),
        }
    } else if insert.valid.is_some() {
        return Err(AdapterError::translation(&table.name, "table has no valid time"));
    } else {
        None
    };

    let keys = table.key_columns();
    let key_positions: Vec<(&str, usize)> = keys
        .iter()
        .map(|k| {
            columns
                .iter()
                .position(|c| c == k)
                .map(|i| (*k, i))
                .ok_or_else(|| AdapterError::translation(&table.name, format!("missing value for key column '{k}'")))
        })
        .collect::<Result<_>>()?;

    let mut target = columns.clone();
    target.extend(table.mapping.time_column_names());
    let target = column_list(&target);

    let mut steps = Vec::with_capacity(insert.rows.len() * 2);
    for row in &insert.rows {
        if row.len() != columns.len() {
            return Err(AdapterError::translation(
                &table.name,
                format!("expected {} values, got {}", columns.len(), row.len()),
            ));
        }

        if !key_positions.is_empty() {
            let mut conditions = Conditions::default();
            for (key, i) in &key_positions {
                conditions = conditions.and(format!("{key} = {}", row[*i]));
            }
            conditions = conditions.and_if(
                table.kind.has_transaction_time(),
                format!("{TXN_TO} = {}", lit(Chronon::FOREVER)),
            );
            if let Some(p) = period {
                conditions = overlapping(conditions, p);
            }
            let key_list: Vec<&str> = key_positions.iter().map(|(k, _)| *k).collect();
            steps.push(PlanStep::guard(
                format!(
                    "SELECT {} FROM {}{}",
                    column_list(&key_list),
                    table.physical_name(),
                    conditions.to_where()
                ),
                format!("sequenced primary key violation on '{}'", table.name),
            ));
        }

        let mut values = row.clone();
        if let Some(p) = period {
            values.extend([lit(p.from), lit(p.to)]);
        }
        if table.kind.has_transaction_time() {
            values.extend([lit(stamp), lit(Chronon::FOREVER)]);
        }
        steps.push(PlanStep::write(format!(
            "INSERT INTO {} ({target}) VALUES ({})",
            table.physical_name(),
            values.join(", ")
        )));
    }

    Ok(Plan {
        table: Some(table.name.clone()),
        stamp,
        steps,
        output: PlanOutput::Affected(AffectedCount::Fixed(insert.rows.len() as u64)),
        catalog_change: None,
    })
}

/// Assignments checked against the user columns, with canonical names.
fn resolve_assignments(update: &Update, table: &LogicalTable) -> Result<Vec<Assignment>> {
    update
        .assignments
        .iter()
        .map(|a| {
            table
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&a.column))
                .map(|c| Assignment {
                    column: c.name.clone(),
                    expr: a.expr.clone(),
                })
                .ok_or_else(|| AdapterError::translation(&table.name, format!("cannot assign to column '{}'", a.column)))
        })
        .collect()
}

/// User columns with the SET expressions in place of assigned ones.
fn updated_values(table: &LogicalTable, assignments: &[Assignment]) -> Vec<String> {
    table
        .user_column_names()
        .into_iter()
        .map(|c| {
            assignments
                .iter()
                .find(|a| a.column == c)
                .map_or_else(|| c.to_string(), |a| a.expr.clone())
        })
        .collect()
}

pub fn update(update: &Update, table: &LogicalTable, ctx: &TranslationContext<'_>) -> Result<Plan> {
    let assignments = resolve_assignments(update, table)?;
    let keys = table.key_columns();
    if let Some(a) = assignments.iter().find(|a| keys.contains(&a.column.as_str())) {
        return Err(AdapterError::translation(
            &table.name,
            format!("cannot assign key column '{}'; delete and re-insert the row instead", a.column),
        ));
    }
    let stamp = ctx.stamp;
    let predicate = update.predicate.as_deref();
    let mut steps = Vec::new();

    match scope_period(update.scope, table, stamp)? {
        None => {
            let matching = current(table, predicate);
            steps.extend(versioned_probe(table, &matching, stamp));
            let mut values = updated_values(table, &assignments);
            values.extend([lit(stamp), lit(Chronon::FOREVER)]);
            let older = older_than(matching, stamp);
            steps.push(PlanStep::write(copy_rows(table, &values, &older)));
            steps.push(close_versions(table, &older, stamp));
        }
        Some(period) if table.kind.has_transaction_time() => {
            let matching = overlapping(current(table, predicate), period);
            steps.extend(versioned_probe(table, &matching, stamp));
            steps.extend(remainder_pieces(table, predicate, period, Some(stamp)));

            let mut values = updated_values(table, &assignments);
            values.extend([
                clamp_from(VALID_FROM, period.from),
                clamp_to(VALID_TO, period.to),
                lit(stamp),
                lit(Chronon::FOREVER),
            ]);
            let older = older_than(matching, stamp);
            steps.push(PlanStep::write(copy_rows(table, &values, &older)));
            steps.push(close_versions(table, &older, stamp));
        }
        Some(period) => {
            let matching = overlapping(current(table, predicate), period);
            steps.push(probe(table, &matching));
            steps.extend(remainder_pieces(table, predicate, period, None));

            let mut sets: Vec<String> = assignments.iter().map(|a| format!("{} = {}", a.column, a.expr)).collect();
            if period.from != Chronon::BEGINNING {
                sets.push(format!("{VALID_FROM} = {}", clamp_from(VALID_FROM, period.from)));
            }
            if period.to != Chronon::FOREVER {
                sets.push(format!("{VALID_TO} = {}", clamp_to(VALID_TO, period.to)));
            }
            if !sets.is_empty() {
                steps.push(PlanStep::write(format!(
                    "UPDATE {} SET {}{}",
                    table.physical_name(),
                    sets.join(", "),
                    matching.to_where()
                )));
            }
        }
    }

    Ok(dml_plan(table, stamp, steps))
}

pub fn delete(delete: &Delete, table: &LogicalTable, ctx: &TranslationContext<'_>) -> Result<Plan> {
    let stamp = ctx.stamp;
    let predicate = delete.predicate.as_deref();
    let mut steps = Vec::new();

    match scope_period(delete.scope, table, stamp)? {
        None => {
            let matching = current(table, predicate);
            steps.extend(versioned_probe(table, &matching, stamp));
            steps.push(close_versions(table, &older_than(matching, stamp), stamp));
        }
        Some(period) if table.kind.has_transaction_time() => {
            let matching = overlapping(current(table, predicate), period);
            steps.extend(versioned_probe(table, &matching, stamp));
            steps.extend(remainder_pieces(table, predicate, period, Some(stamp)));
            steps.push(close_versions(table, &older_than(matching, stamp), stamp));
        }
        Some(period) => {
            let matching = overlapping(current(table, predicate), period);
            steps.push(probe(table, &matching));
            // The tail must be copied before the head is trimmed
            if period.to != Chronon::FOREVER {
                let mut values = user_values(table);
                values.extend([lit(period.to), VALID_TO.to_string()]);
                let cut = straddling(current(table, predicate), period.to);
                steps.push(PlanStep::write(copy_rows(table, &values, &cut)));
            }
            if period.from != Chronon::BEGINNING {
                let cut = straddling(current(table, predicate), period.from);
                steps.push(PlanStep::write(format!(
                    "UPDATE {} SET {VALID_TO} = {}{}",
                    table.physical_name(),
                    lit(period.from),
                    cut.to_where()
                )));
            }
            steps.push(PlanStep::write(format!(
                "DELETE FROM {}{}",
                table.physical_name(),
                matching.to_where()
            )));
        }
    }

    Ok(dml_plan(table, stamp, steps))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{catalog_with, day, plan_for};
    use crate::parser::TemporalKind;
    use crate::translator::{AffectedCount, PlanOutput, StepRole};
    use crate::types::{AdapterError, Chronon};

    fn d(s: &str) -> i64 {
        day(s).as_micros()
    }

    const F: i64 = i64::MAX;

    #[test]
    fn test_insert_defaults_to_now_onwards() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let t = day("2021-03-01");
        let plan = plan_for("INSERT INTO price VALUES ('apple', 3), ('pear', 4)", &catalog, t).unwrap();
        assert_eq!(
            plan.statements(),
            vec![
                format!("INSERT INTO price (item, amount, valid_from, valid_to) VALUES ('apple', 3, {}, {F})", t.as_micros()),
                format!("INSERT INTO price (item, amount, valid_from, valid_to) VALUES ('pear', 4, {}, {F})", t.as_micros()),
            ]
        );
        assert_eq!(plan.output, PlanOutput::Affected(AffectedCount::Fixed(2)));
    }

    #[test]
    fn test_insert_with_valid_period_and_key_guard() {
        let catalog = catalog_with(TemporalKind::Bitemporal, true);
        let t = day("2021-03-01");
        let plan = plan_for(
            "INSERT INTO price (amount, item) VALUES (7, 'fig') VALID PERIOD [2021-01-01, 2021-02-01)",
            &catalog,
            t,
        )
        .unwrap();
        let (from, to) = (d("2021-01-01"), d("2021-02-01"));
        assert_eq!(
            plan.steps[0].sql,
            format!("SELECT item FROM price WHERE item = 'fig' AND txn_to = {F} AND valid_from < {to} AND valid_to > {from}")
        );
        assert!(matches!(plan.steps[0].role, StepRole::Guard { .. }));
        assert_eq!(
            plan.steps[1].sql,
            format!(
                "INSERT INTO price (amount, item, valid_from, valid_to, txn_from, txn_to) VALUES (7, 'fig', {from}, {to}, {}, {F})",
                t.as_micros()
            )
        );
    }

    #[test]
    fn test_insert_rejections() {
        let valid = catalog_with(TemporalKind::Valid, false);
        let txn = catalog_with(TemporalKind::Transaction, false);
        let t = day("2021-03-01");

        let wrong_arity = plan_for("INSERT INTO price VALUES ('a')", &valid, t).unwrap_err();
        assert!(matches!(wrong_arity, AdapterError::Translation { .. }));

        let unknown_col = plan_for("INSERT INTO price (color) VALUES ('red')", &valid, t).unwrap_err();
        assert!(matches!(unknown_col, AdapterError::Translation { .. }));

        let no_valid_time =
            plan_for("INSERT INTO price VALUES ('a', 1) VALID PERIOD [2021-01-01, 2021-02-01)", &txn, t).unwrap_err();
        assert!(matches!(no_valid_time, AdapterError::Translation { .. }));

        let empty = plan_for("INSERT INTO price VALUES ('a', 1) VALID PERIOD [NOW, 2021-01-01)", &valid, t)
            .unwrap_err();
        assert!(matches!(empty, AdapterError::Translation { .. }));
    }

    #[test]
    fn test_valid_time_update_splits_at_period_bounds() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let plan = plan_for(
            "VALIDTIME PERIOD [2021-01-10, 2021-01-20) UPDATE price SET amount = amount + 1 WHERE item = 'apple'",
            &catalog,
            day("2021-03-01"),
        )
        .unwrap();
        let (s, e) = (d("2021-01-10"), d("2021-01-20"));
        assert_eq!(
            plan.statements(),
            vec![
                format!("SELECT item, amount, valid_from, valid_to FROM price WHERE (item = 'apple') AND valid_from < {e} AND valid_to > {s}"),
                format!("INSERT INTO price (item, amount, valid_from, valid_to) SELECT item, amount, valid_from, {s} FROM price WHERE (item = 'apple') AND valid_from < {s} AND valid_to > {s}"),
                format!("INSERT INTO price (item, amount, valid_from, valid_to) SELECT item, amount, {e}, valid_to FROM price WHERE (item = 'apple') AND valid_from < {e} AND valid_to > {e}"),
                format!("UPDATE price SET amount = amount + 1, valid_from = CASE WHEN valid_from < {s} THEN {s} ELSE valid_from END, valid_to = CASE WHEN valid_to > {e} THEN {e} ELSE valid_to END WHERE (item = 'apple') AND valid_from < {e} AND valid_to > {s}"),
            ]
        );
        assert_eq!(plan.steps[0].role, StepRole::Probe);
        assert_eq!(plan.output, PlanOutput::Affected(AffectedCount::Probe));
    }

    #[test]
    fn test_bitemporal_update_keeps_history() {
        let catalog = catalog_with(TemporalKind::Bitemporal, false);
        let t = day("2021-03-01");
        let plan = plan_for("UPDATE price SET amount = 5", &catalog, t).unwrap();
        let t = t.as_micros();
        assert_eq!(
            plan.statements(),
            vec![
                format!("SELECT txn_from FROM price WHERE txn_to = {F} AND valid_from < {F} AND valid_to > {t} AND txn_from >= {t}"),
                format!("SELECT item, amount, valid_from, valid_to FROM price WHERE txn_to = {F} AND valid_from < {F} AND valid_to > {t} AND txn_from < {t}"),
                format!("INSERT INTO price (item, amount, valid_from, valid_to, txn_from, txn_to) SELECT item, amount, valid_from, {t}, {t}, {F} FROM price WHERE txn_to = {F} AND valid_from < {t} AND valid_to > {t} AND txn_from < {t}"),
                format!("INSERT INTO price (item, amount, valid_from, valid_to, txn_from, txn_to) SELECT item, 5, CASE WHEN valid_from < {t} THEN {t} ELSE valid_from END, valid_to, {t}, {F} FROM price WHERE txn_to = {F} AND valid_from < {F} AND valid_to > {t} AND txn_from < {t}"),
                format!("UPDATE price SET txn_to = {t} WHERE txn_to = {F} AND valid_from < {F} AND valid_to > {t} AND txn_from < {t}"),
            ]
        );
    }

    #[test]
    fn test_transaction_time_update_and_delete() {
        let catalog = catalog_with(TemporalKind::Transaction, false);
        let t = day("2021-03-01");
        let plan = plan_for("UPDATE price SET amount = 2 WHERE item = 'a'", &catalog, t).unwrap();
        let t_ = t.as_micros();
        assert_eq!(
            plan.statements(),
            vec![
                format!("SELECT txn_from FROM price WHERE (item = 'a') AND txn_to = {F} AND txn_from >= {t_}"),
                format!("SELECT item, amount FROM price WHERE (item = 'a') AND txn_to = {F} AND txn_from < {t_}"),
                format!("INSERT INTO price (item, amount, txn_from, txn_to) SELECT item, 2, {t_}, {F} FROM price WHERE (item = 'a') AND txn_to = {F} AND txn_from < {t_}"),
                format!("UPDATE price SET txn_to = {t_} WHERE (item = 'a') AND txn_to = {F} AND txn_from < {t_}"),
            ]
        );

        let plan = plan_for("DELETE FROM price", &catalog, t).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert!(matches!(plan.steps[0].role, StepRole::Guard { .. }));
        assert_eq!(plan.steps[1].role, StepRole::Probe);

        let err = plan_for("VALIDTIME DELETE FROM price", &catalog, t).unwrap_err();
        assert!(matches!(err, AdapterError::Translation { .. }));
    }

    #[test]
    fn test_valid_time_delete_trims_and_removes() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let plan = plan_for(
            "DELETE FROM price WHERE item = 'a' VALID PERIOD [2021-01-10, 2021-01-20)",
            &catalog,
            day("2021-03-01"),
        )
        .unwrap();
        let (s, e) = (d("2021-01-10"), d("2021-01-20"));
        assert_eq!(
            plan.statements()[1..],
            [
                format!("INSERT INTO price (item, amount, valid_from, valid_to) SELECT item, amount, {e}, valid_to FROM price WHERE (item = 'a') AND valid_from < {e} AND valid_to > {e}"),
                format!("UPDATE price SET valid_to = {s} WHERE (item = 'a') AND valid_from < {s} AND valid_to > {s}"),
                format!("DELETE FROM price WHERE (item = 'a') AND valid_from < {e} AND valid_to > {s}"),
            ]
        );
    }

    #[test]
    fn test_full_history_delete_has_no_split_steps() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let plan = plan_for("VALIDTIME DELETE FROM price", &catalog, day("2021-03-01")).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[1].sql.starts_with("DELETE FROM price"));
        assert!(plan.steps[1].sql.contains(&Chronon::BEGINNING.as_micros().to_string()));
    }

    #[test]
    fn test_update_of_key_column_rejected() {
        let catalog = catalog_with(TemporalKind::Bitemporal, true);
        let err = plan_for("VALIDTIME UPDATE price SET ITEM = 'pear' WHERE item = 'fig'", &catalog, day("2021-03-01"))
            .unwrap_err();
        assert!(matches!(&err, AdapterError::Translation { message, .. } if message.contains("item")), "{err:?}");

        // Other columns of a keyed table stay assignable
        assert!(plan_for("UPDATE price SET amount = 1 WHERE item = 'fig'", &catalog, day("2021-03-01")).is_ok());
    }

    #[test]
    fn test_update_of_time_column_rejected() {
        let catalog = catalog_with(TemporalKind::Valid, false);
        let err = plan_for("UPDATE price SET valid_to = 0", &catalog, day("2021-03-01")).unwrap_err();
        assert!(matches!(err, AdapterError::Translation { .. }));
    }
}
