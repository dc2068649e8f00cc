//! Statement results and reconstruction of temporal rows.

use super::coalesce::coalesce;
use crate::translator::Reconstruction;
use crate::types::{BackendError, Chronon, Period, Row, Value};

/// Named columns with their rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column, top to bottom.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(RowSet),
    /// Rows affected, counted in logical rows
    Count(u64),
}

impl StatementResult {
    #[must_use]
    pub const fn rows(&self) -> Option<&RowSet> {
        match self {
            Self::Rows(set) => Some(set),
            Self::Count(_) => None,
        }
    }

    #[must_use]
    pub const fn count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Rows(_) => None,
        }
    }
}

fn decode(value: &Value, column: &str) -> Result<Chronon, BackendError> {
    value
        .to_chronon()
        .ok_or_else(|| BackendError::TypeMismatch(format!("column '{column}' does not hold a time bound: {value}")))
}

/// Splits a row into its attributes and its last `time_columns` values decoded.
fn split_times(mut row: Row, columns: &[String], time_columns: usize) -> Result<(Vec<Value>, Vec<Chronon>), BackendError> {
    if row.len() < time_columns {
        return Err(BackendError::ColumnCountMismatch {
            expected: time_columns,
            actual: row.len(),
        });
    }
    let split = row.len() - time_columns;
    let times = row.values[split..]
        .iter()
        .enumerate()
        .map(|(i, v)| decode(v, columns.get(split + i).map_or("?", String::as_str)))
        .collect::<Result<Vec<_>, _>>()?;
    row.values.truncate(split);
    Ok((row.values, times))
}

/// Turns the backend's answer to a query step into the user-facing row set.
pub fn reconstruct(
    reconstruction: Reconstruction,
    columns: Vec<String>,
    rows: Vec<Row>,
) -> Result<RowSet, BackendError> {
    match reconstruction {
        Reconstruction::Plain => Ok(RowSet::new(columns, rows)),
        Reconstruction::Intervals { time_columns } => {
            let rows = rows
                .into_iter()
                .map(|row| {
                    let (mut values, times) = split_times(row, &columns, time_columns)?;
                    values.extend(times.into_iter().map(Value::Instant));
                    Ok(Row::new(values))
                })
                .collect::<Result<Vec<_>, BackendError>>()?;
            Ok(RowSet::new(columns, rows))
        }
        Reconstruction::Coalesce { clip } => {
            let periods = rows
                .into_iter()
                .filter_map(|row| match split_times(row, &columns, 2) {
                    Ok((values, times)) => Period::new(times[0], times[1]).map(|p| Ok((values, p))),
                    Err(e) => Some(Err(e)),
                })
                .collect::<Result<Vec<_>, BackendError>>()?;
            let rows = coalesce(periods, clip)
                .map(|(mut values, period)| {
                    values.extend([Value::Instant(period.from), Value::Instant(period.to)]);
                    Row::new(values)
                })
                .collect();
            Ok(RowSet::new(columns, rows))
        }
    }
}
