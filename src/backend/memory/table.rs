use crate::types::{BackendError, Column, DataType, Row, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct MemTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl MemTable {
    pub fn new(name: String, columns: Vec<Column>) -> Result<Self, BackendError> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name.eq_ignore_ascii_case(&col.name)) {
                return Err(BackendError::Sql(format!("duplicate column '{}' in '{name}'", col.name)));
            }
        }
        Ok(Self {
            name,
            columns,
            rows: Vec::new(),
        })
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, BackendError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| BackendError::ColumnNotFound(format!("{}.{name}", self.name)))
    }

    /// Places values given for `names` into a full row, NULL elsewhere.
    pub fn reorder_values(&self, names: Option<&[String]>, values: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let expected = names.map_or(self.columns.len(), <[String]>::len);
        if values.len() != expected {
            return Err(BackendError::ColumnCountMismatch {
                expected,
                actual: values.len(),
            });
        }
        let Some(names) = names else {
            return Ok(values);
        };
        let mut ordered = vec![Value::Null; self.columns.len()];
        for (name, value) in names.iter().zip(values) {
            let idx = self.column_index(name)?;
            ordered[idx] = value;
        }
        Ok(ordered)
    }

    /// Coerces each value to its column type and checks NOT NULL.
    pub fn validate_and_coerce_types(&self, values: Vec<Value>) -> Result<Row, BackendError> {
        let mut out = Vec::with_capacity(values.len());
        for (col, value) in self.columns.iter().zip(values) {
            if value.is_null() {
                if !col.nullable {
                    return Err(BackendError::ConstraintViolation(format!(
                        "column '{}' of '{}' cannot be NULL",
                        col.name, self.name
                    )));
                }
                out.push(Value::Null);
                continue;
            }
            out.push(coerce(col, value)?);
        }
        Ok(Row::new(out))
    }

    /// Checks the primary key over a candidate set of rows.
    pub fn check_primary_key(&self, rows: &[Row]) -> Result<(), BackendError> {
        let key: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();
        if key.is_empty() {
            return Ok(());
        }
        for (i, row) in rows.iter().enumerate() {
            let duplicate = rows[..i]
                .iter()
                .any(|other| key.iter().all(|&k| row.get(k) == other.get(k)));
            if duplicate {
                return Err(BackendError::ConstraintViolation(format!(
                    "duplicate primary key in '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn mismatch(col: &Column, value: &Value) -> BackendError {
    BackendError::TypeMismatch(format!(
        "value {value:?} does not fit column '{}' of type {}",
        col.name, col.data_type
    ))
}

fn coerce(col: &Column, value: Value) -> Result<Value, BackendError> {
    let coerced = match (&col.data_type, &value) {
        (DataType::SmallInt | DataType::Integer | DataType::BigInt, _) => integer(&value),
        (DataType::Real, _) => match &value {
            Value::Integer(i) => Some(Value::Real(*i as f64)),
            Value::Numeric(d) => d.to_f64().map(Value::Real),
            Value::Real(_) => Some(value.clone()),
            Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::Real),
            _ => None,
        },
        (DataType::Numeric { scale, .. }, _) => {
            let d = match &value {
                Value::Integer(i) => Some(Decimal::from(*i)),
                Value::Numeric(d) => Some(*d),
                Value::Real(r) => Decimal::from_f64(*r),
                Value::Instant(c) => Some(Decimal::from(c.as_micros())),
                Value::Text(s) => s.trim().parse::<Decimal>().ok(),
                _ => None,
            };
            d.map(|d| Value::Numeric(d.round_dp(u32::from(*scale))))
        }
        (DataType::Text, _) => Some(Value::Text(value.to_string())),
        (DataType::Varchar { max_length }, _) | (DataType::Char { length: max_length }, _) => {
            let s = value.to_string();
            if s.chars().count() > *max_length {
                return Err(BackendError::ConstraintViolation(format!(
                    "value too long for column '{}': exceeds {}",
                    col.name, col.data_type
                )));
            }
            Some(Value::Text(s))
        }
        (DataType::Boolean, Value::Boolean(_)) => Some(value.clone()),
        (DataType::Boolean, Value::Integer(i)) => Some(Value::Boolean(*i != 0)),
        (DataType::Boolean, _) => None,
        (DataType::Date, Value::Date(_)) => Some(value.clone()),
        (DataType::Date, Value::Timestamp(t)) => Some(Value::Date(t.date())),
        (DataType::Date, Value::Text(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok().map(Value::Date),
        (DataType::Date, _) => None,
        (DataType::Timestamp, Value::Timestamp(_)) => Some(value.clone()),
        (DataType::Timestamp, Value::Date(d)) => Some(Value::Timestamp(d.and_time(NaiveTime::MIN))),
        (DataType::Timestamp, Value::Text(s)) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(Value::Timestamp),
        (DataType::Timestamp, _) => None,
    };
    coerced.ok_or_else(|| mismatch(col, &value))
}

fn integer(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(_) => Some(value.clone()),
        Value::Numeric(d) if d.fract().is_zero() => d.to_i64().map(Value::Integer),
        Value::Real(r) if r.fract() == 0.0 => Some(Value::Integer(*r as i64)),
        Value::Instant(c) => Some(Value::Integer(c.as_micros())),
        Value::Text(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MemTable {
        MemTable::new(
            "items".to_string(),
            vec![
                Column { name: "id".into(), data_type: DataType::Integer, nullable: false, primary_key: true },
                Column { name: "label".into(), data_type: DataType::Varchar { max_length: 5 }, nullable: true, primary_key: false },
                Column { name: "price".into(), data_type: DataType::Numeric { precision: 10, scale: 2 }, nullable: true, primary_key: false },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_coercion() {
        let row = table()
            .validate_and_coerce_types(vec![Value::Numeric(Decimal::from(3)), Value::Integer(42), Value::Integer(7)])
            .unwrap();
        assert_eq!(row.values[0], Value::Integer(3));
        assert_eq!(row.values[1], Value::Text("42".into()));
        assert_eq!(row.values[2], Value::Numeric(Decimal::from(7)));
    }

    #[test]
    fn test_not_null_and_length_enforced() {
        let t = table();
        assert!(matches!(
            t.validate_and_coerce_types(vec![Value::Null, Value::Null, Value::Null]),
            Err(BackendError::ConstraintViolation(_))
        ));
        assert!(matches!(
            t.validate_and_coerce_types(vec![Value::Integer(1), Value::Text("too long".into()), Value::Null]),
            Err(BackendError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_reorder_values() {
        let t = table();
        let names = vec!["label".to_string(), "id".to_string()];
        let values = t.reorder_values(Some(&names), vec![Value::Text("x".into()), Value::Integer(1)]).unwrap();
        assert_eq!(values, vec![Value::Integer(1), Value::Text("x".into()), Value::Null]);
        assert!(matches!(
            t.reorder_values(None, vec![Value::Integer(1)]),
            Err(BackendError::ColumnCountMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_primary_key_duplicates() {
        let t = table();
        let rows = vec![
            Row::new(vec![Value::Integer(1), Value::Null, Value::Null]),
            Row::new(vec![Value::Integer(1), Value::Null, Value::Null]),
        ];
        assert!(matches!(t.check_primary_key(&rows), Err(BackendError::ConstraintViolation(_))));
        assert!(t.check_primary_key(&rows[..1]).is_ok());
    }
}
