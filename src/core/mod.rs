// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod column;
pub mod row;
pub mod time;

// Re-exports for convenience
pub use error::{AdapterError, BackendError, Result};
pub use value::{Value, quote_sql_string};
pub use data_type::DataType;
pub use column::Column;
pub use row::Row;
pub use time::{Chronon, Clock, Granularity, ManualClock, Period, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::cmp::Ordering;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(3.5).to_string(), "3.5");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Instant(Chronon::FOREVER).to_string(), "forever");
    }

    #[test]
    fn test_value_as_int() {
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Text("hello".to_string()).as_int(), None);
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn test_value_compare_across_numeric_types() {
        let ten = Value::Integer(10);
        let ten_and_half = Value::Numeric(Decimal::new(105, 1));
        assert_eq!(ten.compare(&ten_and_half), Some(Ordering::Less));
        assert_eq!(Value::Real(11.0).compare(&ten), Some(Ordering::Greater));
        assert_eq!(ten.compare(&Value::Null), None);
        assert_eq!(ten.compare(&Value::Text("10".to_string())), None);
    }

    #[test]
    fn test_value_compare_date_with_timestamp() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let ts = date.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(Value::Date(date).compare(&Value::Timestamp(ts)), Some(Ordering::Less));
    }

    #[test]
    fn test_to_sql_literal_escapes_quotes() {
        assert_eq!(Value::Text("O'Brien".to_string()).to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::Integer(-3).to_sql_literal(), "-3");
    }

    #[test]
    fn test_to_chronon() {
        assert_eq!(Value::Integer(5).to_chronon(), Some(Chronon::from_micros(5)));
        assert_eq!(Value::Numeric(Decimal::from(7)).to_chronon(), Some(Chronon::from_micros(7)));
        assert_eq!(Value::Boolean(true).to_chronon(), None);
    }
}
