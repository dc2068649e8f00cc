use super::time::Chronon;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    // Numeric types
    Integer(i64),
    Real(f64),
    Numeric(Decimal),
    // String types
    Text(String),
    // Boolean
    Boolean(bool),
    // Date/Time types
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Decoded time bound of a temporal result row
    Instant(Chronon),
}

impl Value {
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_instant(&self) -> Option<Chronon> {
        match self {
            Self::Instant(c) => Some(*c),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Reads a stored time column back as a chronon.
    ///
    /// Drivers hand BIGINT columns back as integers and NUMBER(19) columns as
    /// decimals, so both are accepted.
    #[must_use]
    pub fn to_chronon(&self) -> Option<Chronon> {
        match self {
            Self::Integer(i) => Some(Chronon::from_micros(*i)),
            Self::Numeric(d) => d.to_i64().map(Chronon::from_micros),
            Self::Text(s) => s.trim().parse::<i64>().ok().map(Chronon::from_micros),
            Self::Instant(c) => Some(*c),
            _ => None,
        }
    }

    /// SQL comparison. `None` when either side is NULL or the types are not comparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Numeric(a), Self::Numeric(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Numeric(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Numeric(a), Self::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(b),
            (Self::Real(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Integer(a), Self::Real(b)) => (*a as f64).partial_cmp(b),
            (Self::Real(a), Self::Numeric(b)) => a.partial_cmp(&b.to_f64()?),
            (Self::Numeric(a), Self::Real(b)) => a.to_f64()?.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Timestamp(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
            (Self::Timestamp(a), Self::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
            (Self::Instant(a), Self::Instant(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Renders the value as an SQL literal.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => format!("{r:?}"),
            Self::Numeric(d) => d.to_string(),
            Self::Text(s) => quote_sql_string(s),
            Self::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Self::Timestamp(t) => format!("TIMESTAMP '{}'", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Instant(c) => c.as_micros().to_string(),
        }
    }
}

/// Quotes a string for inclusion in SQL text, doubling embedded quotes.
#[must_use]
pub fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Numeric(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Instant(c) => write!(f, "{c}"),
        }
    }
}
