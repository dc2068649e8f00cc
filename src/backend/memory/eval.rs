/// Expression evaluation for the memory backend
///
/// SQL three-valued logic: comparisons involving NULL yield NULL, and a
/// filter keeps a row only when its predicate is TRUE.

use super::sql::{AggregateFunc, BinaryOp, Expr};
use crate::types::{BackendError, Row, Value};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Row being evaluated, plus the group it belongs to for aggregates.
pub struct Scope<'a> {
    pub columns: &'a [String],
    pub row: &'a Row,
    pub group: Option<&'a [Row]>,
}

impl<'a> Scope<'a> {
    pub const fn row(columns: &'a [String], row: &'a Row) -> Self {
        Self { columns, row, group: None }
    }

    fn column(&self, name: &str) -> Result<&Value, BackendError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| BackendError::ColumnNotFound(name.to_string()))?;
        Ok(self.row.get(idx).unwrap_or(&Value::Null))
    }
}

/// Evaluates a predicate; NULL counts as false.
pub fn matches(expr: Option<&Expr>, scope: &Scope<'_>) -> Result<bool, BackendError> {
    match expr {
        None => Ok(true),
        Some(e) => Ok(truth(&eval(e, scope)?)? == Some(true)),
    }
}

fn truth(value: &Value) -> Result<Option<bool>, BackendError> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Integer(i) => Ok(Some(*i != 0)),
        other => Err(BackendError::TypeMismatch(format!("expected a boolean, got {other:?}"))),
    }
}

fn from_truth(t: Option<bool>) -> Value {
    t.map_or(Value::Null, Value::Boolean)
}

/// Compares two values, reading text as a date or timestamp when the other side is one.
pub fn compare_values(a: &Value, b: &Value) -> Result<Option<Ordering>, BackendError> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    if let Some(ord) = a.compare(b) {
        return Ok(Some(ord));
    }
    let coerced = match (a, b) {
        (Value::Text(s), other @ (Value::Date(_) | Value::Timestamp(_))) => {
            parse_temporal_text(s).and_then(|v| v.compare(other))
        }
        (other @ (Value::Date(_) | Value::Timestamp(_)), Value::Text(s)) => {
            parse_temporal_text(s).and_then(|v| other.compare(&v))
        }
        (Value::Text(s), other @ (Value::Integer(_) | Value::Numeric(_) | Value::Real(_)))
        | (other @ (Value::Integer(_) | Value::Numeric(_) | Value::Real(_)), Value::Text(s)) => {
            let n = s.trim().parse::<Decimal>().ok().map(Value::Numeric);
            n.and_then(|n| if matches!(a, Value::Text(_)) { n.compare(other) } else { other.compare(&n) })
        }
        _ => None,
    };
    coerced
        .map(Some)
        .ok_or_else(|| BackendError::TypeMismatch(format!("cannot compare {a:?} with {b:?}")))
}

fn parse_temporal_text(s: &str) -> Option<Value> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Value::Date)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(Value::Timestamp))
        .ok()
}

/// Total order used by ORDER BY: NULLs first, incomparable values equal.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).ok().flatten().unwrap_or(Ordering::Equal),
    }
}

pub fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, BackendError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(name) => scope.column(name).cloned(),
        Expr::Neg(e) => negate(eval(e, scope)?),
        Expr::Not(e) => Ok(from_truth(truth(&eval(e, scope)?)?.map(|b| !b))),
        Expr::Binary { op: BinaryOp::And, left, right } => {
            let l = truth(&eval(left, scope)?)?;
            if l == Some(false) {
                return Ok(Value::Boolean(false));
            }
            let r = truth(&eval(right, scope)?)?;
            Ok(from_truth(match (l, r) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }))
        }
        Expr::Binary { op: BinaryOp::Or, left, right } => {
            let l = truth(&eval(left, scope)?)?;
            if l == Some(true) {
                return Ok(Value::Boolean(true));
            }
            let r = truth(&eval(right, scope)?)?;
            Ok(from_truth(match (l, r) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }))
        }
        Expr::Binary { op, left, right } => {
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            binary(*op, &l, &r)
        }
        Expr::IsNull { expr, negated } => Ok(Value::Boolean(eval(expr, scope)?.is_null() != *negated)),
        Expr::InList { expr, list, negated } => {
            let v = eval(expr, scope)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let candidate = eval(item, scope)?;
                match compare_values(&v, &candidate)? {
                    Some(Ordering::Equal) => return Ok(Value::Boolean(!negated)),
                    None => saw_null = true,
                    Some(_) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Boolean(*negated) })
        }
        Expr::Between { expr, low, high, negated } => {
            let v = eval(expr, scope)?;
            let lo = compare_values(&v, &eval(low, scope)?)?.map(|o| o != Ordering::Less);
            let hi = compare_values(&v, &eval(high, scope)?)?.map(|o| o != Ordering::Greater);
            let inside = match (lo, hi) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            Ok(from_truth(inside.map(|b| b != *negated)))
        }
        Expr::Like { expr, pattern, negated } => {
            let v = eval(expr, scope)?;
            let p = eval(pattern, scope)?;
            match (&v, &p) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (v, Value::Text(p)) => Ok(Value::Boolean(like_pattern_match(&v.to_string(), p) != *negated)),
                _ => Err(BackendError::TypeMismatch("LIKE pattern must be text".to_string())),
            }
        }
        Expr::Case { operand, branches, otherwise } => {
            let subject = operand.as_ref().map(|o| eval(o, scope)).transpose()?;
            for (when, then) in branches {
                let hit = match &subject {
                    Some(s) => compare_values(s, &eval(when, scope)?)? == Some(Ordering::Equal),
                    None => truth(&eval(when, scope)?)? == Some(true),
                };
                if hit {
                    return eval(then, scope);
                }
            }
            otherwise.as_ref().map_or(Ok(Value::Null), |e| eval(e, scope))
        }
        Expr::Aggregate { func, arg } => {
            let group = scope
                .group
                .ok_or_else(|| BackendError::Sql("aggregate used outside a query".to_string()))?;
            aggregate(*func, arg.as_deref(), scope.columns, group)
        }
        Expr::Function { name, args } => {
            let values = args.iter().map(|a| eval(a, scope)).collect::<Result<Vec<_>, _>>()?;
            function(name, values)
        }
    }
}

fn negate(v: Value) -> Result<Value, BackendError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| BackendError::Sql("integer overflow".to_string())),
        Value::Real(r) => Ok(Value::Real(-r)),
        Value::Numeric(d) => Ok(Value::Numeric(-d)),
        other => Err(BackendError::TypeMismatch(format!("cannot negate {other:?}"))),
    }
}

fn to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Numeric(d) => Some(*d),
        Value::Real(r) => Decimal::from_f64(*r),
        _ => None,
    }
}

fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(i) => Some(*i as f64),
        Value::Numeric(d) => d.to_f64(),
        Value::Real(r) => Some(*r),
        _ => None,
    }
}

fn overflow() -> BackendError {
    BackendError::Sql("numeric overflow".to_string())
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, BackendError> {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            let out = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Mod if *b == 0 => {
                    return Err(BackendError::Sql("division by zero".to_string()));
                }
                BinaryOp::Div => a.checked_div(*b),
                BinaryOp::Mod => a.checked_rem(*b),
                _ => None,
            };
            out.map(Value::Integer).ok_or_else(overflow)
        }
        (Value::Real(_), _) | (_, Value::Real(_)) => {
            let (a, b) = to_f64(l).zip(to_f64(r)).ok_or_else(|| type_error(op, l, r))?;
            Ok(Value::Real(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        _ => {
            let (a, b) = to_decimal(l).zip(to_decimal(r)).ok_or_else(|| type_error(op, l, r))?;
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            out.map(Value::Numeric).ok_or_else(overflow)
        }
    }
}

fn type_error(op: BinaryOp, l: &Value, r: &Value) -> BackendError {
    BackendError::TypeMismatch(format!("cannot apply {op:?} to {l:?} and {r:?}"))
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, BackendError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, l, r),
        BinaryOp::Concat => Ok(Value::Text(format!("{l}{r}"))),
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ord = compare_values(l, r)?;
            Ok(from_truth(ord.map(|o| match op {
                BinaryOp::Eq => o == Ordering::Equal,
                BinaryOp::NotEq => o != Ordering::Equal,
                BinaryOp::Lt => o == Ordering::Less,
                BinaryOp::LtEq => o != Ordering::Greater,
                BinaryOp::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            })))
        }
        BinaryOp::And | BinaryOp::Or => Err(BackendError::Sql("logical operator in value position".to_string())),
    }
}

fn aggregate(func: AggregateFunc, arg: Option<&Expr>, columns: &[String], group: &[Row]) -> Result<Value, BackendError> {
    let Some(arg) = arg else {
        return Ok(Value::Integer(group.len() as i64));
    };
    let mut values = Vec::with_capacity(group.len());
    for row in group {
        let v = eval(arg, &Scope::row(columns, row))?;
        if !v.is_null() {
            values.push(v);
        }
    }
    match func {
        AggregateFunc::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFunc::Sum | AggregateFunc::Avg => {
            let Some(first) = values.first().cloned() else {
                return Ok(Value::Null);
            };
            let mut total = first;
            for v in &values[1..] {
                total = arithmetic(BinaryOp::Add, &total, v)?;
            }
            if func == AggregateFunc::Sum {
                return Ok(total);
            }
            let count = Value::Integer(values.len() as i64);
            match total {
                Value::Integer(_) => arithmetic(BinaryOp::Div, &Value::Numeric(to_decimal(&total).ok_or_else(overflow)?), &count),
                other => arithmetic(BinaryOp::Div, &other, &count),
            }
        }
        AggregateFunc::Min | AggregateFunc::Max => {
            let wanted = if func == AggregateFunc::Min { Ordering::Less } else { Ordering::Greater };
            let mut best: Option<Value> = None;
            for v in values {
                best = match best {
                    Some(b) if compare_values(&v, &b)? != Some(wanted) => Some(b),
                    _ => Some(v),
                };
            }
            Ok(best.unwrap_or(Value::Null))
        }
    }
}

fn function(name: &str, args: Vec<Value>) -> Result<Value, BackendError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(BackendError::Sql(format!("{name} expects {n} argument(s)")))
        }
    };
    match name {
        "COALESCE" | "NVL" | "IFNULL" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "UPPER" | "LOWER" => {
            arity(1)?;
            Ok(match &args[0] {
                Value::Null => Value::Null,
                v if name == "UPPER" => Value::Text(v.to_string().to_uppercase()),
                v => Value::Text(v.to_string().to_lowercase()),
            })
        }
        "LENGTH" => {
            arity(1)?;
            Ok(match &args[0] {
                Value::Null => Value::Null,
                v => Value::Integer(v.to_string().chars().count() as i64),
            })
        }
        "ABS" => {
            arity(1)?;
            match &args[0] {
                Value::Integer(i) => i.checked_abs().map(Value::Integer).ok_or_else(overflow),
                Value::Numeric(d) => Ok(Value::Numeric(d.abs())),
                Value::Real(r) => Ok(Value::Real(r.abs())),
                Value::Null => Ok(Value::Null),
                other => Err(BackendError::TypeMismatch(format!("ABS of {other:?}"))),
            }
        }
        _ => Err(BackendError::Sql(format!("unknown function {name}"))),
    }
}

/// LIKE matching: `%` matches any run of characters, `_` exactly one.
fn like_pattern_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    match_recursive(&text, &pattern, 0, 0)
}

fn match_recursive(text: &[char], pattern: &[char], ti: usize, pi: usize) -> bool {
    if pi >= pattern.len() {
        return ti >= text.len();
    }
    if pattern[pi] == '%' {
        return match_recursive(text, pattern, ti, pi + 1)
            || (ti < text.len() && match_recursive(text, pattern, ti + 1, pi));
    }
    if ti >= text.len() {
        return false;
    }
    (pattern[pi] == '_' || text[ti] == pattern[pi]) && match_recursive(text, pattern, ti + 1, pi + 1)
}
