//! Small builders for the SQL text the translator emits.

use crate::types::Chronon;

/// Chronons are stored as plain integers.
#[must_use]
pub fn lit(c: Chronon) -> String {
    c.as_micros().to_string()
}

/// Conjunction of conditions, rendered as a WHERE clause.
#[derive(Debug, Default, Clone)]
pub struct Conditions(Vec<String>);

impl Conditions {
    /// Starts from the user's predicate, parenthesised so its ORs stay inside.
    #[must_use]
    pub fn from_predicate(predicate: Option<&str>) -> Self {
        let mut c = Self::default();
        if let Some(p) = predicate {
            c.0.push(format!("({p})"));
        }
        c
    }

    #[must_use]
    pub fn and(mut self, condition: impl Into<String>) -> Self {
        self.0.push(condition.into());
        self
    }

    #[must_use]
    pub fn and_if(self, cond: bool, condition: impl Into<String>) -> Self {
        if cond { self.and(condition) } else { self }
    }

    /// ` WHERE a AND b`, or nothing when empty.
    #[must_use]
    pub fn to_where(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.0.join(" AND "))
        }
    }
}

/// `CASE WHEN col < bound THEN bound ELSE col END`, or `col` when the bound is `BEGINNING`.
#[must_use]
pub fn clamp_from(col: &str, bound: Chronon) -> String {
    if bound == Chronon::BEGINNING {
        col.to_string()
    } else {
        let b = lit(bound);
        format!("CASE WHEN {col} < {b} THEN {b} ELSE {col} END")
    }
}

/// `CASE WHEN col > bound THEN bound ELSE col END`, or `col` when the bound is `FOREVER`.
#[must_use]
pub fn clamp_to(col: &str, bound: Chronon) -> String {
    if bound == Chronon::FOREVER {
        col.to_string()
    } else {
        let b = lit(bound);
        format!("CASE WHEN {col} > {b} THEN {b} ELSE {col} END")
    }
}

#[must_use]
pub fn column_list(columns: &[&str]) -> String {
    columns.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions() {
        let c = Conditions::from_predicate(Some("a = 1 OR b = 2")).and("txn_to = 5").and_if(false, "x");
        assert_eq!(c.to_where(), " WHERE (a = 1 OR b = 2) AND txn_to = 5");
        assert_eq!(Conditions::from_predicate(None).to_where(), "");
    }

    #[test]
    fn test_clamps_skip_sentinels() {
        assert_eq!(clamp_from("valid_from", Chronon::BEGINNING), "valid_from");
        assert_eq!(clamp_to("valid_to", Chronon::from_micros(9)), "CASE WHEN valid_to > 9 THEN 9 ELSE valid_to END");
    }
}
