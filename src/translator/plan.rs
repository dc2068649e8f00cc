use crate::catalog::LogicalTable;
use crate::types::{Chronon, Period};

/// What the executor does with the outcome of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRole {
    /// Selects the current rows a change will touch; no rows ends the plan early
    Probe,
    /// Must return no rows, otherwise the plan fails with `message`
    Guard { message: String },
    Write,
    /// Final SELECT of a temporal query
    Query,
    /// Statement forwarded unchanged
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub sql: String,
    pub role: StepRole,
}

impl PlanStep {
    pub fn probe(sql: String) -> Self {
        Self { sql, role: StepRole::Probe }
    }

    pub fn guard(sql: String, message: impl Into<String>) -> Self {
        Self {
            sql,
            role: StepRole::Guard { message: message.into() },
        }
    }

    pub fn write(sql: String) -> Self {
        Self { sql, role: StepRole::Write }
    }

    pub fn query(sql: String) -> Self {
        Self { sql, role: StepRole::Query }
    }
}

/// Where the reported affected-row count comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffectedCount {
    /// Rows returned by the probe step
    Probe,
    Fixed(u64),
}

/// Post-processing of the rows returned by a `Query` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconstruction {
    /// User columns only, returned as they come
    Plain,
    /// The trailing `time_columns` columns are chronons to decode
    Intervals { time_columns: usize },
    /// Trailing valid bounds are decoded, merged and optionally clipped
    Coalesce { clip: Option<Period> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutput {
    Affected(AffectedCount),
    Rows(Reconstruction),
    /// Whatever the backend returned for a forwarded statement
    Backend,
}

/// Catalog mutation applied once the plan has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    Register(LogicalTable),
    Unregister(String),
}

/// Ordered standard-SQL steps implementing one temporal statement.
///
/// Plans with more than a forwarded statement run inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub table: Option<String>,
    pub stamp: Chronon,
    pub steps: Vec<PlanStep>,
    pub output: PlanOutput,
    pub catalog_change: Option<CatalogChange>,
}

impl Plan {
    pub fn pass_through(sql: &str, stamp: Chronon) -> Self {
        Self {
            table: None,
            stamp,
            steps: vec![PlanStep {
                sql: sql.to_string(),
                role: StepRole::PassThrough,
            }],
            output: PlanOutput::Backend,
            catalog_change: None,
        }
    }

    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        matches!(self.output, PlanOutput::Backend)
    }

    /// The SQL of every step, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.sql.as_str()).collect()
    }
}
