use crate::types::{Chronon, Granularity, Period};
use serde::{Deserialize, Serialize};

/// A classified statement. Predicates, SET expressions, projections and
/// inserted values are kept as verbatim SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTemporalTable(CreateTable),
    Drop {
        table: String,
    },
    TemporalInsert(Insert),
    TemporalUpdate(Update),
    TemporalDelete(Delete),
    TemporalSelect(Select),
    /// Forwarded to the backend unchanged
    PassThrough(String),
}

impl Statement {
    /// Logical table the statement targets, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::CreateTemporalTable(c) => Some(&c.name),
            Self::Drop { table } => Some(table),
            Self::TemporalInsert(i) => Some(&i.table),
            Self::TemporalUpdate(u) => Some(&u.table),
            Self::TemporalDelete(d) => Some(&d.table),
            Self::TemporalSelect(s) => Some(&s.table),
            Self::PassThrough(_) => None,
        }
    }

    /// Whether the statement carried temporal keywords of its own.
    ///
    /// Statements without them are only temporal because their table is.
    #[must_use]
    pub const fn is_explicitly_temporal(&self) -> bool {
        match self {
            Self::CreateTemporalTable(_) => true,
            Self::Drop { .. } | Self::PassThrough(_) => false,
            Self::TemporalInsert(i) => i.explicit,
            Self::TemporalUpdate(u) => u.explicit,
            Self::TemporalDelete(d) => d.explicit,
            Self::TemporalSelect(s) => s.explicit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    /// Valid time only (AS VALID STATE)
    Valid,
    /// Transaction time only (AS TRANSACTION)
    Transaction,
    /// Valid and transaction time (AS VALID STATE AND TRANSACTION)
    Bitemporal,
}

impl TemporalKind {
    #[must_use]
    pub const fn has_valid_time(self) -> bool {
        matches!(self, Self::Valid | Self::Bitemporal)
    }

    #[must_use]
    pub const fn has_transaction_time(self) -> bool {
        matches!(self, Self::Transaction | Self::Bitemporal)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Transaction => "transaction",
            Self::Bitemporal => "bitemporal",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" => Some(Self::Valid),
            "transaction" => Some(Self::Transaction),
            "bitemporal" => Some(Self::Bitemporal),
            _ => None,
        }
    }
}

impl std::fmt::Display for TemporalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-defined column of a temporal table; the declared type is kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub type_sql: String,
    pub nullable: bool,
    /// Part of the natural key (declared PRIMARY KEY)
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub kind: TemporalKind,
}

/// Time literal inside a temporal clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantLiteral {
    Now,
    Forever,
    Beginning,
    At(Chronon, Granularity),
}

impl InstantLiteral {
    #[must_use]
    pub const fn resolve(self, now: Chronon) -> Chronon {
        match self {
            Self::Now => now,
            Self::Forever => Chronon::FOREVER,
            Self::Beginning => Chronon::BEGINNING,
            Self::At(c, _) => c,
        }
    }

    const fn granularity(self) -> Granularity {
        match self {
            Self::At(_, g) => g,
            _ => Granularity::Microsecond,
        }
    }

    /// Moves a resolved instant past this literal's granule.
    #[must_use]
    pub const fn resolve_after(self, now: Chronon) -> Chronon {
        self.resolve(now).next(self.granularity())
    }
}

/// Period as written: bounds plus bracket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodLiteral {
    pub start: InstantLiteral,
    pub start_closed: bool,
    pub end: InstantLiteral,
    pub end_closed: bool,
}

impl PeriodLiteral {
    /// Normalises to a half-open period; `None` when the result is empty.
    #[must_use]
    pub fn resolve(&self, now: Chronon) -> Option<Period> {
        let from = if self.start_closed {
            self.start.resolve(now)
        } else {
            self.start.resolve_after(now)
        };
        let to = if self.end_closed {
            self.end.resolve_after(now)
        } else {
            self.end.resolve(now)
        };
        Period::new(from, to)
    }

    #[must_use]
    pub const fn mentions_now(&self) -> bool {
        matches!(self.start, InstantLiteral::Now) || matches!(self.end, InstantLiteral::Now)
    }
}

/// Valid-time extent an UPDATE or DELETE applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidScope {
    /// No qualifier: from now on
    FromNow,
    /// Bare VALIDTIME prefix: all of valid time
    All,
    Period(PeriodLiteral),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub valid: Option<PeriodLiteral>,
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: String,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub predicate: Option<String>,
    pub scope: ValidScope,
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub predicate: Option<String>,
    pub scope: ValidScope,
    pub explicit: bool,
}

/// How a temporal SELECT treats time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectFlavour {
    /// State at one instant, user columns only
    Snapshot,
    /// Coalesced history, optionally clipped to a period
    Sequenced(Option<PeriodLiteral>),
    /// Stored valid-time intervals as they are
    NonSequenced,
    /// Every stored version with its transaction-time bounds
    TransactionHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsOf {
    /// `AS OF t`: valid time when the table has it, transaction time otherwise
    Unqualified(InstantLiteral),
    Valid(InstantLiteral),
    Transaction(InstantLiteral),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Items(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub flavour: SelectFlavour,
    pub distinct: bool,
    pub projection: Projection,
    pub table: String,
    pub predicate: Option<String>,
    pub as_of: Vec<AsOf>,
    pub order_by: Option<String>,
    pub explicit: bool,
}
