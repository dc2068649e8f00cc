/// Time domain shared by valid time and transaction time.
///
/// A chronon is a count of microseconds since 1970-01-01T00:00:00Z. The
/// extreme values act as sentinels: `FOREVER` marks an interval that is
/// still open ("until changed"), `BEGINNING` the start of all time.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Chronon(i64);

impl Chronon {
    pub const FOREVER: Self = Self(i64::MAX);
    pub const BEGINNING: Self = Self(i64::MIN);

    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_datetime(date.and_time(NaiveTime::MIN))
    }

    #[must_use]
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.and_utc().timestamp_micros())
    }

    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.0 == i64::MAX || self.0 == i64::MIN
    }

    /// Calendar form of the chronon; `None` for sentinels.
    #[must_use]
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        if self.is_sentinel() {
            return None;
        }
        DateTime::<Utc>::from_timestamp_micros(self.0).map(|t| t.naive_utc())
    }

    /// Moves the chronon forward by one granule. Sentinels stay put.
    #[must_use]
    pub const fn next(self, granularity: Granularity) -> Self {
        if self.is_sentinel() {
            return self;
        }
        Self(self.0.saturating_add(granularity.micros()))
    }
}

impl fmt::Display for Chronon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::FOREVER {
            return write!(f, "forever");
        }
        if *self == Self::BEGINNING {
            return write!(f, "beginning");
        }
        match self.to_datetime() {
            Some(t) if t.time() == NaiveTime::MIN => write!(f, "{}", t.format("%Y-%m-%d")),
            Some(t) if t.nanosecond() == 0 => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Some(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.6f")),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Precision of a time literal, used to close period bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Second,
    Microsecond,
}

impl Granularity {
    #[must_use]
    pub const fn micros(self) -> i64 {
        match self {
            Self::Day => MICROS_PER_DAY,
            Self::Second => MICROS_PER_SECOND,
            Self::Microsecond => 1,
        }
    }
}

/// Half-open chronon interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    pub from: Chronon,
    pub to: Chronon,
}

impl Period {
    pub const ALL: Self = Self {
        from: Chronon::BEGINNING,
        to: Chronon::FOREVER,
    };

    /// Builds a period, rejecting empty ranges.
    #[must_use]
    pub fn new(from: Chronon, to: Chronon) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

    #[must_use]
    pub const fn starting_at(from: Chronon) -> Self {
        Self {
            from,
            to: Chronon::FOREVER,
        }
    }

    #[must_use]
    pub fn contains(&self, instant: Chronon) -> bool {
        self.from <= instant && instant < self.to
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.from < other.to && other.from < self.to
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Self::new(self.from.max(other.from), self.to.min(other.to))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Source of "now" for statement time and transaction stamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Chronon;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Chronon {
        Chronon(Utc::now().timestamp_micros())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: Chronon) -> Self {
        Self {
            micros: AtomicI64::new(start.as_micros()),
        }
    }

    pub fn set(&self, instant: Chronon) {
        self.micros.store(instant.as_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Chronon {
        Chronon(self.micros.load(Ordering::SeqCst))
    }
}
