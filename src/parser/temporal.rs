//! Temporal clauses: instants, periods and statement qualifiers.

use super::common::{keyword, string_literal, ws};
use super::statement::{InstantLiteral, PeriodLiteral};
use crate::types::{Chronon, Granularity};
use chrono::{NaiveDate, NaiveDateTime};
use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::{map, map_res, opt, recognize, success},
    sequence::{preceded, tuple},
    IResult,
};

/// Prefix that selects the temporal flavour of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    None,
    /// `VALIDTIME [period]`
    ValidTime(Option<PeriodLiteral>),
    /// `NONSEQUENCED VALIDTIME`
    NonSequenced,
    /// `TRANSACTIONTIME`
    TransactionTime,
}

impl Qualifier {
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::None)
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const SECOND_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const FRACTION_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses the text of a time literal, keeping its granularity.
pub fn parse_time_text(text: &str) -> Result<InstantLiteral, String> {
    let text = text.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Ok(InstantLiteral::At(Chronon::from_date(d), Granularity::Day));
        }
    }
    for fmt in SECOND_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(InstantLiteral::At(Chronon::from_datetime(t), Granularity::Second));
        }
    }
    for fmt in FRACTION_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(InstantLiteral::At(Chronon::from_datetime(t), Granularity::Microsecond));
        }
    }
    Err(format!("Invalid time literal: '{text}'"))
}

fn digits<'a>(n: usize) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    take_while_m_n(n, n, |c: char| c.is_ascii_digit())
}

// Unquoted YYYY-MM-DD
fn bare_date(input: &str) -> IResult<&str, &str> {
    recognize(tuple((digits(4), char('-'), digits(2), char('-'), digits(2))))(input)
}

pub fn instant(input: &str) -> IResult<&str, InstantLiteral> {
    alt((
        map(keyword("NOW"), |_| InstantLiteral::Now),
        map(keyword("FOREVER"), |_| InstantLiteral::Forever),
        map(keyword("BEGINNING"), |_| InstantLiteral::Beginning),
        map_res(
            preceded(ws(alt((keyword("DATE"), keyword("TIMESTAMP")))), string_literal),
            |s: String| parse_time_text(&s),
        ),
        map_res(string_literal, |s: String| parse_time_text(&s)),
        map_res(bare_date, parse_time_text),
    ))(input)
}

/// `[PERIOD] [a, b)` with `[`/`(` and `]`/`)` marking closed and open bounds.
///
/// Periods made only of fixed instants are checked for emptiness here.
pub fn period_literal(input: &str) -> IResult<&str, PeriodLiteral> {
    map_res(
        preceded(
            opt(ws(keyword("PERIOD"))),
            tuple((
                ws(alt((char('['), char('(')))),
                ws(instant),
                ws(char(',')),
                ws(instant),
                ws(alt((char(']'), char(')')))),
            )),
        ),
        |(open, start, _, end, close)| {
            let period = PeriodLiteral {
                start,
                start_closed: open == '[',
                end,
                end_closed: close == ']',
            };
            if !period.mentions_now() && period.resolve(Chronon::BEGINNING).is_none() {
                return Err("empty period");
            }
            Ok(period)
        },
    )(input)
}

/// Whether `rest` opens a `[AND] VALID [PERIOD] <period>` clause.
///
/// A bare `valid` is left alone so it can name a user column.
pub fn starts_valid_clause(rest: &str, after_word_char: bool) -> bool {
    if after_word_char {
        return false;
    }
    let head: IResult<&str, _> = tuple((
        opt(ws(keyword("AND"))),
        ws(keyword("VALID")),
        opt(ws(keyword("PERIOD"))),
    ))(rest);
    head.is_ok_and(|(after, _)| after.starts_with('[') || after.starts_with('('))
}

/// `VALID [PERIOD] <period>` suffix clause.
pub fn valid_clause(input: &str) -> IResult<&str, PeriodLiteral> {
    preceded(ws(keyword("VALID")), period_literal)(input)
}

pub fn qualifier(input: &str) -> IResult<&str, Qualifier> {
    alt((
        map(
            tuple((ws(keyword("NONSEQUENCED")), ws(keyword("VALIDTIME")))),
            |_| Qualifier::NonSequenced,
        ),
        map(
            preceded(ws(keyword("VALIDTIME")), opt(period_literal)),
            Qualifier::ValidTime,
        ),
        map(ws(keyword("TRANSACTIONTIME")), |_| Qualifier::TransactionTime),
        success(Qualifier::None),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Period;

    fn day(s: &str) -> Chronon {
        Chronon::from_date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    #[test]
    fn test_instant_forms() {
        assert_eq!(instant("NOW").unwrap().1, InstantLiteral::Now);
        assert_eq!(instant("forever").unwrap().1, InstantLiteral::Forever);
        assert_eq!(
            instant("2020-06-01").unwrap().1,
            InstantLiteral::At(day("2020-06-01"), Granularity::Day)
        );
        assert_eq!(
            instant("DATE '2020-06-01'").unwrap().1,
            InstantLiteral::At(day("2020-06-01"), Granularity::Day)
        );
        assert!(matches!(
            instant("'2020-06-01 10:30:00'").unwrap().1,
            InstantLiteral::At(_, Granularity::Second)
        ));
        assert!(instant("'yesterday'").is_err());
    }

    #[test]
    fn test_closed_period_covers_last_day() {
        let (_, p) = period_literal("PERIOD [2020-01-01, 2020-12-31]").unwrap();
        assert_eq!(
            p.resolve(Chronon::BEGINNING),
            Period::new(day("2020-01-01"), day("2021-01-01"))
        );
    }

    #[test]
    fn test_open_start_skips_first_day() {
        let (_, p) = period_literal("(2020-06-30, 2020-12-31]").unwrap();
        assert_eq!(
            p.resolve(Chronon::BEGINNING),
            Period::new(day("2020-07-01"), day("2021-01-01"))
        );
    }

    #[test]
    fn test_half_open_period() {
        let (_, p) = period_literal("['2020-01-01', '2020-06-01')").unwrap();
        assert_eq!(
            p.resolve(Chronon::BEGINNING),
            Period::new(day("2020-01-01"), day("2020-06-01"))
        );
    }

    #[test]
    fn test_empty_period_rejected() {
        assert!(period_literal("[2020-06-01, 2020-06-01)").is_err());
        assert!(period_literal("[2020-06-02, 2020-06-01]").is_err());
        // Relative bounds are checked once "now" is known
        assert!(period_literal("[NOW, 2020-06-01)").is_ok());
    }

    #[test]
    fn test_qualifiers() {
        assert_eq!(qualifier("NONSEQUENCED VALIDTIME SELECT").unwrap().1, Qualifier::NonSequenced);
        assert_eq!(qualifier("VALIDTIME SELECT").unwrap().1, Qualifier::ValidTime(None));
        assert!(matches!(
            qualifier("VALIDTIME PERIOD [2020-01-01, 2021-01-01) SELECT").unwrap().1,
            Qualifier::ValidTime(Some(_))
        ));
        assert_eq!(qualifier("TRANSACTIONTIME SELECT").unwrap().1, Qualifier::TransactionTime);
        assert_eq!(qualifier("SELECT").unwrap().1, Qualifier::None);
    }
}
