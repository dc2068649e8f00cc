use crate::types::{DataType, Value};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{alpha1, char, digit1, multispace0, multispace1},
    combinator::{map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

pub const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            take_while(is_ident_char),
        )),
        |s: &str| s.to_string(),
    )(input)
}

// Words that end an expression or clause and can never name a column
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "ORDER", "BY", "AS", "SET",
    "VALUES", "INTO", "CASE", "WHEN", "THEN", "ELSE", "END", "IS", "IN", "LIKE",
    "BETWEEN", "NULL", "TRUE", "FALSE", "DISTINCT", "ASC", "DESC", "LIMIT",
];

// Identifier that is not a reserved keyword, so expression parsing stops at clause boundaries
pub fn non_keyword_identifier(input: &str) -> IResult<&str, String> {
    use nom::combinator::verify;

    verify(identifier, |s: &String| {
        let upper = s.to_uppercase();
        !RESERVED.contains(&upper.as_str())
    })(input)
}

/// Case-insensitive keyword that must end at a word boundary.
///
/// Multi-word keywords ("ORDER BY", "AS OF") accept any whitespace between words.
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let mut rest = input;
        for (i, word) in kw.split_whitespace().enumerate() {
            if i > 0 {
                let (r, _) = multispace1(rest)?;
                rest = r;
            }
            let (r, _) = tag_no_case(word)(rest)?;
            rest = r;
        }
        if rest.chars().next().is_some_and(is_ident_char) {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        Ok((rest, &input[..input.len() - rest.len()]))
    }
}

/// Single-quoted string literal with `''` escapes; may be empty.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let Some(pos) = rest.find('\'') else {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
        };
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(stripped) = after.strip_prefix('\'') {
            out.push('\'');
            rest = stripped;
        } else {
            return Ok((after, out));
        }
    }
}

fn precision_args(input: &str) -> IResult<&str, (u32, Option<u32>)> {
    delimited(
        ws(char('(')),
        tuple((
            ws(map_res(digit1, |s: &str| s.parse::<u32>())),
            opt(preceded(ws(char(',')), ws(map_res(digit1, |s: &str| s.parse::<u32>())))),
        )),
        ws(char(')')),
    )(input)
}

fn length_arg(input: &str) -> IResult<&str, Option<usize>> {
    opt(delimited(
        ws(char('(')),
        ws(map_res(digit1, |s: &str| s.parse::<usize>())),
        ws(char(')')),
    ))(input)
}

pub fn data_type(input: &str) -> IResult<&str, DataType> {
    alt((
        // Numeric types with precision/scale
        map(
            tuple((
                alt((keyword("NUMERIC"), keyword("DECIMAL"), keyword("NUMBER"))),
                opt(precision_args),
            )),
            |(_, params)| match params {
                Some((p, s)) => DataType::Numeric {
                    precision: u8::try_from(p).unwrap_or(u8::MAX),
                    scale: u8::try_from(s.unwrap_or(0)).unwrap_or(u8::MAX),
                },
                None => DataType::Numeric { precision: 38, scale: 0 },
            },
        ),
        // Integer types
        map(keyword("SMALLINT"), |_| DataType::SmallInt),
        map(keyword("INTEGER"), |_| DataType::Integer),
        map(keyword("INT"), |_| DataType::Integer),
        map(keyword("BIGINT"), |_| DataType::BigInt),
        // Floating point
        map(keyword("DOUBLE PRECISION"), |_| DataType::Real),
        map(alt((keyword("REAL"), keyword("FLOAT"), keyword("DOUBLE"))), |_| DataType::Real),
        // String types with length
        map(
            tuple((alt((keyword("VARCHAR2"), keyword("VARCHAR"))), length_arg)),
            |(_, len)| DataType::Varchar { max_length: len.unwrap_or(255) },
        ),
        map(
            tuple((keyword("CHAR"), length_arg)),
            |(_, len)| DataType::Char { length: len.unwrap_or(1) },
        ),
        map(alt((keyword("TEXT"), keyword("CLOB"))), |_| DataType::Text),
        // Boolean
        map(alt((keyword("BOOLEAN"), keyword("BOOL"))), |_| DataType::Boolean),
        // Date/Time types
        map(keyword("TIMESTAMP"), |_| DataType::Timestamp),
        map(keyword("DATE"), |_| DataType::Date),
    ))(input)
}

fn text_value(s: String) -> Value {
    // Quoted dates and timestamps are typed on sight
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Value::Date(d);
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        return Value::Timestamp(t);
    }
    Value::Text(s)
}

pub fn value(input: &str) -> IResult<&str, Value> {
    alt((
        map(keyword("NULL"), |_| Value::Null),
        map(keyword("TRUE"), |_| Value::Boolean(true)),
        map(keyword("FALSE"), |_| Value::Boolean(false)),

        // DATE 'YYYY-MM-DD'
        map_res(
            preceded(ws(keyword("DATE")), string_literal),
            |s: String| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Value::Date),
        ),
        // TIMESTAMP 'YYYY-MM-DD HH:MM:SS'
        map_res(
            preceded(ws(keyword("TIMESTAMP")), string_literal),
            |s: String| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").map(Value::Timestamp),
        ),

        map(string_literal, text_value),

        // Numeric with decimal point
        map_res(
            recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
            |s: &str| Decimal::from_str(s).map(Value::Numeric),
        ),

        // Integer
        map_res(
            recognize(pair(opt(char('-')), digit1)),
            |s: &str| s.parse::<i64>().map(Value::Integer),
        ),
    ))(input)
}

/// Byte offset of the first top-level position where `is_stop` fires.
///
/// Quoted strings and identifiers are skipped and parentheses tracked, so a
/// stop inside `f(a, b)` or `'a, b'` is not seen. Returns the input length
/// when nothing stops the scan and `Err(offset)` for an unterminated quote.
fn scan_top_level<F>(input: &str, mut is_stop: F) -> Result<usize, usize>
where
    F: FnMut(&str, bool, usize) -> bool,
{
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut prev_ident = false;
    let mut i = 0;
    while i < input.len() {
        if !input.is_char_boundary(i) {
            i += 1;
            continue;
        }
        let c = bytes[i];
        if c == b'\'' || c == b'"' || c == b'`' {
            let mut j = i + 1;
            loop {
                if j >= bytes.len() {
                    return Err(i);
                }
                if bytes[j] == c {
                    if bytes.get(j + 1) == Some(&c) {
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            i = j + 1;
            prev_ident = false;
            continue;
        }
        if is_stop(&input[i..], prev_ident, depth) {
            return Ok(i);
        }
        match c {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        prev_ident = (c as char).is_ascii_alphanumeric() || c == b'_' || c == b'$';
        i += 1;
    }
    Ok(input.len())
}

fn stop_matches(rest: &str, prev_ident: bool, stop: &'static str) -> bool {
    let first = stop.chars().next().unwrap_or(' ');
    if first.is_ascii_alphabetic() {
        !prev_ident && keyword(stop)(rest).is_ok()
    } else {
        rest.starts_with(stop)
    }
}

/// Verbatim SQL text up to the first top-level stop keyword or delimiter.
///
/// An unmatched `)` also ends the text. The result is trimmed and must not be empty.
pub fn raw_until<'a>(stops: &'static [&'static str]) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    raw_until_or(stops, |_, _| false)
}

/// `raw_until` that also ends where `ends_here(rest, after_word_char)` holds
/// at the top level.
pub fn raw_until_or<'a>(
    stops: &'static [&'static str],
    ends_here: fn(&str, bool) -> bool,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let end = scan_top_level(input, |rest, prev_ident, depth| {
            depth == 0
                && (rest.starts_with(')')
                    || stops.iter().any(|stop| stop_matches(rest, prev_ident, stop))
                    || ends_here(rest, prev_ident))
        })
        .map_err(|pos| nom::Err::Error(Error::new(&input[pos..], ErrorKind::Char)))?;
        let text = input[..end].trim();
        if text.is_empty() {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::TakeUntil)));
        }
        Ok((&input[end..], text))
    }
}

/// Splits a script into statements on top-level semicolons.
pub fn split_statements(script: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut rest = script;
    while !rest.trim().is_empty() {
        match scan_top_level(rest, |r, _, _| r.starts_with(';')) {
            Ok(end) => {
                let stmt = rest[..end].trim();
                if !stmt.is_empty() {
                    statements.push(stmt);
                }
                rest = rest.get(end + 1..).unwrap_or("");
            }
            Err(_) => {
                statements.push(rest.trim());
                break;
            }
        }
    }
    statements
}

/// Upper-cased bare words outside quoted text, with their byte offsets.
pub fn words(input: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let _ = scan_top_level(input, |rest, prev_ident, _| {
        let offset = input.len() - rest.len();
        let c = rest.chars().next().unwrap_or(' ');
        if is_ident_char(c) {
            if !prev_ident {
                start = Some(offset);
            }
        } else if let Some(s) = start.take() {
            out.push((s, input[s..offset].to_uppercase()));
        }
        false
    });
    if let Some(s) = start {
        out.push((s, input[s..].to_uppercase()));
    }
    out
}

/// Names of functions called in an expression (`name(` outside quotes), upper-cased.
pub fn called_functions(expr: &str) -> Vec<String> {
    words(expr)
        .into_iter()
        .filter(|(offset, word)| {
            let after = &expr[offset + word.len()..];
            after.trim_start().starts_with('(')
        })
        .map(|(_, word)| word)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_requires_word_boundary() {
        assert!(keyword("VALID")("VALID PERIOD").is_ok());
        assert!(keyword("VALID")("valid_from = 1").is_err());
        let (rest, _) = keyword("ORDER BY")("order   by x").unwrap();
        assert_eq!(rest, " x");
    }

    #[test]
    fn test_string_literal_with_escapes() {
        assert_eq!(string_literal("'O''Brien' rest").unwrap(), (" rest", "O'Brien".to_string()));
        assert_eq!(string_literal("''").unwrap(), ("", String::new()));
        assert!(string_literal("'open").is_err());
    }

    #[test]
    fn test_raw_until_respects_quotes_and_parens() {
        let mut until_where = raw_until(&["WHERE", ","]);
        let (rest, text) = until_where("f(a, b) + 'x, WHERE y' WHERE z = 1").unwrap();
        assert_eq!(text, "f(a, b) + 'x, WHERE y'");
        assert_eq!(rest, "WHERE z = 1");

        let (rest, text) = raw_until(&["AND VALID"])("item = 'A' AND valid_flag = 1 AND VALID PERIOD [a, b]").unwrap();
        assert_eq!(text, "item = 'A' AND valid_flag = 1");
        assert!(rest.starts_with("AND VALID"));
    }

    #[test]
    fn test_raw_until_rejects_empty_and_unterminated() {
        assert!(raw_until(&["WHERE"])("  WHERE x").is_err());
        assert!(raw_until(&["WHERE"])("'abc").is_err());
    }

    #[test]
    fn test_split_statements() {
        let script = "INSERT INTO t VALUES ('a;b'); SELECT * FROM t;\n\n DROP TABLE t";
        assert_eq!(
            split_statements(script),
            vec!["INSERT INTO t VALUES ('a;b')", "SELECT * FROM t", "DROP TABLE t"]
        );
    }

    #[test]
    fn test_words_and_functions() {
        let found: Vec<String> = words("select 'valid' , x FROM t").into_iter().map(|(_, w)| w).collect();
        assert_eq!(found, vec!["SELECT", "X", "FROM", "T"]);
        assert_eq!(called_functions("COUNT(*), max (amount), amount"), vec!["COUNT", "MAX"]);
    }

    #[test]
    fn test_value_literals() {
        assert_eq!(value("NULL").unwrap().1, Value::Null);
        assert_eq!(value("-42").unwrap().1, Value::Integer(-42));
        assert_eq!(value("-9223372036854775808").unwrap().1, Value::Integer(i64::MIN));
        assert!(matches!(value("'2020-01-01'").unwrap().1, Value::Date(_)));
        assert!(matches!(value("DATE '2020-01-01'").unwrap().1, Value::Date(_)));
        assert!(matches!(value("10.50").unwrap().1, Value::Numeric(_)));
        assert_eq!(value("'it''s'").unwrap().1, Value::Text("it's".to_string()));
    }

    #[test]
    fn test_data_types() {
        assert_eq!(data_type("INTEGER").unwrap().1, DataType::Integer);
        assert_eq!(data_type("BIGINT").unwrap().1, DataType::BigInt);
        assert_eq!(data_type("VARCHAR2(20)").unwrap().1, DataType::Varchar { max_length: 20 });
        assert_eq!(data_type("NUMBER(19)").unwrap().1, DataType::Numeric { precision: 19, scale: 0 });
        assert_eq!(data_type("DOUBLE PRECISION").unwrap().1, DataType::Real);
    }
}
