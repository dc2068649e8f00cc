// Module declarations
mod statement;
pub(crate) mod common;
mod temporal;
mod ddl;
mod dml;
mod queries;

pub use statement::{
    Statement,
    TemporalKind,
    ColumnDef,
    CreateTable,
    InstantLiteral,
    PeriodLiteral,
    ValidScope,
    Insert,
    Assignment,
    Update,
    Delete,
    SelectFlavour,
    AsOf,
    Projection,
    Select,
};
pub use common::{called_functions, split_statements};
pub use temporal::parse_time_text;

use crate::types::{AdapterError, Result};
use common::{keyword, words, ws};
use nom::error::{Error, ErrorKind};
use temporal::Qualifier;

type ParseFailure<'a> = nom::Err<Error<&'a str>>;

fn failure_at(input: &str, kind: ErrorKind) -> ParseFailure<'_> {
    nom::Err::Error(Error::new(input, kind))
}

// Leading keyword after the qualifier decides the statement parser
fn statement_body(input: &str, qualifier: Qualifier) -> std::result::Result<(&str, Statement), ParseFailure<'_>> {
    let starts_with = |kw: &'static str| ws(keyword(kw))(input).is_ok();

    if starts_with("CREATE TABLE") {
        if qualifier.is_present() {
            return Err(failure_at(input, ErrorKind::Verify));
        }
        let (rest, (name, columns, kind)) = ddl::create_table(input)?;
        let stmt = match kind {
            Some(kind) => Statement::CreateTemporalTable(CreateTable { name, columns, kind }),
            None => Statement::PassThrough(String::new()),
        };
        return Ok((rest, stmt));
    }
    if starts_with("DROP TABLE") {
        if qualifier.is_present() {
            return Err(failure_at(input, ErrorKind::Verify));
        }
        let (rest, table) = ddl::drop_table(input)?;
        return Ok((rest, Statement::Drop { table }));
    }
    if starts_with("INSERT") {
        let (rest, insert) = dml::insert(qualifier)(input)?;
        return Ok((rest, Statement::TemporalInsert(insert)));
    }
    if starts_with("UPDATE") {
        let (rest, update) = dml::update(qualifier)(input)?;
        return Ok((rest, Statement::TemporalUpdate(update)));
    }
    if starts_with("DELETE") {
        let (rest, delete) = dml::delete(qualifier)(input)?;
        return Ok((rest, Statement::TemporalDelete(delete)));
    }
    if starts_with("SELECT") {
        let (rest, select) = queries::select(qualifier)(input)?;
        return Ok((rest, Statement::TemporalSelect(select)));
    }
    Err(failure_at(input, ErrorKind::Alt))
}

fn syntax_error(sql: &str, remaining: &str, kind: ErrorKind) -> AdapterError {
    let position = sql.len() - remaining.len();
    let token = remaining
        .split_whitespace()
        .next()
        .map_or_else(|| "end of input".to_string(), |t| t.chars().take(24).collect());
    let message = match kind {
        ErrorKind::Verify => "temporal qualifier not allowed here",
        ErrorKind::MapRes => "invalid time literal or empty period",
        ErrorKind::Alt => "expected CREATE, DROP, INSERT, UPDATE, DELETE or SELECT",
        ErrorKind::TakeUntil => "expected an expression",
        ErrorKind::Eof => "unexpected input after statement",
        ErrorKind::Char => "unbalanced quote or parenthesis",
        _ => "unexpected token",
    };
    AdapterError::Syntax {
        position,
        token,
        message: message.to_string(),
    }
}

/// Whether the statement uses any temporal keyword.
///
/// Quoted text is ignored, so `'VALID'` as a value is not a marker.
#[must_use]
pub fn has_temporal_markers(sql: &str) -> bool {
    let found = words(sql);
    found.iter().enumerate().any(|(i, (offset, word))| {
        let next = found.get(i + 1).map(|(_, w)| w.as_str());
        match word.as_str() {
            "VALIDTIME" | "NONSEQUENCED" | "TRANSACTIONTIME" | "PERIOD" => true,
            "AS" => matches!(next, Some("VALID" | "TRANSACTION" | "OF")),
            "VALID" => {
                let after = sql[offset + word.len()..].trim_start();
                after.starts_with('[') || after.starts_with('(')
            }
            _ => false,
        }
    })
}

/// Parses and classifies one statement.
///
/// Text that does not parse is forwarded as `PassThrough` unless it uses
/// temporal keywords, in which case it is a syntax error.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let body = sql.trim_end().trim_end_matches(';').trim_end();
    let start = body.len() - body.trim_start().len();
    let input = &body[start..];

    let parsed = temporal::qualifier(input).and_then(|(rest, qualifier)| statement_body(rest, qualifier));

    let failure = match parsed {
        Ok((rest, stmt)) if rest.trim().is_empty() => {
            return Ok(match stmt {
                Statement::PassThrough(_) => Statement::PassThrough(input.to_string()),
                stmt => stmt,
            });
        }
        Ok((rest, _)) => (rest, ErrorKind::Eof),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => (e.input, e.code),
        Err(nom::Err::Incomplete(_)) => (&input[input.len()..], ErrorKind::Complete),
    };

    if has_temporal_markers(input) {
        let (remaining, kind) = failure;
        return Err(syntax_error(body, remaining, kind));
    }
    Ok(Statement::PassThrough(input.to_string()))
}

/// Tables a statement names after FROM, INTO, UPDATE, JOIN or TABLE, lower-cased.
#[must_use]
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let found = words(sql);
    let mut tables: Vec<String> = found
        .windows(2)
        .filter(|pair| matches!(pair[0].1.as_str(), "FROM" | "INTO" | "UPDATE" | "JOIN" | "TABLE"))
        .map(|pair| pair[1].1.to_lowercase())
        .collect();
    tables.dedup();
    tables
}
