use super::common::{ws, identifier, keyword, raw_until, raw_until_or};
use super::statement::{Assignment, Delete, Insert, PeriodLiteral, Update, ValidScope};
use super::temporal::{starts_valid_clause, valid_clause, Qualifier};
use nom::{
    character::complete::char,
    combinator::{map, opt},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

fn qualifier_error(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Error(Error::new(input, ErrorKind::Verify))
}

// A VALIDTIME prefix and a VALID suffix may not both give a period
fn merge_period<'a>(
    input: &'a str,
    prefix: Option<PeriodLiteral>,
    suffix: Option<PeriodLiteral>,
) -> Result<Option<PeriodLiteral>, nom::Err<Error<&'a str>>> {
    match (prefix, suffix) {
        (Some(_), Some(_)) => Err(qualifier_error(input)),
        (p, s) => Ok(p.or(s)),
    }
}

fn value_tuple(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), map(raw_until(&[","]), str::to_string)),
        ws(char(')')),
    )(input)
}

pub fn insert(qualifier: Qualifier) -> impl FnMut(&str) -> IResult<&str, Insert> {
    move |input: &str| {
        let prefix = match qualifier {
            Qualifier::None => None,
            Qualifier::ValidTime(period) => period,
            _ => return Err(qualifier_error(input)),
        };
        let (input, _) = ws(keyword("INSERT INTO"))(input)?;
        let (input, table) = ws(identifier)(input)?;
        let (input, columns) = opt(delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), ws(identifier)),
            ws(char(')')),
        ))(input)?;
        let (input, _) = ws(keyword("VALUES"))(input)?;
        let (input, rows) = separated_list1(ws(char(',')), value_tuple)(input)?;
        let (input, suffix) = opt(valid_clause)(input)?;
        let valid = merge_period(input, prefix, suffix)?;

        Ok((
            input,
            Insert {
                table,
                columns,
                rows,
                valid,
                explicit: qualifier.is_present() || suffix.is_some(),
            },
        ))
    }
}

// [WHERE <pred>] [[AND] VALID <period>]
fn filter_and_period(input: &str) -> IResult<&str, (Option<String>, Option<PeriodLiteral>)> {
    let (input, where_kw) = opt(ws(keyword("WHERE")))(input)?;
    let (input, predicate) = if where_kw.is_some() {
        opt(map(raw_until_or(&[], starts_valid_clause), str::to_string))(input)?
    } else {
        (input, None)
    };
    let (input, period) = opt(preceded(opt(ws(keyword("AND"))), valid_clause))(input)?;
    if where_kw.is_some() && predicate.is_none() && period.is_none() {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::TakeUntil)));
    }
    Ok((input, (predicate, period)))
}

fn scope_for(input: &str, qualifier: Qualifier, suffix: Option<PeriodLiteral>) -> Result<ValidScope, nom::Err<Error<&str>>> {
    match qualifier {
        Qualifier::None => Ok(suffix.map_or(ValidScope::FromNow, ValidScope::Period)),
        Qualifier::ValidTime(prefix) => {
            let merged = merge_period(input, prefix, suffix)?;
            Ok(merged.map_or(ValidScope::All, ValidScope::Period))
        }
        _ => Err(qualifier_error(input)),
    }
}

fn assignment(input: &str) -> IResult<&str, Assignment> {
    map(
        tuple((ws(identifier), ws(char('=')), raw_until_or(&[",", "WHERE"], starts_valid_clause))),
        |(column, _, expr)| Assignment {
            column,
            expr: expr.to_string(),
        },
    )(input)
}

pub fn update(qualifier: Qualifier) -> impl FnMut(&str) -> IResult<&str, Update> {
    move |input: &str| {
        let (input, _) = ws(keyword("UPDATE"))(input)?;
        let (input, table) = ws(identifier)(input)?;
        let (input, _) = ws(keyword("SET"))(input)?;
        let (input, assignments) = separated_list1(ws(char(',')), assignment)(input)?;
        let (input, (predicate, suffix)) = filter_and_period(input)?;
        let scope = scope_for(input, qualifier, suffix)?;

        Ok((
            input,
            Update {
                table,
                assignments,
                predicate,
                scope,
                explicit: qualifier.is_present() || suffix.is_some(),
            },
        ))
    }
}

pub fn delete(qualifier: Qualifier) -> impl FnMut(&str) -> IResult<&str, Delete> {
    move |input: &str| {
        let (input, _) = ws(keyword("DELETE FROM"))(input)?;
        let (input, table) = ws(identifier)(input)?;
        let (input, (predicate, suffix)) = filter_and_period(input)?;
        let scope = scope_for(input, qualifier, suffix)?;

        Ok((
            input,
            Delete {
                table,
                predicate,
                scope,
                explicit: qualifier.is_present() || suffix.is_some(),
            },
        ))
    }
}
