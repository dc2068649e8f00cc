use super::common::{ws, identifier, keyword, raw_until};
use super::statement::{ColumnDef, TemporalKind};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, tuple},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnConstraint {
    NotNull,
    Null,
    PrimaryKey,
}

fn column_constraint(input: &str) -> IResult<&str, ColumnConstraint> {
    alt((
        map(ws(keyword("NOT NULL")), |_| ColumnConstraint::NotNull),
        map(ws(keyword("NULL")), |_| ColumnConstraint::Null),
        map(ws(keyword("PRIMARY KEY")), |_| ColumnConstraint::PrimaryKey),
    ))(input)
}

fn column_def(input: &str) -> IResult<&str, ColumnDef> {
    let (input, name) = ws(identifier)(input)?;
    // Declared types are re-emitted as written, so they are not interpreted here
    let (input, type_sql) = raw_until(&[",", "NOT NULL", "NULL", "PRIMARY KEY"])(input)?;
    let (input, constraints) = many0(column_constraint)(input)?;

    let primary_key = constraints.contains(&ColumnConstraint::PrimaryKey);
    let nullable = !primary_key && !constraints.contains(&ColumnConstraint::NotNull);

    Ok((
        input,
        ColumnDef {
            name,
            type_sql: type_sql.to_string(),
            nullable,
            primary_key,
        },
    ))
}

// AS VALID [STATE] [AND TRANSACTION] | AS TRANSACTION
fn temporal_support(input: &str) -> IResult<&str, TemporalKind> {
    preceded(
        ws(keyword("AS")),
        alt((
            map(
                tuple((
                    ws(keyword("VALID")),
                    opt(ws(keyword("STATE"))),
                    opt(ws(keyword("AND TRANSACTION"))),
                )),
                |(_, _, txn)| {
                    if txn.is_some() {
                        TemporalKind::Bitemporal
                    } else {
                        TemporalKind::Valid
                    }
                },
            ),
            map(ws(keyword("TRANSACTION")), |_| TemporalKind::Transaction),
        )),
    )(input)
}

/// `CREATE TABLE name (columns) [AS ...]`; the kind is `None` for a plain table.
pub fn create_table(input: &str) -> IResult<&str, (String, Vec<ColumnDef>, Option<TemporalKind>)> {
    let (input, _) = ws(keyword("CREATE TABLE"))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, columns) = delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), column_def),
        ws(char(')')),
    )(input)?;
    let (input, kind) = opt(temporal_support)(input)?;

    Ok((input, (name, columns, kind)))
}

pub fn drop_table(input: &str) -> IResult<&str, String> {
    let (input, _) = ws(keyword("DROP TABLE"))(input)?;
    ws(identifier)(input)
}
