//! Parser for the standard SQL subset the memory backend executes.

use crate::parser::common::{data_type, identifier, keyword, non_keyword_identifier, value, ws};
use crate::types::{BackendError, Column, Value};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{fold_many0, many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    /// `None` argument is `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Literal(_) | Self::Column(_) => false,
            Self::Neg(e) | Self::Not(e) => e.contains_aggregate(),
            Self::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Self::IsNull { expr, .. } => expr.contains_aggregate(),
            Self::InList { expr, list, .. } => expr.contains_aggregate() || list.iter().any(Self::contains_aggregate),
            Self::Between { expr, low, high, .. } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Self::Like { expr, pattern, .. } => expr.contains_aggregate() || pattern.contains_aggregate(),
            Self::Case { operand, branches, otherwise } => {
                operand.as_ref().is_some_and(|e| e.contains_aggregate())
                    || branches.iter().any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || otherwise.as_ref().is_some_and(|e| e.contains_aggregate())
            }
            Self::Function { args, .. } => args.iter().any(Self::contains_aggregate),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// 1-based output column
    Position(usize),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub key: OrderKey,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub table: String,
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Select(SelectQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    CreateTable {
        name: String,
        columns: Vec<Column>,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        source: InsertSource,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    Select(SelectQuery),
}

// Expressions, lowest precedence first

pub fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    fold_many0(
        preceded(ws(keyword("OR")), and_expr),
        move || first.clone(),
        |acc, e| Expr::binary(BinaryOp::Or, acc, e),
    )(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    fold_many0(
        preceded(ws(keyword("AND")), not_expr),
        move || first.clone(),
        |acc, e| Expr::binary(BinaryOp::And, acc, e),
    )(input)
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("NOT")), not_expr), |e| Expr::Not(Box::new(e))),
        predicate,
    ))(input)
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        map(tag("<="), |_| BinaryOp::LtEq),
        map(tag(">="), |_| BinaryOp::GtEq),
        map(tag("<>"), |_| BinaryOp::NotEq),
        map(tag("!="), |_| BinaryOp::NotEq),
        map(tag("="), |_| BinaryOp::Eq),
        map(tag("<"), |_| BinaryOp::Lt),
        map(tag(">"), |_| BinaryOp::Gt),
    )))(input)
}

fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(ws(keyword("NOT"))), |n| n.is_some())(input)
}

fn predicate(input: &str) -> IResult<&str, Expr> {
    let (input, left) = additive(input)?;

    if let Ok((rest, (_, negated, _))) = tuple((ws(keyword("IS")), negation, ws(keyword("NULL"))))(input) {
        return Ok((rest, Expr::IsNull { expr: Box::new(left), negated }));
    }
    if let Ok((rest, (negated, _, low, _, high))) =
        tuple((negation, ws(keyword("BETWEEN")), additive, ws(keyword("AND")), additive))(input)
    {
        return Ok((
            rest,
            Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            },
        ));
    }
    if let Ok((rest, (negated, _, list))) = tuple((
        negation,
        ws(keyword("IN")),
        delimited(ws(char('(')), separated_list1(ws(char(',')), expr), ws(char(')'))),
    ))(input)
    {
        return Ok((rest, Expr::InList { expr: Box::new(left), list, negated }));
    }
    if let Ok((rest, (negated, _, pattern))) = tuple((negation, ws(keyword("LIKE")), additive))(input) {
        return Ok((
            rest,
            Expr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            },
        ));
    }
    if let Ok((rest, (op, right))) = pair(comparison_op, additive)(input) {
        return Ok((rest, Expr::binary(op, left, right)));
    }
    Ok((input, left))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = multiplicative(input)?;
    fold_many0(
        pair(
            ws(alt((
                map(tag("||"), |_| BinaryOp::Concat),
                map(char('+'), |_| BinaryOp::Add),
                map(char('-'), |_| BinaryOp::Sub),
            ))),
            multiplicative,
        ),
        move || first.clone(),
        |acc, (op, e)| Expr::binary(op, acc, e),
    )(input)
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    fold_many0(
        pair(
            ws(alt((
                map(char('*'), |_| BinaryOp::Mul),
                map(char('/'), |_| BinaryOp::Div),
                map(char('%'), |_| BinaryOp::Mod),
            ))),
            unary,
        ),
        move || first.clone(),
        |acc, (op, e)| Expr::binary(op, acc, e),
    )(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    // Signed literals first so i64::MIN stays a literal
    alt((
        primary,
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
    ))(input)
}

fn case_expr(input: &str) -> IResult<&str, Expr> {
    let (input, _) = ws(keyword("CASE"))(input)?;
    let (input, operand) = opt(expr)(input)?;
    let (input, branches) = many0(pair(
        preceded(ws(keyword("WHEN")), expr),
        preceded(ws(keyword("THEN")), expr),
    ))(input)?;
    let (input, otherwise) = opt(preceded(ws(keyword("ELSE")), expr))(input)?;
    let (input, _) = ws(keyword("END"))(input)?;
    if branches.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Many1)));
    }
    Ok((
        input,
        Expr::Case {
            operand: operand.map(Box::new),
            branches,
            otherwise: otherwise.map(Box::new),
        },
    ))
}

fn call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = ws(non_keyword_identifier)(input)?;
    let (input, _) = ws(char('('))(input)?;
    let upper = name.to_uppercase();
    let func = match upper.as_str() {
        "COUNT" => Some(AggregateFunc::Count),
        "SUM" => Some(AggregateFunc::Sum),
        "AVG" => Some(AggregateFunc::Avg),
        "MIN" => Some(AggregateFunc::Min),
        "MAX" => Some(AggregateFunc::Max),
        _ => None,
    };
    if func == Some(AggregateFunc::Count) {
        if let Ok((rest, _)) = pair(ws(char('*')), ws(char(')')))(input) {
            return Ok((rest, Expr::Aggregate { func: AggregateFunc::Count, arg: None }));
        }
    }
    let (input, args) = terminated(separated_list0(ws(char(',')), expr), ws(char(')')))(input)?;
    match func {
        Some(func) if args.len() == 1 => {
            let arg = args.into_iter().next().map(Box::new);
            Ok((input, Expr::Aggregate { func, arg }))
        }
        Some(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Count))),
        None => Ok((input, Expr::Function { name: upper, args })),
    }
}

// Possibly qualified column; the qualifier is dropped
fn column_ref(input: &str) -> IResult<&str, Expr> {
    map(
        pair(non_keyword_identifier, opt(preceded(char('.'), identifier))),
        |(first, second)| Expr::Column(second.unwrap_or(first)),
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        delimited(char('('), expr, ws(char(')'))),
        case_expr,
        call,
        map(value, Expr::Literal),
        column_ref,
    )))(input)
}

// Statements

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((
        map(ws(char('*')), |_| SelectItem::Wildcard),
        map(
            pair(
                ws(recognize(expr)),
                opt(preceded(opt(ws(keyword("AS"))), ws(non_keyword_identifier))),
            ),
            |(text, alias)| {
                // recognize() on a successful parse cannot fail to re-parse
                let parsed = expr(text).map_or(Expr::Literal(Value::Null), |(_, e)| e);
                let name = match (&alias, &parsed) {
                    (Some(a), _) => a.clone(),
                    (None, Expr::Column(c)) => c.clone(),
                    (None, _) => text.trim().to_string(),
                };
                SelectItem::Expr { expr: parsed, name }
            },
        ),
    ))(input)
}

fn order_item(input: &str) -> IResult<&str, OrderItem> {
    map(
        pair(
            alt((
                map(
                    terminated(
                        ws(map_res(digit1, |s: &str| s.parse::<usize>())),
                        nom::combinator::peek(alt((
                            map(ws(char(',')), |_| ()),
                            map(ws(keyword("ASC")), |_| ()),
                            map(ws(keyword("DESC")), |_| ()),
                            map(nom::combinator::eof, |_| ()),
                        ))),
                    ),
                    OrderKey::Position,
                ),
                map(expr, OrderKey::Expr),
            )),
            opt(ws(alt((keyword("ASC"), keyword("DESC"))))),
        ),
        |(key, dir)| OrderItem {
            key,
            descending: dir.is_some_and(|d| d.eq_ignore_ascii_case("DESC")),
        },
    )(input)
}

pub fn select_query(input: &str) -> IResult<&str, SelectQuery> {
    let (input, _) = ws(keyword("SELECT"))(input)?;
    let (input, distinct) = opt(ws(keyword("DISTINCT")))(input)?;
    let (input, items) = separated_list1(ws(char(',')), select_item)(input)?;
    let (input, _) = ws(keyword("FROM"))(input)?;
    let (input, table) = ws(identifier)(input)?;
    let (input, _alias) = opt(preceded(opt(ws(keyword("AS"))), ws(non_keyword_identifier)))(input)?;
    let (input, filter) = opt(preceded(ws(keyword("WHERE")), expr))(input)?;
    let (input, order_by) = opt(preceded(
        ws(keyword("ORDER BY")),
        separated_list1(ws(char(',')), order_item),
    ))(input)?;

    Ok((
        input,
        SelectQuery {
            distinct: distinct.is_some(),
            items,
            table,
            filter,
            order_by: order_by.unwrap_or_default(),
        },
    ))
}

fn column_definition(input: &str) -> IResult<&str, Column> {
    let (input, name) = ws(identifier)(input)?;
    let (input, data_type) = ws(data_type)(input)?;
    let (input, constraints) = many0(ws(alt((
        keyword("NOT NULL"),
        keyword("NULL"),
        keyword("PRIMARY KEY"),
    ))))(input)?;

    let has = |kw: &str| constraints.iter().any(|c| c.split_whitespace().next().is_some_and(|w| w.eq_ignore_ascii_case(kw)));
    let primary_key = has("PRIMARY");
    Ok((
        input,
        Column {
            name,
            data_type,
            nullable: !primary_key && !has("NOT"),
            primary_key,
        },
    ))
}

fn create_table(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = ws(keyword("CREATE TABLE"))(input)?;
    let (input, if_not_exists) = opt(ws(keyword("IF NOT EXISTS")))(input)?;
    let (input, name) = ws(identifier)(input)?;
    let (input, columns) = delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), column_definition),
        ws(char(')')),
    )(input)?;
    Ok((
        input,
        SqlStatement::CreateTable {
            name,
            columns,
            if_not_exists: if_not_exists.is_some(),
        },
    ))
}

fn drop_table(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = ws(keyword("DROP TABLE"))(input)?;
    let (input, if_exists) = opt(ws(keyword("IF EXISTS")))(input)?;
    let (input, name) = ws(identifier)(input)?;
    Ok((
        input,
        SqlStatement::DropTable {
            name,
            if_exists: if_exists.is_some(),
        },
    ))
}

fn insert(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = ws(keyword("INSERT INTO"))(input)?;
    let (input, table) = ws(identifier)(input)?;
    let (input, columns) = opt(delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), ws(identifier)),
        ws(char(')')),
    ))(input)?;
    let (input, source) = alt((
        map(
            preceded(
                ws(keyword("VALUES")),
                separated_list1(
                    ws(char(',')),
                    delimited(ws(char('(')), separated_list1(ws(char(',')), expr), ws(char(')'))),
                ),
            ),
            InsertSource::Values,
        ),
        map(select_query, InsertSource::Select),
    ))(input)?;
    Ok((input, SqlStatement::Insert { table, columns, source }))
}

fn update(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = ws(keyword("UPDATE"))(input)?;
    let (input, table) = ws(identifier)(input)?;
    let (input, _) = ws(keyword("SET"))(input)?;
    let (input, assignments) = separated_list1(
        ws(char(',')),
        map(tuple((ws(identifier), ws(char('=')), expr)), |(c, _, e)| (c, e)),
    )(input)?;
    let (input, filter) = opt(preceded(ws(keyword("WHERE")), expr))(input)?;
    Ok((input, SqlStatement::Update { table, assignments, filter }))
}

fn delete(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = ws(keyword("DELETE FROM"))(input)?;
    let (input, table) = ws(identifier)(input)?;
    let (input, filter) = opt(preceded(ws(keyword("WHERE")), expr))(input)?;
    Ok((input, SqlStatement::Delete { table, filter }))
}

/// Parses one statement; trailing semicolons are ignored.
pub fn parse_sql(sql: &str) -> Result<SqlStatement, BackendError> {
    let input = sql.trim().trim_end_matches(';');
    let result = all_consuming(ws(alt((
        create_table,
        drop_table,
        insert,
        update,
        delete,
        map(select_query, SqlStatement::Select),
    ))))(input);

    match result {
        Ok((_, stmt)) => Ok(stmt),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let offset = input.len() - e.input.len();
            let near: String = e.input.chars().take(32).collect();
            Err(BackendError::Sql(format!("syntax error at offset {offset} near '{near}'")))
        }
        Err(nom::Err::Incomplete(_)) => Err(BackendError::Sql("incomplete statement".to_string())),
    }
}
