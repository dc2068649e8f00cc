use super::common::{ws, identifier, keyword, raw_until};
use super::statement::{AsOf, Projection, Select, SelectFlavour};
use super::temporal::{instant, Qualifier};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::preceded,
    IResult,
};

// Clauses that end a WHERE predicate
const PREDICATE_STOPS: &[&str] = &["AS OF", "ORDER BY", "GROUP BY", "HAVING", "LIMIT"];

fn projection(input: &str) -> IResult<&str, Projection> {
    alt((
        map(ws(char('*')), |_| Projection::All),
        map(
            separated_list1(ws(char(',')), map(raw_until(&[",", "FROM"]), str::to_string)),
            Projection::Items,
        ),
    ))(input)
}

// AS OF [VALID | TRANSACTION] <instant>
fn as_of(input: &str) -> IResult<&str, AsOf> {
    preceded(
        ws(keyword("AS OF")),
        alt((
            map(preceded(ws(keyword("VALID")), ws(instant)), AsOf::Valid),
            map(preceded(ws(keyword("TRANSACTION")), ws(instant)), AsOf::Transaction),
            map(ws(instant), AsOf::Unqualified),
        )),
    )(input)
}

pub fn select(qualifier: Qualifier) -> impl FnMut(&str) -> IResult<&str, Select> {
    move |input: &str| {
        let flavour = match qualifier {
            Qualifier::None => SelectFlavour::Snapshot,
            Qualifier::ValidTime(period) => SelectFlavour::Sequenced(period),
            Qualifier::NonSequenced => SelectFlavour::NonSequenced,
            Qualifier::TransactionTime => SelectFlavour::TransactionHistory,
        };
        let (input, _) = ws(keyword("SELECT"))(input)?;
        let (input, distinct) = opt(ws(keyword("DISTINCT")))(input)?;
        let (input, projection) = projection(input)?;
        let (input, _) = ws(keyword("FROM"))(input)?;
        let (input, table) = ws(identifier)(input)?;
        let (input, predicate) = opt(preceded(ws(keyword("WHERE")), raw_until(PREDICATE_STOPS)))(input)?;
        let (input, as_of) = many0(as_of)(input)?;
        let (input, order_by) = opt(preceded(ws(keyword("ORDER BY")), raw_until(&[])))(input)?;

        Ok((
            input,
            Select {
                flavour,
                distinct: distinct.is_some(),
                projection,
                table,
                predicate: predicate.map(str::to_string),
                explicit: qualifier.is_present() || !as_of.is_empty(),
                as_of,
                order_by: order_by.map(str::to_string),
            },
        ))
    }
}
