//! nom-based parser for the scenario expression grammar.
//!
//! Precedence, loosest first: ternary, `||`, `&&`, equality, comparison,
//! additive, multiplicative, unary, postfix (member/index), primary.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    error::{context, convert_error, VerboseError},
    multi::{fold_many0, many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::{BinaryOperator, Expr, Literal, Script, Stmt, UnaryOperator};
use super::{ExprError, ExprResult};

type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Compiles one script source into its parsed form. The whole input must
/// be consumed; anything left over is a parse error.
pub fn compile(source: &str) -> ExprResult<Script> {
    match all_consuming(delimited(multispace0, parse_script, multispace0))(source) {
        Ok((_, script)) => Ok(script),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Parse {
            source_text: source.to_string(),
            message: convert_error(source, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Parse {
            source_text: source.to_string(),
            message: "incomplete input".to_string(),
        }),
    }
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> ParserResult<'a, O>
where
    F: FnMut(&'a str) -> ParserResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn parse_script(input: &str) -> ParserResult<Script> {
    context(
        "script",
        map(
            terminated(
                separated_list1(ws(char(';')), parse_stmt),
                opt(ws(char(';'))),
            ),
            Script,
        ),
    )(input)
}

fn parse_stmt(input: &str) -> ParserResult<Stmt> {
    alt((parse_assign, map(parse_expr, Stmt::Expr)))(input)
}

fn parse_assign(input: &str) -> ParserResult<Stmt> {
    context(
        "assignment",
        map(
            tuple((
                ws(parse_placeholder),
                // a single '=', not the '==' comparison
                terminated(char('='), peek(not(char('=')))),
                parse_expr,
            )),
            |(variable, _, value)| Stmt::Assign { variable, value },
        ),
    )(input)
}

pub(crate) fn parse_expr(input: &str) -> ParserResult<Expr> {
    parse_ternary(input)
}

fn parse_ternary(input: &str) -> ParserResult<Expr> {
    let (input, condition) = parse_or(input)?;
    let (input, branches) = opt(tuple((
        ws(char('?')),
        parse_expr,
        ws(char(':')),
        parse_expr,
    )))(input)?;
    Ok((
        input,
        match branches {
            Some((_, then_branch, _, else_branch)) => Expr::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            None => condition,
        },
    ))
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn parse_or(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_and(input)?;
    fold_many0(
        preceded(ws(tag("||")), parse_and),
        move || first.clone(),
        |left, right| binary(left, BinaryOperator::Or, right),
    )(input)
}

fn parse_and(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_equality(input)?;
    fold_many0(
        preceded(ws(tag("&&")), parse_equality),
        move || first.clone(),
        |left, right| binary(left, BinaryOperator::And, right),
    )(input)
}

fn parse_equality(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_comparison(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOperator::Equal, tag("==")),
                value(BinaryOperator::NotEqual, tag("!=")),
            ))),
            parse_comparison,
        ),
        move || first.clone(),
        |left, (op, right)| binary(left, op, right),
    )(input)
}

fn parse_comparison(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_additive(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOperator::LessThanEqual, tag("<=")),
                value(BinaryOperator::GreaterThanEqual, tag(">=")),
                value(BinaryOperator::LessThan, char('<')),
                value(BinaryOperator::GreaterThan, char('>')),
            ))),
            parse_additive,
        ),
        move || first.clone(),
        |left, (op, right)| binary(left, op, right),
    )(input)
}

fn parse_additive(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_multiplicative(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOperator::Add, char('+')),
                value(BinaryOperator::Subtract, char('-')),
            ))),
            parse_multiplicative,
        ),
        move || first.clone(),
        |left, (op, right)| binary(left, op, right),
    )(input)
}

fn parse_multiplicative(input: &str) -> ParserResult<Expr> {
    let (input, first) = parse_unary(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOperator::Multiply, char('*')),
                value(BinaryOperator::Divide, char('/')),
                value(BinaryOperator::Modulo, char('%')),
            ))),
            parse_unary,
        ),
        move || first.clone(),
        |left, (op, right)| binary(left, op, right),
    )(input)
}

fn parse_unary(input: &str) -> ParserResult<Expr> {
    alt((
        map(preceded(ws(char('!')), parse_unary), |operand| Expr::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }),
        map(preceded(ws(char('-')), parse_unary), |operand| Expr::Unary {
            op: UnaryOperator::Negate,
            operand: Box::new(operand),
        }),
        parse_postfix,
    ))(input)
}

enum Postfix {
    Member(String),
    Index(Expr),
}

fn parse_postfix(input: &str) -> ParserResult<Expr> {
    let (input, base) = parse_primary(input)?;
    fold_many0(
        alt((
            map(preceded(ws(char('.')), parse_identifier), Postfix::Member),
            map(
                delimited(ws(char('[')), parse_expr, ws(char(']'))),
                Postfix::Index,
            ),
        )),
        move || base.clone(),
        |target, postfix| match postfix {
            Postfix::Member(field) => Expr::Member {
                target: Box::new(target),
                field,
            },
            Postfix::Index(index) => Expr::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
        },
    )(input)
}

fn parse_primary(input: &str) -> ParserResult<Expr> {
    ws(alt((
        map(parse_literal, Expr::Literal),
        map(parse_placeholder, Expr::Variable),
        delimited(ws(char('(')), parse_expr, ws(char(')'))),
    )))(input)
}

fn parse_literal(input: &str) -> ParserResult<Literal> {
    context(
        "literal",
        alt((
            parse_float_literal,
            parse_integer_literal,
            parse_string_literal,
            value(Literal::Boolean(true), tag("true")),
            value(Literal::Boolean(false), tag("false")),
            value(Literal::Null, tag("null")),
        )),
    )(input)
}

fn parse_float_literal(input: &str) -> ParserResult<Literal> {
    map_res(
        recognize(tuple((digit1, char('.'), digit1))),
        |s: &str| s.parse::<f64>().map(Literal::Float),
    )(input)
}

fn parse_integer_literal(input: &str) -> ParserResult<Literal> {
    map_res(digit1, |s: &str| s.parse::<i64>().map(Literal::Integer))(input)
}

fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    context(
        "string literal",
        alt((
            map(
                delimited(char('\''), take_while(|c| c != '\''), char('\'')),
                |s: &str| Literal::String(s.to_string()),
            ),
            map(
                delimited(char('"'), take_while(|c| c != '"'), char('"')),
                |s: &str| Literal::String(s.to_string()),
            ),
        )),
    )(input)
}

/// `${identifier}` — the only way a script can name a conversation variable.
pub(crate) fn parse_placeholder(input: &str) -> ParserResult<String> {
    context(
        "placeholder",
        delimited(tag("${"), parse_identifier, char('}')),
    )(input)
}

fn parse_identifier(input: &str) -> ParserResult<String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| s.to_string(),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Expr {
        let script = compile(source).unwrap();
        match script.0.into_iter().next().unwrap() {
            Stmt::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(expr("${name}"), Expr::Variable("name".to_string()));
    }

    #[test]
    fn test_ternary_with_comparison() {
        let parsed = expr("${x} > 5 ? 'a' : 'b'");
        match parsed {
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                assert_eq!(
                    *condition,
                    Expr::Binary {
                        op: BinaryOperator::GreaterThan,
                        left: Box::new(Expr::Variable("x".to_string())),
                        right: Box::new(Expr::Literal(Literal::Integer(5))),
                    }
                );
                assert_eq!(*then_branch, Expr::Literal(Literal::String("a".into())));
                assert_eq!(*else_branch, Expr::Literal(Literal::String("b".into())));
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_multiplication_over_addition() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOperator::Add,
                left: Box::new(Expr::Literal(Literal::Integer(1))),
                right: Box::new(Expr::Binary {
                    op: BinaryOperator::Multiply,
                    left: Box::new(Expr::Literal(Literal::Integer(2))),
                    right: Box::new(Expr::Literal(Literal::Integer(3))),
                }),
            }
        );
    }

    #[test]
    fn test_assignment_script() {
        let script = compile("${count} = ${count} + 1; ${done} = true").unwrap();
        assert_eq!(script.0.len(), 2);
        match &script.0[0] {
            Stmt::Assign { variable, .. } => assert_eq!(variable, "count"),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_equality_is_not_assignment() {
        assert_eq!(
            expr("${x} == 1"),
            Expr::Binary {
                op: BinaryOperator::Equal,
                left: Box::new(Expr::Variable("x".to_string())),
                right: Box::new(Expr::Literal(Literal::Integer(1))),
            }
        );
    }

    #[test]
    fn test_member_and_index_access() {
        assert_eq!(
            expr("${user}.name"),
            Expr::Member {
                target: Box::new(Expr::Variable("user".to_string())),
                field: "name".to_string(),
            }
        );
        assert_eq!(
            expr("${items}[0]"),
            Expr::Index {
                target: Box::new(Expr::Variable("items".to_string())),
                index: Box::new(Expr::Literal(Literal::Integer(0))),
            }
        );
    }

    #[test]
    fn test_unary_and_logic() {
        let parsed = expr("!${a} && ${b} || false");
        // ((!a && b) || false)
        match parsed {
            Expr::Binary {
                op: BinaryOperator::Or,
                left,
                ..
            } => match *left {
                Expr::Binary {
                    op: BinaryOperator::And,
                    ..
                } => {}
                other => panic!("expected &&, got {:?}", other),
            },
            other => panic!("expected ||, got {:?}", other),
        }
    }

    #[test]
    fn test_double_quoted_string() {
        assert_eq!(
            expr("\"hello\""),
            Expr::Literal(Literal::String("hello".to_string()))
        );
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(expr("3.14"), Expr::Literal(Literal::Float(3.14)));
    }

    #[test]
    fn test_negative_number_is_unary() {
        assert_eq!(
            expr("-4"),
            Expr::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(Expr::Literal(Literal::Integer(4))),
            }
        );
    }

    #[test]
    fn test_plain_text_is_a_parse_error() {
        assert!(compile("Hello there").is_err());
        assert!(compile("${x} >").is_err());
        assert!(compile("").is_err());
    }
}
