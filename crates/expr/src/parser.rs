// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nom parser for the condition grammar.
//!
//! ```text
//! expr     := or
//! or       := and ("or" and)*
//! and      := unary ("and" unary)*
//! unary    := "not" unary | cmp
//! cmp      := operand (("=="|"!="|"<="|">="|"<"|">") operand)?
//! operand  := literal | path | list | "(" expr ")"
//! path     := ("result"|"input") ("." ident | "[" uint "]")*
//! ```
//!
//! The parser is `all_consuming`: any construct outside this grammar is a
//! parse error, never silently ignored.

use crate::ast::{CmpOp, Expr, Path, PathRoot, PathSeg};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    error::ParseError,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde_json::Value as Json;

// Whitespace wrapper
fn ws<'a, F, O, E: ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

// Keywords must not run into a following identifier character
// (`notx`, `orelse`, `inputs` are identifiers, not keywords/roots).
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    delimited(
        multispace0,
        terminated(tag(kw), not(peek(alt((alphanumeric1, tag("_")))))),
        multispace0,
    )
}

fn parse_identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_")))))),
        String::from,
    )(input)
}

fn parse_number(input: &str) -> IResult<&str, Json> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(tuple((char('.'), digit1)))))),
        |s: &str| {
            if s.contains('.') {
                s.parse::<f64>().map(Json::from).map_err(|_| "invalid float")
            } else {
                s.parse::<i64>().map(Json::from).map_err(|_| "invalid integer")
            }
        },
    )(input)
}

fn parse_string_literal(input: &str) -> IResult<&str, Json> {
    alt((
        map(
            delimited(
                char('"'),
                many0(alt((
                    value('"', tag("\\\"")),
                    value('\\', tag("\\\\")),
                    value('\n', tag("\\n")),
                    value('\t', tag("\\t")),
                    value('\r', tag("\\r")),
                    none_of("\"\\"),
                ))),
                char('"'),
            ),
            |chars| Json::from(chars.into_iter().collect::<String>()),
        ),
        map(delimited(char('\''), take_while(|c| c != '\''), char('\'')), |s: &str| {
            Json::from(s.to_string())
        }),
    ))(input)
}

fn parse_boolean(input: &str) -> IResult<&str, Json> {
    alt((
        value(Json::Bool(true), keyword("true")),
        value(Json::Bool(false), keyword("false")),
    ))(input)
}

fn parse_null(input: &str) -> IResult<&str, Json> {
    value(Json::Null, keyword("null"))(input)
}

fn parse_path_root(input: &str) -> IResult<&str, PathRoot> {
    alt((
        value(PathRoot::Result, terminated(tag("result"), not(peek(alt((alphanumeric1, tag("_"))))))),
        value(PathRoot::Input, terminated(tag("input"), not(peek(alt((alphanumeric1, tag("_"))))))),
    ))(input)
}

fn parse_path_seg(input: &str) -> IResult<&str, PathSeg> {
    alt((
        map(preceded(char('.'), parse_identifier), PathSeg::Key),
        map(
            delimited(char('['), map_res(digit1, |s: &str| s.parse::<usize>()), char(']')),
            PathSeg::Index,
        ),
    ))(input)
}

fn parse_path(input: &str) -> IResult<&str, Path> {
    map(pair(parse_path_root, many0(parse_path_seg)), |(root, segs)| Path { root, segs })(input)
}

fn parse_list(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            ws(char('[')),
            separated_list0(ws(char(',')), parse_operand),
            ws(char(']')),
        ),
        Expr::List,
    )(input)
}

fn parse_operand(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(parse_boolean, Expr::Literal),
        map(parse_null, Expr::Literal),
        map(parse_number, Expr::Literal),
        map(parse_string_literal, Expr::Literal),
        map(parse_path, Expr::Path),
        parse_list,
        delimited(ws(char('(')), parse_or, ws(char(')'))),
    )))(input)
}

fn parse_cmp_op(input: &str) -> IResult<&str, CmpOp> {
    ws(alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    )))(input)
}

fn parse_cmp(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((parse_operand, opt(pair(parse_cmp_op, parse_operand)))),
        |(lhs, rhs)| match rhs {
            Some((op, rhs)) => Expr::Cmp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            None => lhs,
        },
    )(input)
}

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(keyword("not"), parse_unary), |e| Expr::Not(Box::new(e))),
        parse_cmp,
    ))(input)
}

fn parse_and(input: &str) -> IResult<&str, Expr> {
    map(
        pair(parse_unary, many0(preceded(keyword("and"), parse_unary))),
        |(first, rest)| {
            rest.into_iter().fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)))
        },
    )(input)
}

fn parse_or(input: &str) -> IResult<&str, Expr> {
    map(
        pair(parse_and, many0(preceded(keyword("or"), parse_and))),
        |(first, rest)| {
            rest.into_iter().fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)))
        },
    )(input)
}

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    match all_consuming(ws(parse_or))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(format!("parse error in expression {input:?}: {e}")),
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
