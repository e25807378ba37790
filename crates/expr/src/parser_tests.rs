// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ast::{CmpOp, Expr, PathRoot, PathSeg};

#[yare::parameterized(
    comparison = { "result.score >= 60" },
    equality = { "result.success == true" },
    null_check = { "result.error == null" },
    string = { "result.kind == \"weather\"" },
    single_quoted = { "result.kind == 'weather'" },
    negative_number = { "result.delta > -5" },
    float = { "result.ratio <= 0.75" },
    index_path = { "input.items[0] == 1" },
    nested_path = { "result.foo.bar != 2" },
    conjunction = { "result.a == 1 and result.b == 2" },
    disjunction = { "result.a == 1 or result.b == 2" },
    negation = { "not result.ok == true" },
    parenthesized = { "(result.a == 1 or result.b == 2) and input.c == 3" },
    list_literal = { "result.tags == [\"a\", \"b\"]" },
    bare_path = { "result.enabled" },
    failure_type = { "result.failure_details.type == \"TIMEOUT\"" },
)]
fn accepts(expr: &str) {
    parse_expression(expr).unwrap();
}

#[yare::parameterized(
    empty = { "" },
    trailing_garbage = { "result.a == 1 ;" },
    function_call = { "len(result.items) > 0" },
    arithmetic = { "result.a + 1 == 2" },
    unknown_root = { "task.a == 1" },
    bare_identifier = { "score >= 60" },
    assignment = { "result.a = 1" },
    double_op = { "result.a == == 1" },
    unterminated_string = { "result.a == \"oops" },
    keyword_run_on = { "result.a == 1 andresult.b == 2" },
    root_prefix_ident = { "inputs.a == 1" },
)]
fn rejects(expr: &str) {
    assert!(parse_expression(expr).is_err(), "expected parse error for {expr:?}");
}

#[test]
fn comparison_ast_shape() {
    let expr = parse_expression("result.score >= 60").unwrap();
    match expr {
        Expr::Cmp { op, lhs, rhs } => {
            assert_eq!(op, CmpOp::Ge);
            match *lhs {
                Expr::Path(ref p) => {
                    assert_eq!(p.root, PathRoot::Result);
                    assert_eq!(p.segs, vec![PathSeg::Key("score".to_string())]);
                }
                other => panic!("unexpected lhs: {other:?}"),
            }
            assert_eq!(*rhs, Expr::Literal(serde_json::json!(60)));
        }
        other => panic!("unexpected expr: {other:?}"),
    }
}

#[test]
fn and_binds_tighter_than_or() {
    let expr = parse_expression("result.a == 1 or result.b == 2 and result.c == 3").unwrap();
    match expr {
        Expr::Or(_, rhs) => match *rhs {
            Expr::And(..) => {}
            other => panic!("expected And on the right of Or, got {other:?}"),
        },
        other => panic!("expected Or at top, got {other:?}"),
    }
}

#[test]
fn not_is_right_associative() {
    let expr = parse_expression("not not result.ok").unwrap();
    match expr {
        Expr::Not(inner) => assert!(matches!(*inner, Expr::Not(_))),
        other => panic!("expected Not, got {other:?}"),
    }
}

#[test]
fn escaped_string_contents() {
    let expr = parse_expression(r#"result.msg == "a\"b\\c""#).unwrap();
    match expr {
        Expr::Cmp { rhs, .. } => assert_eq!(*rhs, Expr::Literal(serde_json::json!("a\"b\\c"))),
        other => panic!("unexpected expr: {other:?}"),
    }
}
