// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Condition evaluation over a task-completion context.

use crate::ast::{CmpOp, Expr, Path, PathRoot, PathSeg};
use crate::parser::parse_expression;
use serde_json::Value;
use trellis_core::JsonMap;

/// `{result, input}` of the source task. `result` is empty until the task
/// has produced one.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub result: &'a JsonMap,
    pub input: &'a JsonMap,
}

impl<'a> EvalContext<'a> {
    pub fn new(result: &'a JsonMap, input: &'a JsonMap) -> Self {
        Self { result, input }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("{0}")]
    Parse(String),
    #[error("expression does not evaluate to a boolean")]
    NotBoolean,
    #[error("'{op}' requires boolean operands")]
    BooleanOperand { op: &'static str },
    #[error("unsupported evaluator dialect: {0:?}")]
    UnknownEvaluator(String),
}

/// Evaluate a condition expression to a boolean.
///
/// Total on well-formed expressions: missing paths resolve to null and
/// type-mismatched comparisons yield `false`. Only grammar misuse (parse
/// failure, non-boolean result, non-boolean logic operand) errors.
pub fn evaluate(expression: &str, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
    let expr = parse_expression(expression).map_err(EvalError::Parse)?;
    match eval_expr(&expr, ctx)? {
        Value::Bool(b) => Ok(b),
        _ => Err(EvalError::NotBoolean),
    }
}

/// Evaluate any expression to its value; missing paths yield `Null`.
pub(crate) fn eval_expr(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => Ok(resolve(path, ctx).cloned().unwrap_or(Value::Null)),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Expr::Not(inner) => match eval_expr(inner, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(EvalError::BooleanOperand { op: "not" }),
        },
        Expr::And(lhs, rhs) => {
            match (eval_expr(lhs, ctx)?, eval_expr(rhs, ctx)?) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
                _ => Err(EvalError::BooleanOperand { op: "and" }),
            }
        }
        Expr::Or(lhs, rhs) => {
            match (eval_expr(lhs, ctx)?, eval_expr(rhs, ctx)?) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
                _ => Err(EvalError::BooleanOperand { op: "or" }),
            }
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = eval_expr(lhs, ctx)?;
            let rhs = eval_expr(rhs, ctx)?;
            Ok(Value::Bool(compare(*op, &lhs, &rhs)))
        }
    }
}

/// Walk a dot-path. `None` means the path is absent (distinct from an
/// explicit null in the data — data-flow omits absent keys).
pub(crate) fn resolve<'a>(path: &Path, ctx: &EvalContext<'a>) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    let root: &JsonMap = match path.root {
        PathRoot::Result => ctx.result,
        PathRoot::Input => ctx.input,
    };

    for (i, seg) in path.segs.iter().enumerate() {
        current = match (i, seg, current) {
            (0, PathSeg::Key(key), _) => root.get(key),
            (0, PathSeg::Index(_), _) => None,
            (_, PathSeg::Key(key), Some(Value::Object(map))) => map.get(key),
            (_, PathSeg::Index(idx), Some(Value::Array(items))) => items.get(*idx),
            _ => None,
        };
        current?;
    }

    // A bare root (`result`) is not a value; require at least one segment.
    if path.segs.is_empty() {
        None
    } else {
        current
    }
}

/// Comparison policy:
/// - null short-circuits every comparison to `false`; only `== null` (both
///   sides null) is `true`
/// - `==`/`!=` use deep equality with numeric promotion
/// - orderings work on numbers (promoted) and strings; any other operand
///   shape is a type mismatch and yields `false`
fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return matches!(op, CmpOp::Eq) && lhs.is_null() && rhs.is_null();
    }

    match op {
        CmpOp::Eq => json_equal(lhs, rhs),
        CmpOp::Ne => !json_equal(lhs, rhs),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => match ordering(lhs, rhs) {
            Some(ord) => match op {
                CmpOp::Lt => ord.is_lt(),
                CmpOp::Le => ord.is_le(),
                CmpOp::Gt => ord.is_gt(),
                CmpOp::Ge => ord.is_ge(),
                CmpOp::Eq | CmpOp::Ne => false,
            },
            None => false,
        },
    }
}

/// Deep equality with int/float promotion at every level.
fn json_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => lhs == rhs,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => lhs == rhs,
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => {
            lhs.as_f64()?.partial_cmp(&rhs.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
