// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-flow application: project a source context into a target input map.

use crate::ast::Expr;
use crate::eval::{eval_expr, resolve, EvalContext, EvalError};
use crate::parser::parse_expression;
use serde_json::Value;
use trellis_core::{DataFlow, JsonMap};

/// Apply the mappings of a data-flow to a source completion context.
///
/// Each mapping pair maps a target dot-path to a source expression over
/// `{result, input}`. Unresolvable source paths produce absence in the
/// target (the key is omitted), not null-stuffing. A missing or empty
/// data-flow yields the empty map. Output is independent of mapping
/// insertion order except where two mappings write the same target path,
/// which last-writer-wins in mapping order.
pub fn apply(data_flow: Option<&DataFlow>, ctx: &EvalContext<'_>) -> Result<JsonMap, EvalError> {
    let mut target = JsonMap::new();
    let Some(df) = data_flow else {
        return Ok(target);
    };

    for (target_path, source_expr) in &df.mappings {
        let expr = parse_expression(source_expr).map_err(EvalError::Parse)?;
        // Absent source path: skip the key entirely.
        if let Expr::Path(path) = &expr {
            if resolve(path, ctx).is_none() {
                continue;
            }
        }
        let value = eval_expr(&expr, ctx)?;
        set_path(&mut target, target_path, value);
    }

    Ok(target)
}

/// Insert `value` at a dot-path, creating intermediate objects. A non-object
/// intermediate is replaced.
fn set_path(map: &mut JsonMap, path: &str, value: Value) {
    let mut segs = path.split('.').peekable();
    let mut current = map;
    while let Some(seg) = segs.next() {
        if segs.peek().is_none() {
            current.insert(seg.to_string(), value);
            return;
        }
        let entry = current
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(JsonMap::new()));
        if !entry.is_object() {
            *entry = Value::Object(JsonMap::new());
        }
        match entry.as_object_mut() {
            Some(next) => current = next,
            // Unreachable: entry was just forced to an object.
            None => return,
        }
    }
}

/// Deep-merge `src` into `dst`: objects merge recursively, everything else
/// is overwritten by `src` (last writer wins per path).
pub fn deep_merge(dst: &mut JsonMap, src: &JsonMap) {
    for (key, incoming) in src {
        match (dst.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(new)) => deep_merge(existing, new),
            (Some(existing), _) => *existing = incoming.clone(),
            (None, _) => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "dataflow_tests.rs"]
mod tests;
