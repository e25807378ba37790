// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use indexmap::IndexMap;
use serde_json::json;
use trellis_core::{DataFlow, JsonMap};

fn map(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

fn flow(mappings: &[(&str, &str)]) -> DataFlow {
    let mut out = IndexMap::new();
    for (k, v) in mappings {
        out.insert((*k).to_string(), (*v).to_string());
    }
    DataFlow { mappings: out }
}

#[test]
fn missing_data_flow_yields_empty_map() {
    let result = map(json!({"data": 1}));
    let input = map(json!({}));
    let out = apply(None, &EvalContext::new(&result, &input)).unwrap();
    assert!(out.is_empty());
}

#[test]
fn maps_result_path_into_target_key() {
    let result = map(json!({"data": {"temperature": 25}}));
    let input = map(json!({}));
    let df = flow(&[("weather_data", "result.data")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(serde_json::Value::Object(out), json!({"weather_data": {"temperature": 25}}));
}

#[test]
fn nested_target_path_creates_objects() {
    let result = map(json!({"city": "Beijing"}));
    let input = map(json!({}));
    let df = flow(&[("query.location.city", "result.city")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(
        serde_json::Value::Object(out),
        json!({"query": {"location": {"city": "Beijing"}}}),
    );
}

#[test]
fn unresolvable_source_is_omitted_not_nulled() {
    let result = map(json!({"present": 1}));
    let input = map(json!({}));
    let df = flow(&[("a", "result.present"), ("b", "result.absent")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(out.get("a"), Some(&json!(1)));
    assert!(!out.contains_key("b"));
}

#[test]
fn explicit_null_is_carried() {
    let result = map(json!({"nul": null}));
    let input = map(json!({}));
    let df = flow(&[("out", "result.nul")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(out.get("out"), Some(&serde_json::Value::Null));
}

#[test]
fn literal_sources_are_allowed() {
    let result = map(json!({}));
    let input = map(json!({}));
    let df = flow(&[("retries", "3"), ("mode", "\"fast\"")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(out.get("retries"), Some(&json!(3)));
    assert_eq!(out.get("mode"), Some(&json!("fast")));
}

#[test]
fn input_paths_resolve_against_source_input() {
    let result = map(json!({}));
    let input = map(json!({"city": "Beijing"}));
    let df = flow(&[("city", "input.city")]);

    let out = apply(Some(&df), &EvalContext::new(&result, &input)).unwrap();
    assert_eq!(out.get("city"), Some(&json!("Beijing")));
}

#[test]
fn malformed_source_expression_errors() {
    let result = map(json!({}));
    let input = map(json!({}));
    let df = flow(&[("out", "result..")]);
    assert!(apply(Some(&df), &EvalContext::new(&result, &input)).is_err());
}

#[test]
fn deep_merge_recurses_and_last_writer_wins() {
    let mut dst = map(json!({"a": {"x": 1, "y": 2}, "keep": true}));
    let src = map(json!({"a": {"y": 20, "z": 30}, "new": 1}));

    deep_merge(&mut dst, &src);
    assert_eq!(
        serde_json::Value::Object(dst),
        json!({"a": {"x": 1, "y": 20, "z": 30}, "keep": true, "new": 1}),
    );
}

#[test]
fn deep_merge_scalar_replaces_object() {
    let mut dst = map(json!({"a": {"x": 1}}));
    let src = map(json!({"a": 5}));

    deep_merge(&mut dst, &src);
    assert_eq!(serde_json::Value::Object(dst), json!({"a": 5}));
}
