// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-expr: condition and data-flow evaluation.
//!
//! A pure, side-effect-free module. Conditions gate edges; data-flow
//! mappings project a completed task's context into a successor's input.
//! Both are deterministic and total on well-formed expressions: missing
//! paths resolve to null, type-mismatched comparisons yield `false`, and
//! only grammar misuse surfaces as an [`EvalError`].

pub mod ast;
pub mod dataflow;
pub mod eval;
pub mod parser;

pub use ast::{CmpOp, Expr, Path, PathRoot, PathSeg};
pub use dataflow::{apply, deep_merge};
pub use eval::{evaluate, EvalContext, EvalError};
pub use parser::parse_expression;
