//! Rule Evaluation System
//!
//! Turns a [`RuleNode`](crate::ast::RuleNode) and a case's
//! [`FactMap`](crate::value::FactMap) into an inclusion decision. It is the
//! deterministic alternative to asking an LLM whether a content module
//! applies.
//!
//! # Core Components
//!
//! ## Evaluator
//! [`RuleEvaluator::evaluate`] answers the rule with a plain `bool`. Missing
//! data always collapses to `false`, because the document generator needs a
//! decision for every module.
//!
//! ## Analyzer
//! [`RuleEvaluator::can_evaluate`] reports whether that `bool` is proven by
//! the facts at hand or only defaulted, and which variables were present or
//! missing. A fast path uses it to skip LLM calls when the deterministic
//! answer is already conclusive.
//!
//! # Missing Data
//!
//! | Fact state | `equals` / `not_equals` / `in_list` | `exists` | conclusive |
//! |---|---|---|---|
//! | absent or `null` | `false` | `false` | no |
//! | not applicable | `false` | `false` | yes |
//! | any other value | compared | `true` | yes |
//!
//! `and` needs every child to be conclusive; `or` is conclusive as soon as
//! one child is conclusively `true`, or when every child is conclusive.
//!
//! Both functions are pure: no caching, no interior mutability, safe to call
//! from any number of threads over shared rules and facts.

pub mod analyzer;
pub mod evaluator;

pub use analyzer::{Conclusiveness, Evaluation};
pub use evaluator::RuleEvaluator;

use crate::ast::RuleNode;
use crate::value::FactMap;

/// Shorthand for [`RuleEvaluator::evaluate`].
pub fn evaluate(rule: &RuleNode, facts: &FactMap) -> bool {
    RuleEvaluator::new().evaluate(rule, facts)
}

/// Shorthand for [`RuleEvaluator::can_evaluate`].
pub fn can_evaluate(rule: &RuleNode, facts: &FactMap) -> Conclusiveness {
    RuleEvaluator::new().can_evaluate(rule, facts)
}

/// Shorthand for [`RuleEvaluator::evaluate_with_evidence`].
pub fn evaluate_with_evidence(rule: &RuleNode, facts: &FactMap) -> Evaluation {
    RuleEvaluator::new().evaluate_with_evidence(rule, facts)
}
