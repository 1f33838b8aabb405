use std::collections::BTreeSet;

use serde::Serialize;

use super::evaluator::RuleEvaluator;
use crate::ast::RuleNode;
use crate::integrity::collect_variables;
use crate::value::FactMap;

/// Whether the facts at hand settle a rule, and which of its variables
/// were available.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Conclusiveness {
    pub conclusive: bool,
    pub present: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

/// A decision together with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub result: bool,
    pub conclusive: bool,
    pub present: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl RuleEvaluator {
    /// Report whether `evaluate(rule, facts)` is proven by the facts rather
    /// than defaulted to `false` for lack of data.
    ///
    /// `present`/`missing` partition every variable the rule references,
    /// including branches an `or` short-circuit made irrelevant.
    pub fn can_evaluate(&self, rule: &RuleNode, facts: &FactMap) -> Conclusiveness {
        let (present, missing) = collect_variables(rule)
            .into_iter()
            .partition(|variable| facts.is_present(variable));

        Conclusiveness {
            conclusive: self.is_conclusive(rule, facts),
            present,
            missing,
        }
    }

    /// [`evaluate`](Self::evaluate) and [`can_evaluate`](Self::can_evaluate) in one call.
    pub fn evaluate_with_evidence(&self, rule: &RuleNode, facts: &FactMap) -> Evaluation {
        let Conclusiveness {
            conclusive,
            present,
            missing,
        } = self.can_evaluate(rule, facts);

        Evaluation {
            result: self.evaluate(rule, facts),
            conclusive,
            present,
            missing,
        }
    }

    fn is_conclusive(&self, rule: &RuleNode, facts: &FactMap) -> bool {
        match rule {
            RuleNode::Condition(condition) => {
                !condition.is_defective() && facts.is_present(&condition.variable)
            }
            // One unknown branch could still flip an AND.
            RuleNode::And(children) => {
                !children.is_empty() && children.iter().all(|child| self.is_conclusive(child, facts))
            }
            // A single proven `true` settles an OR; proving `false` needs every branch.
            RuleNode::Or(children) => {
                if children.is_empty() {
                    return false;
                }
                let settled: Vec<bool> = children
                    .iter()
                    .map(|child| self.is_conclusive(child, facts))
                    .collect();
                settled.iter().all(|&conclusive| conclusive)
                    || children
                        .iter()
                        .zip(&settled)
                        .any(|(child, &conclusive)| conclusive && self.evaluate(child, facts))
            }
            RuleNode::Not(child) => self.is_conclusive(child, facts),
        }
    }
}
