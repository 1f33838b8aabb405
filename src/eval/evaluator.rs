use tracing::{debug, warn};

use crate::ast::{Condition, Operator, RuleNode};
use crate::normalize::{in_list, parse_number, values_equal};
use crate::value::{FactMap, Literal};

/// Evaluates rule trees against a fact map.
///
/// Stateless; one instance can be shared freely.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Top level entry point: decide the rule against `facts`.
    ///
    /// Total and deterministic. Malformed nodes and empty groups count as
    /// `false`.
    pub fn evaluate(&self, rule: &RuleNode, facts: &FactMap) -> bool {
        match rule {
            RuleNode::Condition(condition) => self.eval_condition(condition, facts),
            RuleNode::And(children) => {
                if children.is_empty() {
                    warn!("empty `and` group evaluates to false");
                    return false;
                }
                children.iter().all(|child| self.evaluate(child, facts))
            }
            RuleNode::Or(children) => {
                if children.is_empty() {
                    warn!("empty `or` group evaluates to false");
                    return false;
                }
                children.iter().any(|child| self.evaluate(child, facts))
            }
            RuleNode::Not(child) => !self.evaluate(child, facts),
        }
    }

    fn eval_condition(&self, condition: &Condition, facts: &FactMap) -> bool {
        if let Some(defect) = &condition.defect {
            warn!(%defect, "malformed rule node evaluates to false");
            return false;
        }

        // Missing and not-applicable facts both read as `None` here.
        let actual = facts.get(&condition.variable).as_literal();
        let expected = &condition.value;

        let result = match condition.operator {
            Operator::Exists => actual.is_some(),
            Operator::NotExists => actual.is_none(),
            // Absence is never an accidental match, in either direction.
            Operator::Equals => actual.is_some_and(|a| values_equal(&a, expected)),
            Operator::NotEquals => actual.is_some_and(|a| !values_equal(&a, expected)),
            Operator::GreaterThan => compare_numbers(actual.as_ref(), expected, |a, b| a > b),
            Operator::LessThan => compare_numbers(actual.as_ref(), expected, |a, b| a < b),
            Operator::InList => actual.is_some_and(|a| in_list(&a, expected)),
        };

        debug!(
            variable = %condition.variable,
            operator = %condition.operator,
            result,
            "condition evaluated"
        );
        result
    }
}

fn compare_numbers(
    actual: Option<&Literal>,
    expected: &Literal,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (actual.and_then(parse_number), parse_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FactValue;
    use serde_json::json;

    fn facts(value: serde_json::Value) -> FactMap {
        FactMap::from_json(&value, crate::value::NOT_APPLICABLE_SENTINEL)
    }

    #[test]
    fn test_equals() {
        let evaluator = RuleEvaluator::new();
        let rule = RuleNode::equals("has_contract", true);

        assert!(evaluator.evaluate(&rule, &facts(json!({"has_contract": true}))));
        assert!(evaluator.evaluate(&rule, &facts(json!({"has_contract": "sim"}))));
        assert!(evaluator.evaluate(&rule, &facts(json!({"has_contract": 1}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({"has_contract": "não"}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({}))));
    }

    #[test]
    fn test_not_equals_on_absent_data_is_false() {
        let evaluator = RuleEvaluator::new();
        let rule = RuleNode::condition("court", Operator::NotEquals, "TJSP");

        assert!(evaluator.evaluate(&rule, &facts(json!({"court": "TJRJ"}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({"court": "tjsp"}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({"court": null}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({"court": "__NOT_APPLICABLE__"}))));
    }

    #[test]
    fn test_exists() {
        let evaluator = RuleEvaluator::new();
        let exists = RuleNode::exists("x");
        let not_exists = RuleNode::condition("x", Operator::NotExists, Literal::Null);

        for (fact, present) in [
            (json!({"x": 0}), true),
            (json!({"x": ""}), true),
            (json!({"x": null}), false),
            (json!({"x": "__NOT_APPLICABLE__"}), false),
            (json!({}), false),
        ] {
            let facts = facts(fact);
            assert_eq!(evaluator.evaluate(&exists, &facts), present);
            assert_eq!(evaluator.evaluate(&not_exists, &facts), !present);
        }
    }

    #[test]
    fn test_numeric_comparisons() {
        let evaluator = RuleEvaluator::new();
        let gt = RuleNode::condition("valor_causa", Operator::GreaterThan, 40000);
        let lt = RuleNode::condition("valor_causa", Operator::LessThan, "40000");

        assert!(evaluator.evaluate(&gt, &facts(json!({"valor_causa": 50000}))));
        assert!(evaluator.evaluate(&gt, &facts(json!({"valor_causa": "50000,50"}))));
        assert!(!evaluator.evaluate(&gt, &facts(json!({"valor_causa": 40000}))));
        assert!(evaluator.evaluate(&lt, &facts(json!({"valor_causa": "100"}))));
        // Unparseable input is a failed comparison, not an error.
        assert!(!evaluator.evaluate(&gt, &facts(json!({"valor_causa": "muito"}))));
        assert!(!evaluator.evaluate(&lt, &facts(json!({"valor_causa": "muito"}))));
        assert!(!evaluator.evaluate(&gt, &facts(json!({}))));
    }

    #[test]
    fn test_in_list() {
        let evaluator = RuleEvaluator::new();
        let rule = RuleNode::condition("area", Operator::InList, vec!["civel", "consumidor"]);

        assert!(evaluator.evaluate(&rule, &facts(json!({"area": "Consumidor"}))));
        assert!(evaluator.evaluate(&rule, &facts(json!({"area": ["penal", "civel"]}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({"area": "penal"}))));
        assert!(!evaluator.evaluate(&rule, &facts(json!({}))));
    }

    #[test]
    fn test_groups() {
        let evaluator = RuleEvaluator::new();
        let facts = FactMap::new().with("a", true).with("b", false);

        assert!(!evaluator.evaluate(
            &RuleNode::and(vec![RuleNode::equals("a", true), RuleNode::equals("b", true)]),
            &facts
        ));
        assert!(evaluator.evaluate(
            &RuleNode::or(vec![RuleNode::equals("a", true), RuleNode::equals("b", true)]),
            &facts
        ));
        assert!(evaluator.evaluate(&RuleNode::not(RuleNode::equals("b", true)), &facts));
    }

    #[test]
    fn test_malformed_and_empty_nodes_are_false() {
        let evaluator = RuleEvaluator::new();
        let facts = FactMap::new().with("a", true);

        assert!(!evaluator.evaluate(&RuleNode::and(vec![]), &facts));
        assert!(!evaluator.evaluate(&RuleNode::or(vec![]), &facts));
        let malformed = RuleNode::from_json(&json!({"type": "condition", "variable": "a", "operator": "like"}));
        assert!(!evaluator.evaluate(&malformed, &facts));
        let missing_tag = RuleNode::from_json(&json!({"variable": "a"}));
        assert!(!evaluator.evaluate(&missing_tag, &facts));
    }

    #[test]
    fn test_not_applicable_is_absent() {
        let evaluator = RuleEvaluator::new();
        let facts = FactMap::new().with("q", FactValue::NotApplicable);
        assert!(!evaluator.evaluate(&RuleNode::equals("q", true), &facts));
        assert!(!evaluator.evaluate(&RuleNode::equals("q", "__NOT_APPLICABLE__"), &facts));
    }
}
