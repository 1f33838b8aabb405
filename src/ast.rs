//! Rule AST and its JSON wire format.
//!
//! A rule is a closed tree of four node kinds. Decoding from JSON is total:
//! anything that does not fit the grammar becomes a condition carrying a
//! [`Defect`], which evaluates to `false` and is never conclusive, so a bad
//! rule can never abort a generation run.
//!
//! ```text
//! {"type": "condition", "variable": "has_contract", "operator": "equals", "value": true}
//! {"type": "and" | "or", "conditions": [<node>, ...]}
//! {"type": "not", "conditions": [<node>]}
//! ```

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::normalize::normalize_literal;
use crate::value::Literal;

/// Comparison operators available to a condition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Operator {
    #[strum(to_string = "equals", serialize = "eq")]
    Equals,
    #[strum(to_string = "not_equals", serialize = "neq")]
    NotEquals,
    #[strum(to_string = "exists")]
    Exists,
    #[strum(to_string = "not_exists")]
    NotExists,
    #[strum(to_string = "greater_than", serialize = "gt")]
    GreaterThan,
    #[strum(to_string = "less_than", serialize = "lt")]
    LessThan,
    #[strum(to_string = "in_list", serialize = "in")]
    InList,
}

/// Why a JSON node could not be read as a rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefectKind {
    #[error("rule node is not an object")]
    NotAnObject,
    #[error("rule node has no type tag")]
    MissingType,
    #[error("unknown rule node type: {0}")]
    UnknownType(String),
    #[error("condition has no variable")]
    MissingVariable,
    #[error("condition has no operator")]
    MissingOperator,
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("not node expects exactly one child, found {0}")]
    NotArity(usize),
}

/// A decoding defect together with the JSON it came from, so the node can be
/// written back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Defect {
    pub kind: DefectKind,
    pub raw: Value,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} in {}", self.kind, self.raw)
    }
}

/// A leaf comparison `variable operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    pub value: Literal,
    pub defect: Option<Defect>,
}

impl Condition {
    pub fn new(variable: impl Into<String>, operator: Operator, value: impl Into<Literal>) -> Self {
        Self {
            variable: variable.into(),
            operator,
            value: normalize_literal(&value.into()),
            defect: None,
        }
    }

    /// A placeholder for a node that failed to decode.
    pub fn defective(kind: DefectKind, raw: Value) -> Self {
        Self {
            variable: String::new(),
            operator: Operator::Equals,
            value: Literal::Null,
            defect: Some(Defect { kind, raw }),
        }
    }

    pub fn is_defective(&self) -> bool {
        self.defect.is_some()
    }
}

/// Boolean rule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum RuleNode {
    Condition(Condition),
    And(Vec<RuleNode>),
    Or(Vec<RuleNode>),
    Not(Box<RuleNode>),
}

impl RuleNode {
    pub fn condition(variable: impl Into<String>, operator: Operator, value: impl Into<Literal>) -> Self {
        RuleNode::Condition(Condition::new(variable, operator, value))
    }

    pub fn equals(variable: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::condition(variable, Operator::Equals, value)
    }

    pub fn exists(variable: impl Into<String>) -> Self {
        Self::condition(variable, Operator::Exists, Literal::Null)
    }

    pub fn and(children: Vec<RuleNode>) -> Self {
        RuleNode::And(children)
    }

    pub fn or(children: Vec<RuleNode>) -> Self {
        RuleNode::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: RuleNode) -> Self {
        RuleNode::Not(Box::new(child))
    }

    /// Decode a wire-format node. Never fails; see the module docs.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return defective(DefectKind::NotAnObject, value);
        };
        let Some(tag) = object.get("type").and_then(Value::as_str) else {
            return defective(DefectKind::MissingType, value);
        };

        match tag.trim().to_ascii_lowercase().as_str() {
            "condition" => decode_condition(object, value),
            "and" => RuleNode::And(decode_children(object)),
            "or" => RuleNode::Or(decode_children(object)),
            "not" => {
                let mut children = decode_children(object);
                if children.len() == 1 {
                    RuleNode::Not(Box::new(children.remove(0)))
                } else {
                    defective(DefectKind::NotArity(children.len()), value)
                }
            }
            other => defective(DefectKind::UnknownType(other.to_string()), value),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RuleNode::Condition(condition) => match &condition.defect {
                Some(defect) => defect.raw.clone(),
                None => json!({
                    "type": "condition",
                    "variable": condition.variable,
                    "operator": condition.operator.as_ref(),
                    "value": Value::from(&condition.value),
                }),
            },
            RuleNode::And(children) => json!({
                "type": "and",
                "conditions": children.iter().map(RuleNode::to_json).collect::<Vec<_>>(),
            }),
            RuleNode::Or(children) => json!({
                "type": "or",
                "conditions": children.iter().map(RuleNode::to_json).collect::<Vec<_>>(),
            }),
            RuleNode::Not(child) => json!({
                "type": "not",
                "conditions": [child.to_json()],
            }),
        }
    }

    /// A node with no usable content: no type tag, not an object, or an
    /// `and`/`or` group without children.
    pub fn is_structurally_empty(&self) -> bool {
        match self {
            RuleNode::Condition(Condition {
                defect: Some(defect),
                ..
            }) => matches!(defect.kind, DefectKind::NotAnObject | DefectKind::MissingType),
            RuleNode::And(children) | RuleNode::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Every decoding defect in the tree, in depth-first order.
    pub fn defects(&self) -> Vec<&Defect> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if let RuleNode::Condition(Condition {
                defect: Some(defect),
                ..
            }) = node
            {
                found.push(defect);
            }
        });
        found
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a RuleNode)) {
        visit(self);
        match self {
            RuleNode::Condition(_) => {}
            RuleNode::And(children) | RuleNode::Or(children) => {
                for child in children {
                    child.walk(visit);
                }
            }
            RuleNode::Not(child) => child.walk(visit),
        }
    }
}

/// `true` when the optional rule exists and has usable content.
pub fn is_non_empty(rule: Option<&RuleNode>) -> bool {
    rule.is_some_and(|rule| !rule.is_structurally_empty())
}

fn defective(kind: DefectKind, raw: &Value) -> RuleNode {
    RuleNode::Condition(Condition::defective(kind, raw.clone()))
}

fn decode_children(object: &Map<String, Value>) -> Vec<RuleNode> {
    object
        .get("conditions")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(RuleNode::from_json).collect())
        .unwrap_or_default()
}

fn decode_condition(object: &Map<String, Value>, raw: &Value) -> RuleNode {
    let variable = match object.get("variable").and_then(Value::as_str).map(str::trim) {
        Some(variable) if !variable.is_empty() => variable,
        _ => return defective(DefectKind::MissingVariable, raw),
    };
    let operator = match object.get("operator").and_then(Value::as_str) {
        None => return defective(DefectKind::MissingOperator, raw),
        Some(name) => match Operator::from_str(name.trim()) {
            Ok(operator) => operator,
            Err(_) => return defective(DefectKind::UnknownOperator(name.to_string()), raw),
        },
    };
    let value = object.get("value").map(Literal::from).unwrap_or_default();
    RuleNode::condition(variable, operator, value)
}

impl From<Value> for RuleNode {
    fn from(value: Value) -> Self {
        RuleNode::from_json(&value)
    }
}

impl From<&Value> for RuleNode {
    fn from(value: &Value) -> Self {
        RuleNode::from_json(value)
    }
}

impl From<RuleNode> for Value {
    fn from(rule: RuleNode) -> Self {
        rule.to_json()
    }
}

impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleNode::Condition(condition) => match &condition.defect {
                Some(defect) => write!(f, "<malformed: {}>", defect.kind),
                None => match condition.operator {
                    Operator::Exists | Operator::NotExists => {
                        write!(f, "{} {}", condition.variable, condition.operator)
                    }
                    _ => write!(
                        f,
                        "{} {} {}",
                        condition.variable, condition.operator, condition.value
                    ),
                },
            },
            RuleNode::And(children) => write_group(f, "AND", children),
            RuleNode::Or(children) => write_group(f, "OR", children),
            RuleNode::Not(child) => write!(f, "NOT {}", child),
        }
    }
}

fn write_group(f: &mut fmt::Formatter, joiner: &str, children: &[RuleNode]) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", joiner)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_condition() {
        let rule = RuleNode::from_json(&json!({
            "type": "condition",
            "variable": "has_contract",
            "operator": "equals",
            "value": 1
        }));
        assert_eq!(rule, RuleNode::equals("has_contract", true));
    }

    #[test]
    fn test_decode_nested_groups() {
        let rule = RuleNode::from_json(&json!({
            "type": "and",
            "conditions": [
                {"type": "condition", "variable": "a", "operator": "exists"},
                {"type": "not", "conditions": [
                    {"type": "condition", "variable": "b", "operator": "in_list", "value": ["x", "y"]}
                ]}
            ]
        }));
        assert_eq!(
            rule,
            RuleNode::and(vec![
                RuleNode::exists("a"),
                RuleNode::not(RuleNode::condition(
                    "b",
                    Operator::InList,
                    vec!["x", "y"]
                )),
            ])
        );
    }

    #[test]
    fn test_operator_spellings() {
        assert_eq!(Operator::from_str("GREATER_THAN").unwrap(), Operator::GreaterThan);
        assert_eq!(Operator::from_str("in").unwrap(), Operator::InList);
        assert_eq!(Operator::from_str("neq").unwrap(), Operator::NotEquals);
        assert_eq!(Operator::NotExists.to_string(), "not_exists");
        assert!(Operator::from_str("contains").is_err());
    }

    #[test]
    fn test_defects() {
        let cases = [
            (json!("equals"), DefectKind::NotAnObject),
            (json!({}), DefectKind::MissingType),
            (json!({"type": "xor"}), DefectKind::UnknownType("xor".into())),
            (
                json!({"type": "condition", "operator": "equals"}),
                DefectKind::MissingVariable,
            ),
            (
                json!({"type": "condition", "variable": "a"}),
                DefectKind::MissingOperator,
            ),
            (
                json!({"type": "condition", "variable": "a", "operator": "like"}),
                DefectKind::UnknownOperator("like".into()),
            ),
            (json!({"type": "not", "conditions": []}), DefectKind::NotArity(0)),
        ];

        for (raw, expected) in cases {
            let rule = RuleNode::from_json(&raw);
            let defects = rule.defects();
            assert_eq!(defects.len(), 1, "{raw}");
            assert_eq!(defects[0].kind, expected);
            // Defective nodes serialize back to what they were read from.
            assert_eq!(rule.to_json(), raw);
        }
    }

    #[test]
    fn test_structural_emptiness() {
        assert!(RuleNode::from_json(&json!({})).is_structurally_empty());
        assert!(RuleNode::from_json(&json!({"type": "or", "conditions": []})).is_structurally_empty());
        assert!(RuleNode::from_json(&json!({"type": "and"})).is_structurally_empty());
        assert!(!RuleNode::equals("a", true).is_structurally_empty());
        // Broken but not empty: somebody meant to write a rule here.
        assert!(!RuleNode::from_json(&json!({"type": "condition", "variable": "a", "operator": "like"}))
            .is_structurally_empty());
        assert!(!is_non_empty(None));
    }

    #[test]
    fn test_serde_round_trip() {
        let rule = RuleNode::or(vec![
            RuleNode::equals("a", true),
            RuleNode::condition("valor_causa", Operator::GreaterThan, 40000),
        ]);
        let text = serde_json::to_string(&rule).unwrap();
        let back: RuleNode = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_display() {
        let rule = RuleNode::and(vec![
            RuleNode::equals("a", "sim"),
            RuleNode::not(RuleNode::exists("b")),
        ]);
        assert_eq!(rule.to_string(), "(a equals true AND NOT b exists)");
    }
}
