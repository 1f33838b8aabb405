//! Dependency evaluator for the data-collection form.
//!
//! Form questions can depend on earlier answers ("ask for the contract date
//! only if there is a contract"). A dependency is either one shorthand
//! condition or a composite `{conditions, logic}` group; both lower to a
//! [`RuleNode`] and are judged by the same evaluator as module rules.
//!
//! Before rules see the answers, [`preprocess`] marks every question whose
//! dependency is unmet as not applicable, walking in dependency order so a
//! chain `q1 -> q2 -> q3` collapses in one pass.

mod order;

pub use order::{dependency_order, preprocess, visible_questions};

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::ast::{Condition, DefectKind, Operator, RuleNode};
use crate::eval::RuleEvaluator;
use crate::integrity::collect_variables;
use crate::value::{FactMap, FactValue, Literal, NOT_APPLICABLE_SENTINEL};

/// How the conditions of a composite dependency combine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// When a question is shown.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    Single(RuleNode),
    Composite { conditions: Vec<RuleNode>, logic: Logic },
}

impl Dependency {
    /// Shorthand dependency `variable operator value`.
    pub fn on(variable: impl Into<String>, operator: Operator, value: impl Into<Literal>) -> Self {
        Dependency::Single(RuleNode::condition(variable, operator, value))
    }

    pub fn to_rule(&self) -> RuleNode {
        match self {
            Dependency::Single(rule) => rule.clone(),
            Dependency::Composite { conditions, logic } => match logic {
                Logic::And => RuleNode::And(conditions.clone()),
                Logic::Or => RuleNode::Or(conditions.clone()),
            },
        }
    }

    /// Answers this dependency reads.
    pub fn variables(&self) -> BTreeSet<String> {
        collect_variables(&self.to_rule())
    }

    pub fn is_satisfied(&self, answers: &FactMap) -> bool {
        RuleEvaluator::new().evaluate(&self.to_rule(), answers)
    }
}

/// One question of the form, with its answer if one was given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "QuestionRecord")]
pub struct Question {
    pub id: String,
    pub depends_on: Option<Dependency>,
    pub answer: FactValue,
}

impl Question {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            depends_on: None,
            answer: FactValue::Missing,
        }
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.depends_on = Some(dependency);
        self
    }

    pub fn with_answer(mut self, answer: impl Into<FactValue>) -> Self {
        self.answer = answer.into();
        self
    }

    /// Visible when there is no dependency or it holds for `answers`.
    pub fn is_visible(&self, answers: &FactMap) -> bool {
        self.depends_on
            .as_ref()
            .map_or(true, |dependency| dependency.is_satisfied(answers))
    }
}

/// Question record as stored by the form builder.
#[derive(Debug, Deserialize)]
struct QuestionRecord {
    id: String,
    #[serde(default)]
    depends_on_variable: Option<String>,
    #[serde(default)]
    dependency_operator: Option<String>,
    #[serde(default)]
    dependency_value: Option<Value>,
    #[serde(default)]
    dependency_config: Option<Value>,
    #[serde(default)]
    answer: Value,
}

impl From<QuestionRecord> for Question {
    fn from(record: QuestionRecord) -> Self {
        Question::from_record(record, NOT_APPLICABLE_SENTINEL)
    }
}

impl Question {
    /// Decode form question records, recognising `sentinel` in their answers.
    ///
    /// Plain deserialization of [`Question`] assumes the default sentinel.
    pub fn list_from_json(value: &Value, sentinel: &str) -> Result<Vec<Question>, serde_json::Error> {
        let records = Vec::<QuestionRecord>::deserialize(value)?;
        Ok(records
            .into_iter()
            .map(|record| Question::from_record(record, sentinel))
            .collect())
    }

    fn from_record(record: QuestionRecord, sentinel: &str) -> Self {
        let depends_on = match &record.dependency_config {
            Some(config) if !config.is_null() => decode_config(config),
            _ => record.depends_on_variable.as_deref().map(|variable| {
                Dependency::Single(shorthand_condition(
                    Some(variable),
                    record.dependency_operator.as_deref(),
                    record.dependency_value.as_ref(),
                    &Value::String(variable.to_string()),
                ))
            }),
        };

        Question {
            answer: FactValue::from_json(&record.answer, sentinel),
            id: record.id,
            depends_on,
        }
    }
}

/// `{conditions: [...], logic: "and" | "or"}`. Entries are shorthand
/// conditions or full rule nodes. An empty group means no dependency.
fn decode_config(config: &Value) -> Option<Dependency> {
    let Some(object) = config.as_object() else {
        warn!(%config, "dependency config is not an object");
        return Some(Dependency::Single(RuleNode::Condition(Condition::defective(
            DefectKind::NotAnObject,
            config.clone(),
        ))));
    };

    let conditions: Vec<RuleNode> = object
        .get("conditions")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(decode_entry).collect())
        .unwrap_or_default();
    if conditions.is_empty() {
        return None;
    }

    let logic = match object.get("logic").and_then(Value::as_str) {
        None => Logic::default(),
        Some(name) => name.trim().parse().unwrap_or_else(|_| {
            warn!(logic = name, "unknown dependency logic, using `and`");
            Logic::default()
        }),
    };

    Some(Dependency::Composite { conditions, logic })
}

fn decode_entry(entry: &Value) -> RuleNode {
    match entry.as_object() {
        Some(object) if object.contains_key("type") => RuleNode::from_json(entry),
        Some(object) => shorthand_from_object(object, entry),
        None => RuleNode::from_json(entry),
    }
}

fn shorthand_from_object(object: &Map<String, Value>, raw: &Value) -> RuleNode {
    let variable = object
        .get("variable")
        .or_else(|| object.get("depends_on_variable"))
        .and_then(Value::as_str);
    let operator = object.get("operator").and_then(Value::as_str);
    shorthand_condition(variable, operator, object.get("value"), raw)
}

/// Shorthand defaults: operator `equals`, value `true`.
fn shorthand_condition(
    variable: Option<&str>,
    operator: Option<&str>,
    value: Option<&Value>,
    raw: &Value,
) -> RuleNode {
    let variable = match variable.map(str::trim) {
        Some(variable) if !variable.is_empty() => variable,
        _ => {
            return RuleNode::Condition(Condition::defective(
                DefectKind::MissingVariable,
                raw.clone(),
            ))
        }
    };
    let operator = match operator {
        None => Operator::Equals,
        Some(name) => match name.trim().parse::<Operator>() {
            Ok(operator) => operator,
            Err(_) => {
                return RuleNode::Condition(Condition::defective(
                    DefectKind::UnknownOperator(name.to_string()),
                    raw.clone(),
                ))
            }
        },
    };
    let value = value.map(Literal::from).unwrap_or(Literal::Bool(true));
    RuleNode::condition(variable, operator, value)
}
