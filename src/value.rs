//! Literal and fact values.
//!
//! Rules compare a [`FactValue`] looked up in a [`FactMap`] against a
//! [`Literal`] authored into the rule. Both come off the wire as plain JSON;
//! the conversions here are total, so a fact map or rule literal can always
//! be built from whatever the external producers hand over.

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Reserved fact-map string meaning "skipped because a prerequisite made it moot".
pub const NOT_APPLICABLE_SENTINEL: &str = "__NOT_APPLICABLE__";

/// A value authored into a rule condition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Literal {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Literal>),
    #[default]
    Null,
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Elements of a list literal, or the literal itself as a one-element slice.
    pub fn as_slice(&self) -> &[Literal] {
        match self {
            Literal::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }
}

impl From<&Value> for Literal {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Literal::Null, Literal::Number),
            Value::String(s) => Literal::String(s.clone()),
            Value::Array(items) => Literal::List(items.iter().map(Literal::from).collect()),
            // Objects carry no comparable meaning; keep their text so they
            // can still be reported.
            Value::Object(_) => Literal::String(value.to_string()),
        }
    }
}

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        Literal::from(&value)
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => number_to_json(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            Literal::Null => Value::Null,
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::from(&literal)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Number(n as f64)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Number(f64::from(n))
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(items: Vec<T>) -> Self {
        Literal::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

/// Integral floats go back out as JSON integers so `1` stays `1`.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// One entry of a fact map.
///
/// `Missing` stands for an absent key; a JSON `null` decodes to `Missing` as
/// well, since a producer that reports `null` has not established the fact.
/// `NotApplicable` is the dependency sentinel: the fact was deliberately
/// skipped. Most operators treat both the same way.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FactValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Literal>),
    #[default]
    Missing,
    NotApplicable,
}

impl FactValue {
    /// Decode a JSON fact, recognising `sentinel` as [`FactValue::NotApplicable`].
    pub fn from_json(value: &Value, sentinel: &str) -> Self {
        match value {
            Value::Null => FactValue::Missing,
            Value::Bool(b) => FactValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FactValue::Missing, FactValue::Number),
            Value::String(s) if s == sentinel => FactValue::NotApplicable,
            Value::String(s) => FactValue::String(s.clone()),
            Value::Array(items) => FactValue::List(items.iter().map(Literal::from).collect()),
            Value::Object(_) => FactValue::String(value.to_string()),
        }
    }

    pub fn to_json(&self, sentinel: &str) -> Value {
        match self {
            FactValue::NotApplicable => Value::String(sentinel.to_string()),
            other => other.as_literal().map_or(Value::Null, Value::from),
        }
    }

    /// The comparable value, or `None` when the fact is missing or not applicable.
    pub fn as_literal(&self) -> Option<Literal> {
        match self {
            FactValue::Bool(b) => Some(Literal::Bool(*b)),
            FactValue::Number(n) => Some(Literal::Number(*n)),
            FactValue::String(s) => Some(Literal::String(s.clone())),
            FactValue::List(items) => Some(Literal::List(items.clone())),
            FactValue::Missing | FactValue::NotApplicable => None,
        }
    }

    /// True when an operator can compare against this value.
    pub fn is_comparable(&self) -> bool {
        !matches!(self, FactValue::Missing | FactValue::NotApplicable)
    }

    /// True when the fact has been settled, including settled as not applicable.
    pub fn is_present(&self) -> bool {
        !matches!(self, FactValue::Missing)
    }
}

impl From<Literal> for FactValue {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Bool(b) => FactValue::Bool(b),
            Literal::Number(n) => FactValue::Number(n),
            Literal::String(s) => FactValue::String(s),
            Literal::List(items) => FactValue::List(items),
            Literal::Null => FactValue::Missing,
        }
    }
}

static MISSING: FactValue = FactValue::Missing;

/// Flat case facts keyed by variable name.
///
/// Built once per generation run and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FactMap {
    entries: BTreeMap<String, FactValue>,
}

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object. Non-object input yields an empty map.
    pub fn from_json(value: &Value, sentinel: &str) -> Self {
        let entries = value
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .map(|(key, fact)| (key.clone(), FactValue::from_json(fact, sentinel)))
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    pub fn to_json(&self, sentinel: &str) -> Value {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, fact)| (key.clone(), fact.to_json(sentinel)))
            .collect();
        Value::Object(object)
    }

    pub fn with(mut self, variable: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.insert(variable, value);
        self
    }

    pub fn insert(&mut self, variable: impl Into<String>, value: impl Into<FactValue>) {
        self.entries.insert(variable.into(), value.into());
    }

    /// Look up a fact; absent keys read as [`FactValue::Missing`].
    pub fn get(&self, variable: &str) -> &FactValue {
        self.entries.get(variable).unwrap_or(&MISSING)
    }

    pub fn is_present(&self, variable: &str) -> bool {
        self.get(variable).is_present()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.entries.iter()
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        FactValue::Bool(b)
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        FactValue::Number(n as f64)
    }
}

impl From<i32> for FactValue {
    fn from(n: i32) -> Self {
        FactValue::Number(f64::from(n))
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::String(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::String(s)
    }
}

impl<K: Into<String>, V: Into<FactValue>> FromIterator<(K, V)> for FactMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
