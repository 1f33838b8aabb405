//! Variable integrity validation.
//!
//! A rule that references a variable no producer ever writes is not an
//! error at evaluation time: it simply reads as missing, forever. This module
//! finds those references offline, against the union of the two variable
//! catalogues (LLM extraction variables and system variables derived from
//! case metadata), together with any nodes that failed to decode.
//!
//! Findings are advisory; nothing here blocks a generation run.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::activation::{Module, RuleSlot};
use crate::ast::RuleNode;
use crate::config;
use crate::InternalResult;

/// Anything that can answer "does some producer write this variable?".
pub trait VariableLookup {
    fn knows(&self, variable: &str) -> bool;
}

impl VariableLookup for BTreeSet<String> {
    fn knows(&self, variable: &str) -> bool {
        self.contains(variable)
    }
}

impl VariableLookup for HashSet<String> {
    fn knows(&self, variable: &str) -> bool {
        self.contains(variable)
    }
}

/// The universe of variables a rule may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableRegistry {
    extraction_vars: BTreeSet<String>,
    system_vars: BTreeSet<String>,
}

impl VariableRegistry {
    pub fn new<E, S>(extraction_vars: E, system_vars: S) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            extraction_vars: extraction_vars.into_iter().map(Into::into).collect(),
            system_vars: system_vars.into_iter().map(Into::into).collect(),
        }
    }

    /// Load both catalogues; each file is a JSON array of variable names.
    pub fn from_catalogue_files(
        extraction: impl AsRef<Path>,
        system: impl AsRef<Path>,
    ) -> InternalResult<Self> {
        let extraction_vars: Vec<String> = config::from_file(extraction)?;
        let system_vars: Vec<String> = config::from_file(system)?;
        Ok(Self::new(extraction_vars, system_vars))
    }

    pub fn extraction_vars(&self) -> &BTreeSet<String> {
        &self.extraction_vars
    }

    pub fn system_vars(&self) -> &BTreeSet<String> {
        &self.system_vars
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.extraction_vars.contains(variable) || self.system_vars.contains(variable)
    }

    pub fn known(&self) -> BTreeSet<&str> {
        self.extraction_vars
            .iter()
            .chain(self.system_vars.iter())
            .map(String::as_str)
            .collect()
    }
}

impl VariableLookup for VariableRegistry {
    fn knows(&self, variable: &str) -> bool {
        self.contains(variable)
    }
}

/// Every variable referenced by a well-formed condition in `rule`.
pub fn collect_variables(rule: &RuleNode) -> BTreeSet<String> {
    let mut variables = BTreeSet::new();
    rule.walk(&mut |node| {
        if let RuleNode::Condition(condition) = node {
            if !condition.is_defective() {
                variables.insert(condition.variable.clone());
            }
        }
    });
    variables
}

/// Variables referenced by `rule` that `known` has never heard of.
pub fn validate(rule: &RuleNode, known: &impl VariableLookup) -> BTreeSet<String> {
    collect_variables(rule)
        .into_iter()
        .filter(|variable| !known.knows(variable))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Issue {
    UnknownVariable(String),
    MalformedNode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityFinding {
    pub module_id: String,
    pub slot: RuleSlot,
    pub issue: Issue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub modules_checked: usize,
    pub findings: Vec<IntegrityFinding>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn unknown_variables(&self) -> BTreeSet<&str> {
        self.findings
            .iter()
            .filter_map(|finding| match &finding.issue {
                Issue::UnknownVariable(variable) => Some(variable.as_str()),
                Issue::MalformedNode(_) => None,
            })
            .collect()
    }
}

/// Check every rule slot of one module.
pub fn validate_module(module: &Module, known: &impl VariableLookup) -> Vec<IntegrityFinding> {
    let mut findings = Vec::new();
    for (slot, rule) in module.rules() {
        for defect in rule.defects() {
            findings.push(IntegrityFinding {
                module_id: module.id.clone(),
                slot: slot.clone(),
                issue: Issue::MalformedNode(defect.to_string()),
            });
        }
        for variable in validate(rule, known) {
            findings.push(IntegrityFinding {
                module_id: module.id.clone(),
                slot: slot.clone(),
                issue: Issue::UnknownVariable(variable),
            });
        }
    }
    findings
}

/// Batch validation over a whole module catalogue.
#[tracing::instrument(level = "debug", skip_all, fields(modules = modules.len()))]
pub fn validate_modules(modules: &[Module], known: &impl VariableLookup) -> IntegrityReport {
    let findings: Vec<IntegrityFinding> = modules
        .iter()
        .flat_map(|module| validate_module(module, known))
        .collect();

    for finding in &findings {
        warn!(
            module = %finding.module_id,
            slot = %finding.slot,
            issue = ?finding.issue,
            "rule integrity finding"
        );
    }
    info!(
        modules = modules.len(),
        findings = findings.len(),
        "rule integrity validation finished"
    );

    IntegrityReport {
        modules_checked: modules.len(),
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_variables_collapses_duplicates() {
        let rule = RuleNode::or(vec![
            RuleNode::equals("a", true),
            RuleNode::and(vec![
                RuleNode::equals("a", false),
                RuleNode::not(RuleNode::condition("b", Operator::GreaterThan, 1)),
            ]),
        ]);
        assert_eq!(collect_variables(&rule), names(&["a", "b"]));
    }

    #[test]
    fn test_validate_reports_exactly_the_unknown() {
        let registry = VariableRegistry::new(["has_contract"], ["doc_type"]);
        let rule = RuleNode::and(vec![
            RuleNode::equals("has_contract", true),
            RuleNode::equals("has_contarct", true),
            RuleNode::equals("doc_type", "inicial"),
        ]);
        assert_eq!(validate(&rule, &registry), names(&["has_contarct"]));
        assert!(validate(&rule, &names(&["has_contract", "has_contarct", "doc_type"])).is_empty());
    }

    #[test]
    fn test_registry_union() {
        let registry = VariableRegistry::new(["a", "b"], ["b", "c"]);
        assert_eq!(registry.known().len(), 3);
        assert!(registry.contains("c"));
        assert!(!registry.contains("d"));
    }

    #[test]
    fn test_validate_modules() {
        let registry = VariableRegistry::new(["a"], Vec::<String>::new());
        let module = Module::new("m1")
            .with_primary_rule(RuleNode::or(vec![
                RuleNode::equals("a", true),
                RuleNode::equals("typo", true),
            ]))
            .with_doctype_rule(
                "contestacao",
                RuleNode::from_json(&json!({"type": "condition", "variable": "a", "operator": "like"})),
            );

        let report = validate_modules(&[module], &registry);
        assert_eq!(report.modules_checked, 1);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.unknown_variables(), BTreeSet::from(["typo"]));
        assert_eq!(report.findings[0].slot, RuleSlot::Primary);
        assert_eq!(report.findings[1].slot, RuleSlot::DocType("contestacao".into()));
        assert!(matches!(report.findings[1].issue, Issue::MalformedNode(_)));
        assert!(!report.is_clean());
    }
}
