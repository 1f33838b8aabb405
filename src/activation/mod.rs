//! Module activation.
//!
//! A content module is judged either deterministically, by evaluating its
//! rules against the fact map, or by the LLM. Which one is derived from the
//! rules the module carries: [`resolve_mode`] is the single read path for
//! that decision. The persisted `stored_mode` flag is only a fallback for
//! modules without rules and is deliberately not readable outside this
//! crate; [`repair::ModeRepair`] keeps it in step with the rules.

pub mod repair;

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::ast::{is_non_empty, RuleNode};
use crate::eval::{Evaluation, RuleEvaluator};
use crate::value::FactMap;

/// How a module's inclusion is judged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActivationMode {
    Deterministic,
    #[default]
    Llm,
}

/// Where a rule lives on a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleSlot {
    Primary,
    Secondary,
    DocType(String),
}

impl fmt::Display for RuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleSlot::Primary => write!(f, "primary"),
            RuleSlot::Secondary => write!(f, "secondary"),
            RuleSlot::DocType(doc_type) => write!(f, "doctype:{}", doc_type),
        }
    }
}

impl Serialize for RuleSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A reusable block of legal argument text and the rules that decide when
/// it is included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_rule: Option<RuleNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_rule: Option<RuleNode>,
    #[serde(default)]
    pub secondary_rule_fallback_enabled: bool,
    #[serde(default)]
    pub per_doctype_rules: BTreeMap<String, RuleNode>,
    #[serde(default)]
    stored_mode: ActivationMode,
}

impl Module {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            primary_rule: None,
            secondary_rule: None,
            secondary_rule_fallback_enabled: false,
            per_doctype_rules: BTreeMap::new(),
            stored_mode: ActivationMode::default(),
        }
    }

    pub fn with_primary_rule(mut self, rule: RuleNode) -> Self {
        self.primary_rule = Some(rule);
        self
    }

    pub fn with_secondary_rule(mut self, rule: RuleNode, fallback_enabled: bool) -> Self {
        self.secondary_rule = Some(rule);
        self.secondary_rule_fallback_enabled = fallback_enabled;
        self
    }

    pub fn with_doctype_rule(mut self, doc_type: impl Into<String>, rule: RuleNode) -> Self {
        self.per_doctype_rules.insert(doc_type.into(), rule);
        self
    }

    /// Set the persisted flag, as loaded from a module store.
    pub fn with_stored_mode(mut self, mode: ActivationMode) -> Self {
        self.stored_mode = mode;
        self
    }

    pub(crate) fn stored_mode(&self) -> ActivationMode {
        self.stored_mode
    }

    pub(crate) fn set_stored_mode(&mut self, mode: ActivationMode) {
        self.stored_mode = mode;
    }

    /// How this module is judged. The only supported way to read the mode.
    pub fn effective_mode(&self) -> ActivationMode {
        resolve_mode(
            self.stored_mode,
            self.primary_rule.as_ref(),
            self.secondary_rule.as_ref(),
            self.secondary_rule_fallback_enabled,
            &self.per_doctype_rules,
        )
    }

    /// Every rule attached to the module with the slot it sits in.
    pub fn rules(&self) -> impl Iterator<Item = (RuleSlot, &RuleNode)> {
        let primary = self.primary_rule.iter().map(|rule| (RuleSlot::Primary, rule));
        let secondary = self
            .secondary_rule
            .iter()
            .map(|rule| (RuleSlot::Secondary, rule));
        let per_doctype = self
            .per_doctype_rules
            .iter()
            .map(|(doc_type, rule)| (RuleSlot::DocType(doc_type.clone()), rule));
        primary.chain(secondary).chain(per_doctype)
    }

    fn secondary_fallback(&self) -> Option<&RuleNode> {
        if self.secondary_rule_fallback_enabled && is_non_empty(self.secondary_rule.as_ref()) {
            self.secondary_rule.as_ref()
        } else {
            None
        }
    }

    /// Judge the module for one generation run.
    ///
    /// A rule written for `doc_type` wins over the primary rule. When the
    /// primary rule cannot be settled by the facts and fallback is enabled,
    /// a conclusive secondary rule decides instead.
    pub fn decide(&self, facts: &FactMap, doc_type: Option<&str>) -> ModuleDecision {
        if self.effective_mode() == ActivationMode::Llm {
            return ModuleDecision::DeferToLlm;
        }

        let evaluator = RuleEvaluator::new();
        let decided = |source: RuleSlot, rule: &RuleNode| {
            let evidence = evaluator.evaluate_with_evidence(rule, facts);
            debug!(
                module = %self.id,
                %source,
                include = evidence.result,
                conclusive = evidence.conclusive,
                "module decided by rule"
            );
            ModuleDecision::Deterministic {
                include: evidence.result,
                source,
                evidence,
            }
        };

        if let Some(doc_type) = doc_type {
            if let Some(rule) = self
                .per_doctype_rules
                .get(doc_type)
                .filter(|rule| !rule.is_structurally_empty())
            {
                return decided(RuleSlot::DocType(doc_type.to_string()), rule);
            }
        }

        if let Some(primary) = self.primary_rule.as_ref().filter(|r| !r.is_structurally_empty()) {
            if let Some(secondary) = self.secondary_fallback() {
                if !evaluator.can_evaluate(primary, facts).conclusive
                    && evaluator.can_evaluate(secondary, facts).conclusive
                {
                    return decided(RuleSlot::Secondary, secondary);
                }
            }
            return decided(RuleSlot::Primary, primary);
        }

        if let Some(secondary) = self.secondary_fallback() {
            return decided(RuleSlot::Secondary, secondary);
        }

        debug!(module = %self.id, ?doc_type, "deterministic module has no rule for this run");
        ModuleDecision::NoApplicableRule
    }
}

/// Outcome of [`Module::decide`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ModuleDecision {
    /// The module is judged by the LLM.
    DeferToLlm,
    /// A rule decided; `evidence.conclusive` says whether the facts proved it.
    Deterministic {
        include: bool,
        source: RuleSlot,
        evidence: Evaluation,
    },
    /// The module is deterministic but none of its rules applies here,
    /// e.g. it only has rules for other document types.
    NoApplicableRule,
}

impl ModuleDecision {
    pub fn include(&self) -> Option<bool> {
        match self {
            ModuleDecision::Deterministic { include, .. } => Some(*include),
            _ => None,
        }
    }
}

/// Derive a module's activation mode from the rules it carries.
///
/// Deterministic when the primary rule is non-empty, when the secondary rule
/// is non-empty and fallback is enabled, or when any per-document-type rule
/// is non-empty. Otherwise the stored flag stands.
pub fn resolve_mode(
    stored_mode: ActivationMode,
    primary: Option<&RuleNode>,
    secondary: Option<&RuleNode>,
    fallback_enabled: bool,
    per_doctype_rules: &BTreeMap<String, RuleNode>,
) -> ActivationMode {
    let has_rules = is_non_empty(primary)
        || (fallback_enabled && is_non_empty(secondary))
        || per_doctype_rules
            .values()
            .any(|rule| !rule.is_structurally_empty());

    if has_rules {
        ActivationMode::Deterministic
    } else {
        stored_mode
    }
}

/// `Some(include)` only when the module is deterministic and the deciding
/// rule is settled by the facts, so the LLM call can be skipped.
pub fn fast_path(module: &Module, facts: &FactMap, doc_type: Option<&str>) -> Option<bool> {
    match module.decide(facts, doc_type) {
        ModuleDecision::Deterministic {
            include, evidence, ..
        } if evidence.conclusive => Some(include),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn empty_rules() -> BTreeMap<String, RuleNode> {
        BTreeMap::new()
    }

    #[test]
    fn test_primary_rule_overrides_stored_flag() {
        let rule = RuleNode::equals("a", true);
        assert_eq!(
            resolve_mode(ActivationMode::Llm, Some(&rule), None, false, &empty_rules()),
            ActivationMode::Deterministic
        );
    }

    #[test]
    fn test_secondary_rule_needs_fallback() {
        let rule = RuleNode::equals("a", true);
        assert_eq!(
            resolve_mode(ActivationMode::Llm, None, Some(&rule), false, &empty_rules()),
            ActivationMode::Llm
        );
        assert_eq!(
            resolve_mode(ActivationMode::Llm, None, Some(&rule), true, &empty_rules()),
            ActivationMode::Deterministic
        );
    }

    #[test]
    fn test_doctype_rules_count() {
        let mut rules = empty_rules();
        rules.insert("inicial".to_string(), RuleNode::equals("a", true));
        assert_eq!(
            resolve_mode(ActivationMode::Llm, None, None, false, &rules),
            ActivationMode::Deterministic
        );
    }

    #[test]
    fn test_empty_rules_fall_back_to_stored_flag() {
        let missing_tag = RuleNode::from_json(&json!({}));
        let empty_or = RuleNode::or(vec![]);
        let mut rules = empty_rules();
        rules.insert("inicial".to_string(), RuleNode::and(vec![]));

        for stored in [ActivationMode::Llm, ActivationMode::Deterministic] {
            assert_eq!(
                resolve_mode(stored, Some(&missing_tag), Some(&empty_or), true, &rules),
                stored
            );
        }
    }

    #[test]
    fn test_module_deserializes_with_defaults() {
        let module: Module = serde_json::from_value(json!({
            "id": "dano_moral",
            "primary_rule": null,
            "stored_mode": "llm"
        }))
        .unwrap();
        assert_eq!(module.effective_mode(), ActivationMode::Llm);

        let module: Module = serde_json::from_value(json!({
            "id": "dano_moral",
            "primary_rule": {"type": "condition", "variable": "a", "operator": "equals", "value": 1}
        }))
        .unwrap();
        assert_eq!(module.primary_rule, Some(RuleNode::equals("a", true)));
        assert_eq!(module.effective_mode(), ActivationMode::Deterministic);
    }

    #[test]
    fn test_decide_defers_llm_modules() {
        let module = Module::new("m");
        assert_eq!(module.decide(&FactMap::new(), None), ModuleDecision::DeferToLlm);
        assert_eq!(fast_path(&module, &FactMap::new(), None), None);
    }

    #[test]
    fn test_decide_prefers_doctype_rule() {
        let module = Module::new("m")
            .with_primary_rule(RuleNode::equals("a", true))
            .with_doctype_rule("contestacao", RuleNode::equals("b", true));
        let facts = FactMap::new().with("a", true).with("b", false);

        let decision = module.decide(&facts, Some("contestacao"));
        assert!(matches!(
            decision,
            ModuleDecision::Deterministic { include: false, source: RuleSlot::DocType(ref d), .. } if d == "contestacao"
        ));
        assert_eq!(module.decide(&facts, Some("inicial")).include(), Some(true));
        assert_eq!(module.decide(&facts, None).include(), Some(true));
    }

    #[test]
    fn test_decide_falls_back_to_conclusive_secondary() {
        let module = Module::new("m")
            .with_primary_rule(RuleNode::equals("extracted", true))
            .with_secondary_rule(RuleNode::condition("valor", Operator::GreaterThan, 100), true);
        let facts = FactMap::new().with("valor", 500);

        let decision = module.decide(&facts, None);
        assert!(matches!(
            decision,
            ModuleDecision::Deterministic { include: true, source: RuleSlot::Secondary, .. }
        ));
        assert_eq!(fast_path(&module, &facts, None), Some(true));

        // Without fallback the unproven primary answer stands, and the fast
        // path refuses it.
        let strict = module.clone().with_secondary_rule(
            RuleNode::condition("valor", Operator::GreaterThan, 100),
            false,
        );
        assert_eq!(strict.decide(&facts, None).include(), Some(false));
        assert_eq!(fast_path(&strict, &facts, None), None);
    }

    #[test]
    fn test_decide_without_applicable_rule() {
        let module = Module::new("m").with_doctype_rule("contestacao", RuleNode::equals("a", true));
        assert_eq!(
            module.decide(&FactMap::new(), Some("inicial")),
            ModuleDecision::NoApplicableRule
        );
    }

    #[test]
    fn test_rule_slot_display() {
        assert_eq!(RuleSlot::DocType("inicial".into()).to_string(), "doctype:inicial");
        assert_eq!(
            serde_json::to_value(RuleSlot::Secondary).unwrap(),
            json!("secondary")
        );
    }
}
