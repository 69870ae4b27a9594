//! Scope classification.
//!
//! Rules run in ascending `(priority, id)` order. The first matching
//! non-additive rule decides the verdict; matching additive rules only add
//! justification lines, wherever they sit in the order.

use crate::rules::ScopeRule;
use sk_core::models::NO_MATCHING_RULE;
use sk_core::{AssetRecord, ScopeDecision, ScopeVerdict};
use tracing::{debug, instrument};

/// An ordered, read-only set of scope rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ScopeRule>,
}

impl RuleSet {
    /// Creates a rule set, sorting the rules into evaluation order.
    pub fn new(mut rules: Vec<ScopeRule>) -> Self {
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ScopeRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ScopeRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Classifies a single asset.
    #[instrument(skip(self, asset), fields(asset_id = %asset.id))]
    pub fn classify(&self, asset: &AssetRecord) -> ScopeDecision {
        let mut verdict: Option<ScopeVerdict> = None;
        let mut fired_rules = Vec::new();
        let mut justifications = Vec::new();

        for rule in &self.rules {
            if rule.additive {
                if rule.matches(asset) {
                    debug!(rule_id = %rule.id, "Additive rule matched");
                    fired_rules.push(rule.id.clone());
                    justifications.push(rule.justification_text());
                }
                continue;
            }

            if verdict.is_some() {
                continue;
            }

            // `validate` guarantees a verdict on non-additive rules; a rule
            // built by hand without one cannot decide anything.
            let Some(rule_verdict) = rule.verdict else {
                continue;
            };

            if rule.matches(asset) {
                debug!(rule_id = %rule.id, verdict = %rule_verdict, "Scope rule matched");
                verdict = Some(rule_verdict);
                fired_rules.push(rule.id.clone());
                justifications.push(rule.justification_text());
            }
        }

        let verdict = match verdict {
            Some(v) => v,
            None => {
                debug!("No scope rule matched");
                justifications.push(NO_MATCHING_RULE.to_string());
                ScopeVerdict::Indeterminate
            }
        };

        ScopeDecision {
            asset_id: asset.id.clone(),
            verdict,
            fired_rules,
            justifications,
        }
    }

    /// Classifies every asset, preserving input order.
    pub fn classify_all(&self, assets: &[AssetRecord]) -> Vec<ScopeDecision> {
        assets.iter().map(|a| self.classify(a)).collect()
    }
}

impl From<Vec<ScopeRule>> for RuleSet {
    fn from(rules: Vec<ScopeRule>) -> Self {
        Self::new(rules)
    }
}

/// Classifies `asset` against `rules`.
pub fn classify(asset: &AssetRecord, rules: &RuleSet) -> ScopeDecision {
    rules.classify(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleCondition, ScopeRuleBuilder};

    fn cardholder_zone_rule() -> ScopeRule {
        ScopeRuleBuilder::new("cardholder-zone")
            .when(RuleCondition::equals("network_zone", "cardholder"))
            .then_in_scope()
            .justification("cardholder zone")
            .priority(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_cardholder_zone_is_in_scope() {
        let rules = RuleSet::new(vec![cardholder_zone_rule()]);
        let asset = AssetRecord::new("pos-01", "inventory.json")
            .with_attribute("processes_card_data", true)
            .with_attribute("network_zone", "cardholder");

        let decision = classify(&asset, &rules);

        assert_eq!(decision.verdict, ScopeVerdict::InScope);
        assert_eq!(decision.fired_rules, vec!["cardholder-zone"]);
        assert_eq!(decision.justification(), "cardholder zone");
    }

    #[test]
    fn test_no_matching_rule_is_indeterminate() {
        let rules = RuleSet::new(vec![cardholder_zone_rule()]);
        let asset =
            AssetRecord::new("hr-01", "inventory.json").with_attribute("processes_card_data", false);

        let decision = rules.classify(&asset);

        assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
        assert!(decision.fired_rules.is_empty());
        assert_eq!(decision.justifications, vec![NO_MATCHING_RULE]);
    }

    #[test]
    fn test_empty_rule_set_is_indeterminate() {
        let decision = RuleSet::default().classify(&AssetRecord::new("a1", "test"));
        assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
    }

    #[test]
    fn test_first_decisive_match_wins() {
        let rules = RuleSet::new(vec![
            ScopeRule::new("z-out", vec![RuleCondition::Always], ScopeVerdict::OutOfScope)
                .with_priority(5),
            ScopeRule::new("a-in", vec![RuleCondition::Always], ScopeVerdict::InScope)
                .with_priority(5),
            ScopeRule::new("late", vec![RuleCondition::Always], ScopeVerdict::OutOfScope)
                .with_priority(1000),
        ]);

        let decision = rules.classify(&AssetRecord::new("a1", "test"));

        // Equal priority falls back to rule id
        assert_eq!(decision.verdict, ScopeVerdict::InScope);
        assert_eq!(decision.fired_rules, vec!["a-in"]);
    }

    #[test]
    fn test_additive_rules_collect_around_decisive_rule() {
        let rules = RuleSet::new(vec![
            ScopeRule::additive("stores", vec![RuleCondition::is_true("stores_chd")], "stores CHD")
                .with_priority(10),
            ScopeRule::new(
                "decide",
                vec![RuleCondition::is_true("stores_chd")],
                ScopeVerdict::InScope,
            )
            .with_priority(50)
            .with_justification("cardholder data environment"),
            ScopeRule::additive("cde", vec![RuleCondition::one_of("segment", &["cde"])], "in cde segment")
                .with_priority(90),
        ]);
        let asset = AssetRecord::new("db-01", "test")
            .with_attribute("stores_chd", true)
            .with_attribute("segment", "CDE");

        let decision = rules.classify(&asset);

        assert_eq!(decision.verdict, ScopeVerdict::InScope);
        assert_eq!(decision.fired_rules, vec!["stores", "decide", "cde"]);
        assert_eq!(
            decision.justification(),
            "stores CHD; cardholder data environment; in cde segment"
        );
    }

    #[test]
    fn test_additive_only_match_stays_indeterminate() {
        let rules = RuleSet::new(vec![ScopeRule::additive(
            "note",
            vec![RuleCondition::Always],
            "noted",
        )]);

        let decision = rules.classify(&AssetRecord::new("a1", "test"));

        assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
        assert_eq!(decision.justifications, vec!["noted", NO_MATCHING_RULE]);
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let mut disabled = ScopeRule::new("off", vec![RuleCondition::Always], ScopeVerdict::InScope)
            .with_priority(1);
        disabled.enabled = false;
        let rules = RuleSet::new(vec![
            disabled,
            ScopeRule::new("on", vec![RuleCondition::Always], ScopeVerdict::OutOfScope),
        ]);

        let decision = rules.classify(&AssetRecord::new("a1", "test"));

        assert_eq!(decision.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(decision.fired_rules, vec!["on"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let asset = AssetRecord::new("pos-01", "test").with_attribute("network_zone", "cardholder");
        let forward = RuleSet::new(vec![
            cardholder_zone_rule(),
            ScopeRule::additive("always", vec![RuleCondition::Always], "seen"),
        ]);
        let reversed = RuleSet::new(vec![
            ScopeRule::additive("always", vec![RuleCondition::Always], "seen"),
            cardholder_zone_rule(),
        ]);

        assert_eq!(forward.classify(&asset), forward.classify(&asset));
        assert_eq!(forward.classify(&asset), reversed.classify(&asset));
    }

    #[test]
    fn test_classify_does_not_mutate_asset() {
        let asset = AssetRecord::new("pos-01", "test").with_attribute("network_zone", "cardholder");
        let before = asset.clone();
        let _ = RuleSet::new(vec![cardholder_zone_rule()]).classify(&asset);
        assert_eq!(asset, before);
    }
}
