//! Scope rule definitions.
//!
//! This module defines the structure and evaluation logic for scope rules and
//! the attribute predicates shared with the control catalog.

use serde::{Deserialize, Serialize};
use sk_core::{AssetRecord, AttributeValue, ScopeVerdict};

/// Default rule priority when none is given.
pub const DEFAULT_PRIORITY: u32 = 100;

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

fn default_true() -> bool {
    true
}

/// A scope rule that can be evaluated against an asset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Unique identifier for this rule.
    pub id: String,
    /// Description of what this rule does.
    #[serde(default)]
    pub description: Option<String>,
    /// Conditions that must all be true for this rule to match.
    pub conditions: Vec<RuleCondition>,
    /// Verdict contributed when the rule matches. Ignored for additive rules.
    #[serde(default)]
    pub verdict: Option<ScopeVerdict>,
    /// Justification line recorded when the rule fires.
    #[serde(default)]
    pub justification: Option<String>,
    /// Priority (lower = evaluated first).
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Additive rules only append their justification.
    #[serde(default)]
    pub additive: bool,
    /// Whether this rule is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ScopeRule {
    /// Creates a new rule that decides `verdict`.
    pub fn new(id: &str, conditions: Vec<RuleCondition>, verdict: ScopeVerdict) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            conditions,
            verdict: Some(verdict),
            justification: None,
            priority: DEFAULT_PRIORITY,
            additive: false,
            enabled: true,
        }
    }

    /// Creates a new additive rule that only contributes a justification.
    pub fn additive(id: &str, conditions: Vec<RuleCondition>, justification: &str) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            conditions,
            verdict: None,
            justification: Some(justification.to_string()),
            priority: DEFAULT_PRIORITY,
            additive: true,
            enabled: true,
        }
    }

    /// Sets the rule priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the justification line.
    pub fn with_justification(mut self, justification: &str) -> Self {
        self.justification = Some(justification.to_string());
        self
    }

    /// Checks if this rule matches the given asset.
    pub fn matches(&self, asset: &AssetRecord) -> bool {
        if !self.enabled {
            return false;
        }
        self.conditions.iter().all(|c| c.evaluate(asset))
    }

    /// Justification line for this rule.
    pub fn justification_text(&self) -> String {
        self.justification
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| format!("rule '{}' matched", self.id))
    }

    /// Checks well-formedness: non-empty id, at least one valid condition, and
    /// a verdict unless the rule is additive.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if self.conditions.is_empty() {
            return Err(format!("rule '{}' has no conditions", self.id));
        }
        for condition in &self.conditions {
            condition
                .validate()
                .map_err(|e| format!("rule '{}': {}", self.id, e))?;
        }
        if !self.additive && self.verdict.is_none() {
            return Err(format!(
                "rule '{}' is not additive and declares no verdict",
                self.id
            ));
        }
        Ok(())
    }
}

/// Predicates over asset attributes.
///
/// A missing attribute makes every attribute predicate false, except
/// `absent` and `not_equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// Attribute must equal value.
    Equals {
        attribute: String,
        value: AttributeValue,
    },
    /// Attribute must be missing or differ from value.
    NotEquals {
        attribute: String,
        value: AttributeValue,
    },
    /// Attribute text must be one of the values (case-insensitive).
    OneOf {
        attribute: String,
        values: Vec<String>,
    },
    /// Attribute must be a true flag.
    IsTrue(String),
    /// Attribute must be a false flag.
    IsFalse(String),
    /// Attribute must be present.
    Present(String),
    /// Attribute must be missing.
    Absent(String),
    /// Attribute text form must match the regex.
    Matches { attribute: String, pattern: String },
    /// Attribute must be numeric and above threshold.
    Above { attribute: String, threshold: f64 },
    /// Attribute must be numeric and below threshold.
    Below { attribute: String, threshold: f64 },
    /// All sub-conditions must match.
    And(Vec<RuleCondition>),
    /// Any sub-condition must match.
    Or(Vec<RuleCondition>),
    /// Sub-condition must NOT match.
    Not(Box<RuleCondition>),
    /// Always true.
    Always,
    /// Always false.
    Never,
}

impl RuleCondition {
    /// Shorthand for `is_true`.
    pub fn is_true(attribute: &str) -> Self {
        RuleCondition::IsTrue(attribute.to_string())
    }

    /// Shorthand for `is_false`.
    pub fn is_false(attribute: &str) -> Self {
        RuleCondition::IsFalse(attribute.to_string())
    }

    /// Shorthand for `equals`.
    pub fn equals(attribute: &str, value: impl Into<AttributeValue>) -> Self {
        RuleCondition::Equals {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    /// Shorthand for `one_of`.
    pub fn one_of(attribute: &str, values: &[&str]) -> Self {
        RuleCondition::OneOf {
            attribute: attribute.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Evaluates this condition against the given asset.
    pub fn evaluate(&self, asset: &AssetRecord) -> bool {
        match self {
            RuleCondition::Equals { attribute, value } => asset
                .attribute(attribute)
                .map(|v| v.loosely_equals(value))
                .unwrap_or(false),

            RuleCondition::NotEquals { attribute, value } => asset
                .attribute(attribute)
                .map(|v| !v.loosely_equals(value))
                .unwrap_or(true),

            RuleCondition::OneOf { attribute, values } => {
                if let Some(value) = asset.attribute(attribute) {
                    let text = value.to_string().to_lowercase();
                    values.iter().any(|v| v.to_lowercase() == text)
                } else {
                    false
                }
            }

            RuleCondition::IsTrue(attribute) => asset.flag(attribute) == Some(true),

            RuleCondition::IsFalse(attribute) => asset.flag(attribute) == Some(false),

            RuleCondition::Present(attribute) => asset.attribute(attribute).is_some(),

            RuleCondition::Absent(attribute) => asset.attribute(attribute).is_none(),

            RuleCondition::Matches { attribute, pattern } => {
                match (asset.attribute(attribute), regex::Regex::new(pattern)) {
                    (Some(value), Ok(re)) => re.is_match(&value.to_string()),
                    _ => false,
                }
            }

            RuleCondition::Above {
                attribute,
                threshold,
            } => asset
                .attribute(attribute)
                .and_then(AttributeValue::as_f64)
                .map(|v| v > *threshold)
                .unwrap_or(false),

            RuleCondition::Below {
                attribute,
                threshold,
            } => asset
                .attribute(attribute)
                .and_then(AttributeValue::as_f64)
                .map(|v| v < *threshold)
                .unwrap_or(false),

            RuleCondition::And(conditions) => conditions.iter().all(|c| c.evaluate(asset)),

            RuleCondition::Or(conditions) => conditions.iter().any(|c| c.evaluate(asset)),

            RuleCondition::Not(condition) => !condition.evaluate(asset),

            RuleCondition::Always => true,

            RuleCondition::Never => false,
        }
    }

    /// Checks that the predicate is syntactically valid.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RuleCondition::Equals { attribute, .. }
            | RuleCondition::NotEquals { attribute, .. }
            | RuleCondition::IsTrue(attribute)
            | RuleCondition::IsFalse(attribute)
            | RuleCondition::Present(attribute)
            | RuleCondition::Absent(attribute) => check_attribute(attribute),

            RuleCondition::OneOf { attribute, values } => {
                check_attribute(attribute)?;
                if values.is_empty() {
                    return Err(format!("one_of on '{}' lists no values", attribute));
                }
                Ok(())
            }

            RuleCondition::Matches { attribute, pattern } => {
                check_attribute(attribute)?;
                regex::Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| format!("invalid regex pattern '{}': {}", pattern, e))
            }

            RuleCondition::Above {
                attribute,
                threshold,
            }
            | RuleCondition::Below {
                attribute,
                threshold,
            } => {
                check_attribute(attribute)?;
                if !threshold.is_finite() {
                    return Err(format!("threshold on '{}' is not a finite number", attribute));
                }
                Ok(())
            }

            RuleCondition::And(conditions) | RuleCondition::Or(conditions) => {
                if conditions.is_empty() {
                    return Err("composite condition has no sub-conditions".to_string());
                }
                conditions.iter().try_for_each(RuleCondition::validate)
            }

            RuleCondition::Not(condition) => condition.validate(),

            RuleCondition::Always | RuleCondition::Never => Ok(()),
        }
    }
}

fn check_attribute(attribute: &str) -> Result<(), String> {
    if attribute.trim().is_empty() {
        Err("condition names an empty attribute".to_string())
    } else {
        Ok(())
    }
}

/// Builder for creating scope rules.
pub struct ScopeRuleBuilder {
    id: String,
    description: Option<String>,
    conditions: Vec<RuleCondition>,
    verdict: Option<ScopeVerdict>,
    justification: Option<String>,
    priority: u32,
    additive: bool,
    enabled: bool,
}

impl ScopeRuleBuilder {
    /// Creates a new rule builder with the given id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            conditions: vec![],
            verdict: None,
            justification: None,
            priority: DEFAULT_PRIORITY,
            additive: false,
            enabled: true,
        }
    }

    /// Sets the rule description.
    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Adds a condition.
    pub fn when(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds multiple conditions (all must match).
    pub fn when_all(mut self, conditions: Vec<RuleCondition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Sets the verdict to IN_SCOPE.
    pub fn then_in_scope(mut self) -> Self {
        self.verdict = Some(ScopeVerdict::InScope);
        self
    }

    /// Sets the verdict to OUT_OF_SCOPE.
    pub fn then_out_of_scope(mut self) -> Self {
        self.verdict = Some(ScopeVerdict::OutOfScope);
        self
    }

    /// Marks the rule additive.
    pub fn additive(mut self) -> Self {
        self.additive = true;
        self
    }

    /// Sets the justification line.
    pub fn justification(mut self, text: &str) -> Self {
        self.justification = Some(text.to_string());
        self
    }

    /// Sets the rule priority.
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether the rule is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds and validates the scope rule.
    pub fn build(self) -> Result<ScopeRule, String> {
        let rule = ScopeRule {
            id: self.id,
            description: self.description,
            conditions: self.conditions,
            verdict: self.verdict,
            justification: self.justification,
            priority: self.priority,
            additive: self.additive,
            enabled: self.enabled,
        };
        rule.validate()?;
        Ok(rule)
    }
}
