//! Scope decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Justification recorded when no rule settles the verdict.
pub const NO_MATCHING_RULE: &str = "no matching rule";

/// PCI DSS scope verdict for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeVerdict {
    InScope,
    OutOfScope,
    /// No rule settled the verdict; needs human review.
    Indeterminate,
}

impl fmt::Display for ScopeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeVerdict::InScope => write!(f, "IN_SCOPE"),
            ScopeVerdict::OutOfScope => write!(f, "OUT_OF_SCOPE"),
            ScopeVerdict::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

/// Outcome of classifying one asset.
///
/// A decision is a plain value: classifying the same record against the same
/// rules always produces an equal decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDecision {
    /// Asset the decision applies to.
    pub asset_id: String,
    /// Final verdict.
    pub verdict: ScopeVerdict,
    /// Ids of the rules that fired, in evaluation order.
    pub fired_rules: Vec<String>,
    /// Justification lines, in evaluation order.
    pub justifications: Vec<String>,
}

impl ScopeDecision {
    /// Creates a decision with no fired rules.
    pub fn new(asset_id: impl Into<String>, verdict: ScopeVerdict) -> Self {
        Self {
            asset_id: asset_id.into(),
            verdict,
            fired_rules: Vec::new(),
            justifications: Vec::new(),
        }
    }

    /// The justification lines joined into one sentence-like string.
    pub fn justification(&self) -> String {
        self.justifications.join("; ")
    }

    pub fn is_in_scope(&self) -> bool {
        self.verdict == ScopeVerdict::InScope
    }

    pub fn is_out_of_scope(&self) -> bool {
        self.verdict == ScopeVerdict::OutOfScope
    }

    /// Indeterminate verdicts are surfaced for human review.
    pub fn requires_review(&self) -> bool {
        self.verdict == ScopeVerdict::Indeterminate
    }
}

/// A decision as it was recorded in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Compliance run that produced the decision.
    pub run_id: Uuid,
    /// When the decision was recorded.
    pub decided_at: DateTime<Utc>,
    pub decision: ScopeDecision,
}

impl DecisionRecord {
    pub fn new(run_id: Uuid, decision: ScopeDecision) -> Self {
        Self {
            run_id,
            decided_at: Utc::now(),
            decision,
        }
    }
}

/// A verdict change between two runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChange {
    pub asset_id: String,
    pub from: ScopeVerdict,
    pub to: ScopeVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_string(&ScopeVerdict::OutOfScope).unwrap();
        assert_eq!(json, "\"OUT_OF_SCOPE\"");

        let verdict: ScopeVerdict = serde_json::from_str("\"INDETERMINATE\"").unwrap();
        assert_eq!(verdict, ScopeVerdict::Indeterminate);
        assert_eq!(verdict.to_string(), "INDETERMINATE");
    }

    #[test]
    fn test_justification_join() {
        let mut decision = ScopeDecision::new("pos-01", ScopeVerdict::InScope);
        decision.justifications.push("stores CHD".to_string());
        decision.justifications.push("in cde segment".to_string());

        assert_eq!(decision.justification(), "stores CHD; in cde segment");
        assert!(decision.is_in_scope());
        assert!(!decision.requires_review());
    }
}
