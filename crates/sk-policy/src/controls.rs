//! Control catalog and evidence assessment.

use crate::rules::RuleCondition;
use serde::{Deserialize, Serialize};
use sk_core::models::ID_SEPARATOR;
use sk_core::{AssetRecord, ComplianceStatus, ControlNodeInfo, RemediationItem, ScopeVerdict};
use std::collections::BTreeMap;

/// A PCI DSS control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Requirement identifier, e.g. `REQ-03`.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// All conditions must match for the control to apply. Empty means always.
    #[serde(default)]
    pub applies_when: Vec<RuleCondition>,
    /// Evidence checks; each satisfied check counts toward MET.
    #[serde(default)]
    pub evidence: Vec<RuleCondition>,
    /// Any matching condition makes the control NOT_APPLICABLE.
    #[serde(default)]
    pub not_applicable_when: Vec<RuleCondition>,
    #[serde(default)]
    pub core_requirement: bool,
    #[serde(default)]
    pub advisory: bool,
    /// Whether INDETERMINATE assets are mapped to this control. Off unless the
    /// catalog flags the control.
    #[serde(default)]
    pub include_indeterminate: bool,
    /// Recommended remediation action.
    #[serde(default)]
    pub remediation: String,
}

impl Control {
    /// Creates a control that applies to every in-scope asset.
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            applies_when: Vec::new(),
            evidence: Vec::new(),
            not_applicable_when: Vec::new(),
            core_requirement: false,
            advisory: false,
            include_indeterminate: false,
            remediation: String::new(),
        }
    }

    pub fn applies_when(mut self, condition: RuleCondition) -> Self {
        self.applies_when.push(condition);
        self
    }

    pub fn evidence(mut self, condition: RuleCondition) -> Self {
        self.evidence.push(condition);
        self
    }

    pub fn not_applicable_when(mut self, condition: RuleCondition) -> Self {
        self.not_applicable_when.push(condition);
        self
    }

    pub fn core(mut self) -> Self {
        self.core_requirement = true;
        self
    }

    pub fn advisory(mut self) -> Self {
        self.advisory = true;
        self
    }

    pub fn including_indeterminate(mut self) -> Self {
        self.include_indeterminate = true;
        self
    }

    pub fn remediation(mut self, action: &str) -> Self {
        self.remediation = action.to_string();
        self
    }

    /// Whether the control covers `asset` under `verdict`.
    pub fn applies_to(&self, asset: &AssetRecord, verdict: ScopeVerdict) -> bool {
        match verdict {
            ScopeVerdict::OutOfScope => false,
            ScopeVerdict::Indeterminate if !self.include_indeterminate => false,
            _ => self.applies_when.iter().all(|c| c.evaluate(asset)),
        }
    }

    /// Remediation text, falling back to a generic review action.
    pub fn remediation_action(&self) -> String {
        if self.remediation.trim().is_empty() {
            format!("Review control {} ({})", self.id, self.title)
        } else {
            self.remediation.clone()
        }
    }

    /// Checks well-formedness of the control definition.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("control id must not be empty".to_string());
        }
        if !RemediationItem::is_valid_key(&self.id) {
            return Err(format!(
                "control id '{}' contains the reserved separator '{}'",
                self.id, ID_SEPARATOR
            ));
        }
        if self.title.trim().is_empty() {
            return Err(format!("control '{}' has no title", self.id));
        }
        if !self.advisory && self.remediation.trim().is_empty() {
            return Err(format!(
                "control '{}' declares no remediation action",
                self.id
            ));
        }
        self.applies_when
            .iter()
            .chain(&self.evidence)
            .chain(&self.not_applicable_when)
            .try_for_each(RuleCondition::validate)
            .map_err(|e| format!("control '{}': {}", self.id, e))
    }

    pub fn node_info(&self) -> ControlNodeInfo {
        ControlNodeInfo {
            title: self.title.clone(),
            description: self.description.clone(),
            core_requirement: self.core_requirement,
            advisory: self.advisory,
        }
    }
}

/// Controls keyed by id. Iteration is in id order.
#[derive(Debug, Clone, Default)]
pub struct ControlCatalog {
    controls: BTreeMap<String, Control>,
}

impl ControlCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a control, returning the one it replaced.
    pub fn insert(&mut self, control: Control) -> Option<Control> {
        self.controls.insert(control.id.clone(), control)
    }

    pub fn get(&self, id: &str) -> Option<&Control> {
        self.controls.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.controls.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.values()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Metadata for control nodes in the graph projection.
    pub fn node_info(&self) -> BTreeMap<String, ControlNodeInfo> {
        self.controls
            .iter()
            .map(|(id, c)| (id.clone(), c.node_info()))
            .collect()
    }
}

impl FromIterator<Control> for ControlCatalog {
    fn from_iter<T: IntoIterator<Item = Control>>(iter: T) -> Self {
        let mut catalog = ControlCatalog::new();
        for control in iter {
            catalog.insert(control);
        }
        catalog
    }
}

/// Derives the compliance status of an applicable control for an asset.
pub trait EvidencePolicy: Send + Sync {
    fn assess(&self, asset: &AssetRecord, control: &Control) -> ComplianceStatus;
}

/// Assesses controls from their catalog-declared evidence checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogEvidencePolicy;

impl EvidencePolicy for CatalogEvidencePolicy {
    fn assess(&self, asset: &AssetRecord, control: &Control) -> ComplianceStatus {
        if control.not_applicable_when.iter().any(|c| c.evaluate(asset)) {
            return ComplianceStatus::NotApplicable;
        }

        let satisfied = control.evidence.iter().filter(|c| c.evaluate(asset)).count();
        if control.evidence.is_empty() || satisfied == 0 {
            ComplianceStatus::NotMet
        } else if satisfied == control.evidence.len() {
            ComplianceStatus::Met
        } else {
            ComplianceStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls_control() -> Control {
        Control::new("REQ-02", "Encrypt transmission")
            .evidence(RuleCondition::is_true("tls_enforced"))
            .evidence(RuleCondition::is_true("weak_ciphers_disabled"))
            .not_applicable_when(RuleCondition::is_false("transmits_chd"))
            .remediation("Enable TLS 1.2+; enforce HTTPS; disable weak ciphers.")
    }

    #[test]
    fn test_evidence_levels() {
        let policy = CatalogEvidencePolicy;
        let control = tls_control();

        let none = AssetRecord::new("a1", "test");
        assert_eq!(policy.assess(&none, &control), ComplianceStatus::NotMet);

        let some = none.clone().with_attribute("tls_enforced", true);
        assert_eq!(policy.assess(&some, &control), ComplianceStatus::Partial);

        let all = some.clone().with_attribute("weak_ciphers_disabled", "yes");
        assert_eq!(policy.assess(&all, &control), ComplianceStatus::Met);

        let not_applicable = all.with_attribute("transmits_chd", false);
        assert_eq!(
            policy.assess(&not_applicable, &control),
            ComplianceStatus::NotApplicable
        );
    }

    #[test]
    fn test_no_evidence_checks_is_not_met() {
        let control = Control::new("REQ-99", "Unverifiable").remediation("Review");
        let asset = AssetRecord::new("a1", "test");
        assert_eq!(
            CatalogEvidencePolicy.assess(&asset, &control),
            ComplianceStatus::NotMet
        );
    }

    #[test]
    fn test_applicability() {
        let control = tls_control().applies_when(RuleCondition::is_true("transmits_chd"));
        let asset = AssetRecord::new("a1", "test").with_attribute("transmits_chd", true);

        assert!(control.applies_to(&asset, ScopeVerdict::InScope));
        assert!(!control.applies_to(&asset, ScopeVerdict::Indeterminate));
        assert!(!control.applies_to(&asset, ScopeVerdict::OutOfScope));
        assert!(control
            .clone()
            .including_indeterminate()
            .applies_to(&asset, ScopeVerdict::Indeterminate));
        assert!(!control.applies_to(&AssetRecord::new("a2", "test"), ScopeVerdict::InScope));
    }

    #[test]
    fn test_control_validation() {
        assert!(tls_control().validate().is_ok());
        assert!(Control::new("REQ-05", "No action").validate().is_err());
        assert!(Control::new("ADV-01", "Advisory").advisory().validate().is_ok());
        assert!(Control::new("", "Nameless").remediation("x").validate().is_err());
        assert!(Control::new("REQ::01", "Ambiguous")
            .remediation("x")
            .validate()
            .is_err());
        assert!(tls_control()
            .evidence(RuleCondition::Or(vec![]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_remediation_fallback() {
        let control = Control::new("ADV-01", "Asset ownership").advisory();
        assert_eq!(
            control.remediation_action(),
            "Review control ADV-01 (Asset ownership)"
        );
    }

    #[test]
    fn test_catalog_iterates_in_id_order() {
        let catalog: ControlCatalog = vec![
            Control::new("REQ-04", "Logging"),
            Control::new("REQ-01", "Firewall"),
            Control::new("REQ-03", "Encryption").core(),
        ]
        .into_iter()
        .collect();

        let ids: Vec<&str> = catalog.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["REQ-01", "REQ-03", "REQ-04"]);
        assert!(catalog.node_info()["REQ-03"].core_requirement);
    }
}
