//! Scope and mapping property tests.
//!
//! These tests exercise the public API end to end:
//! - Classification is deterministic and side-effect free
//! - Out-of-scope assets never map to controls
//! - Remediation items only exist for unmet or partial mappings
//! - Default remediation order never puts CRITICAL after LOW
//! - The graph projection reproduces the mapping set exactly

use sk_core::{
    AssetRecord, ComplianceStatus, EdgeKind, NodeKind, ProjectionBuilder, RemediationPriority,
    ScopeDecision, ScopeVerdict,
};
use sk_policy::{
    classify, default_catalog, map_controls, Control, ControlCatalog, LoadedCatalog,
    RemediationPlanner, RuleCondition, RuleSet, ScopeRuleBuilder,
};
use std::sync::Arc;

fn catalog() -> LoadedCatalog {
    default_catalog().unwrap()
}

fn inventory() -> Vec<AssetRecord> {
    vec![
        AssetRecord::new("pos-01", "inventory.json")
            .with_attribute("processes_chd", true)
            .with_attribute("transmits_chd", true)
            .with_attribute("stores_chd", false)
            .with_attribute("network_segment", "cde")
            .with_attribute("encryption_in_transit", true),
        AssetRecord::new("db-01", "inventory.json")
            .with_attribute("stores_chd", true)
            .with_attribute("processes_chd", false)
            .with_attribute("transmits_chd", false)
            .with_attribute("network_segment", "cde")
            .with_attribute("encryption_at_rest", true)
            .with_attribute("logging_enabled", true)
            .with_attribute("owner", "dba-team"),
        AssetRecord::new("hr-01", "inventory.json")
            .with_attribute("stores_chd", false)
            .with_attribute("processes_chd", false)
            .with_attribute("transmits_chd", false)
            .with_attribute("network_segment", "corp"),
        AssetRecord::new("printer-07", "inventory.json").with_attribute("network_segment", "corp"),
        AssetRecord::new("web-01", "inventory.json")
            .with_attribute("transmits_chd", "yes")
            .with_attribute("network_segment", "DMZ")
            .with_attribute("firewall_enabled", 1i64),
    ]
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_classify_is_deterministic() {
    let catalog = catalog();
    for asset in inventory() {
        let first = classify(&asset, &catalog.rules);
        let second = classify(&asset, &catalog.rules);
        assert_eq!(first, second, "decision for {} changed", asset.id);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

#[test]
fn test_default_catalog_verdicts() {
    let catalog = catalog();
    let verdicts: Vec<(String, ScopeVerdict)> = inventory()
        .iter()
        .map(|a| (a.id.clone(), classify(a, &catalog.rules).verdict))
        .collect();

    assert_eq!(
        verdicts,
        vec![
            ("pos-01".to_string(), ScopeVerdict::InScope),
            ("db-01".to_string(), ScopeVerdict::InScope),
            ("hr-01".to_string(), ScopeVerdict::OutOfScope),
            ("printer-07".to_string(), ScopeVerdict::Indeterminate),
            ("web-01".to_string(), ScopeVerdict::InScope),
        ]
    );
}

#[test]
fn test_default_catalog_reasons() {
    let catalog = catalog();
    let web = &inventory()[4];

    let decision = classify(web, &catalog.rules);

    assert_eq!(
        decision.fired_rules,
        vec!["transmits-chd", "segment-dmz", "cardholder-data-environment"]
    );
    assert_eq!(
        decision.justification(),
        "transmits CHD; in dmz segment; In scope"
    );
}

#[test]
fn test_missing_attributes_classify_indeterminate() {
    let catalog = catalog();
    let decision = classify(&AssetRecord::new("bare", "inventory.json"), &catalog.rules);

    assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
    assert!(decision.requires_review());
    assert_eq!(decision.justifications.last().map(String::as_str), Some("no matching rule"));
}

#[test]
fn test_cardholder_zone_scenario() {
    let rule = ScopeRuleBuilder::new("cardholder-zone")
        .description("cardholder zone implies in scope")
        .when(RuleCondition::equals("network_zone", "cardholder"))
        .then_in_scope()
        .priority(1)
        .build()
        .unwrap();
    let rules = RuleSet::new(vec![rule]);
    let asset = AssetRecord::new("pos-02", "inventory.json")
        .with_attribute("processes_card_data", true)
        .with_attribute("network_zone", "cardholder");

    let decision = classify(&asset, &rules);

    assert_eq!(decision.verdict, ScopeVerdict::InScope);
    assert_eq!(decision.fired_rules, vec!["cardholder-zone"]);
}

#[test]
fn test_no_matching_rule_scenario() {
    let rules = RuleSet::new(vec![ScopeRuleBuilder::new("cardholder-zone")
        .when(RuleCondition::equals("network_zone", "cardholder"))
        .then_in_scope()
        .priority(1)
        .build()
        .unwrap()]);
    let controls: ControlCatalog = vec![Control::new("REQ-01", "Firewall")
        .remediation("Apply firewall rules")]
    .into_iter()
    .collect();
    let asset = AssetRecord::new("hr-02", "inventory.json").with_attribute("processes_card_data", false);

    let decision = classify(&asset, &rules);

    assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
    assert!(map_controls(&asset, &decision, &controls).is_empty());

    let flagged: ControlCatalog = vec![Control::new("REQ-01", "Firewall")
        .including_indeterminate()
        .remediation("Apply firewall rules")]
    .into_iter()
    .collect();
    assert_eq!(map_controls(&asset, &decision, &flagged).len(), 1);
}

#[test]
fn test_default_catalog_maps_nothing_for_indeterminate() {
    let catalog = catalog();
    let asset = AssetRecord::new("hr-02", "inventory.json").with_attribute("processes_card_data", false);

    let decision = classify(&asset, &catalog.rules);

    assert_eq!(decision.verdict, ScopeVerdict::Indeterminate);
    let mappings = map_controls(&asset, &decision, &catalog.controls);
    assert!(mappings.is_empty(), "got {} mappings", mappings.len());
}

// =============================================================================
// Mapping and remediation
// =============================================================================

#[test]
fn test_out_of_scope_never_maps() {
    let catalog = catalog();
    for asset in inventory() {
        let forced = ScopeDecision::new(asset.id.clone(), ScopeVerdict::OutOfScope);
        assert!(map_controls(&asset, &forced, &catalog.controls).is_empty());
    }
}

#[test]
fn test_remediation_references_gaps_only() {
    let catalog = catalog();
    let planner = RemediationPlanner::new(Arc::new(catalog.controls.clone()));

    let mut mappings = Vec::new();
    for asset in inventory() {
        let decision = classify(&asset, &catalog.rules);
        mappings.extend(map_controls(&asset, &decision, &catalog.controls));
    }
    let items = planner.plan(&mappings);

    assert!(!items.is_empty());
    for item in &items {
        let mapping = mappings
            .iter()
            .find(|m| m.asset_id == item.asset_id && m.control_id == item.control_id)
            .unwrap();
        assert!(
            !matches!(
                mapping.status,
                ComplianceStatus::Met | ComplianceStatus::NotApplicable
            ),
            "{} planned for a satisfied mapping",
            item.id
        );
        assert_eq!(item.mapping_status, mapping.status);
    }
}

#[test]
fn test_critical_never_follows_low() {
    let catalog = catalog();
    let planner = RemediationPlanner::new(Arc::new(catalog.controls.clone()));

    let mut mappings = Vec::new();
    for asset in inventory() {
        let decision = classify(&asset, &catalog.rules);
        mappings.extend(map_controls(&asset, &decision, &catalog.controls));
    }
    let items = planner.plan(&mappings);

    let first_low = items
        .iter()
        .position(|i| i.priority == RemediationPriority::Low);
    let last_critical = items
        .iter()
        .rposition(|i| i.priority == RemediationPriority::Critical);
    if let (Some(low), Some(critical)) = (first_low, last_critical) {
        assert!(critical < low);
    }
    assert!(items.windows(2).all(|w| w[0].priority >= w[1].priority));
}

#[test]
fn test_missing_encryption_is_critical() {
    let controls: ControlCatalog = vec![Control::new("encrypt-stored-data", "Encrypt stored data")
        .core()
        .evidence(RuleCondition::is_true("encryption_at_rest"))
        .remediation("Enable DB/disk encryption with KMS.")]
    .into_iter()
    .collect();
    let asset = AssetRecord::new("db-09", "inventory.json").with_attribute("stores_chd", true);
    let decision = ScopeDecision::new("db-09", ScopeVerdict::InScope);

    let mappings = map_controls(&asset, &decision, &controls);
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].status, ComplianceStatus::NotMet);

    let items = RemediationPlanner::new(Arc::new(controls)).plan(&mappings);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].priority, RemediationPriority::Critical);
    assert_eq!(items[0].id, "db-09::encrypt-stored-data");
}

// =============================================================================
// Projection
// =============================================================================

#[test]
fn test_projection_round_trips_mappings() {
    let catalog = catalog();
    let planner = RemediationPlanner::new(Arc::new(catalog.controls.clone()));
    let assets = inventory();

    let decisions: Vec<ScopeDecision> = assets
        .iter()
        .map(|a| classify(a, &catalog.rules))
        .collect();
    let mut mappings = Vec::new();
    for (asset, decision) in assets.iter().zip(&decisions) {
        mappings.extend(map_controls(asset, decision, &catalog.controls));
    }
    let items = planner.plan(&mappings);

    let projection = ProjectionBuilder::new()
        .with_controls(catalog.controls.node_info())
        .build(&assets, &decisions, &mappings, &items)
        .unwrap();

    let mut expected = mappings.clone();
    expected.sort();
    assert_eq!(projection.mappings(), expected);
    assert!(projection.is_closed());
    assert_eq!(projection.nodes_of_kind(NodeKind::Asset).count(), assets.len());
    assert_eq!(
        projection.edges_of_kind(EdgeKind::HasScope).count(),
        assets.len()
    );
    assert_eq!(
        projection
            .edges_of_kind(EdgeKind::RequiresRemediation)
            .count(),
        items.len()
    );
}
