//! Remediation planning.

use crate::controls::{Control, ControlCatalog};
use sk_core::models::sort_default;
use sk_core::{ComplianceStatus, ControlMapping, RemediationItem, RemediationPriority};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of carrying lifecycle state from one run's items to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Planned items with lifecycle status carried over.
    pub items: Vec<RemediationItem>,
    /// Previous items with no planned counterpart.
    pub retired: Vec<RemediationItem>,
}

/// Proposes remediation items for control gaps.
#[derive(Debug, Clone)]
pub struct RemediationPlanner {
    catalog: Arc<ControlCatalog>,
}

impl RemediationPlanner {
    pub fn new(catalog: Arc<ControlCatalog>) -> Self {
        Self { catalog }
    }

    /// Priority for a gap on `control`.
    pub fn priority_for(control: &Control, status: ComplianceStatus) -> RemediationPriority {
        if control.advisory {
            return RemediationPriority::Low;
        }
        match (control.core_requirement, status) {
            (true, ComplianceStatus::NotMet) => RemediationPriority::Critical,
            (true, _) => RemediationPriority::High,
            (false, ComplianceStatus::NotMet) => RemediationPriority::High,
            (false, _) => RemediationPriority::Medium,
        }
    }

    /// One OPEN item per PARTIAL or NOT_MET mapping, in default order.
    pub fn plan(&self, mappings: &[ControlMapping]) -> Vec<RemediationItem> {
        let mut items: Vec<RemediationItem> = mappings
            .iter()
            .filter(|m| m.status.is_gap())
            .filter_map(|mapping| {
                let Some(control) = self.catalog.get(&mapping.control_id) else {
                    warn!(
                        asset_id = %mapping.asset_id,
                        control_id = %mapping.control_id,
                        "Mapping references a control missing from the catalog, skipping"
                    );
                    return None;
                };
                Some(RemediationItem::new(
                    &mapping.asset_id,
                    &mapping.control_id,
                    mapping.status,
                    control.remediation_action(),
                    Self::priority_for(control, mapping.status),
                ))
            })
            .collect();

        sort_default(&mut items);
        debug!(planned = items.len(), "Planned remediation items");
        items
    }

    /// Carries lifecycle status from `previous` into `planned`.
    ///
    /// Items are matched on (asset, control). A matched item keeps whatever
    /// status it had, RESOLVED included; only content is recomputed.
    pub fn reconcile(
        planned: Vec<RemediationItem>,
        previous: &[RemediationItem],
    ) -> Reconciliation {
        let mut previous_by_key: BTreeMap<(String, String), &RemediationItem> = previous
            .iter()
            .map(|i| ((i.asset_id.clone(), i.control_id.clone()), i))
            .collect();

        let items = planned
            .into_iter()
            .map(|mut item| {
                let key = (item.asset_id.clone(), item.control_id.clone());
                if let Some(prior) = previous_by_key.remove(&key) {
                    item.status = prior.status;
                }
                item
            })
            .collect();

        let retired = previous_by_key.into_values().cloned().collect();

        Reconciliation { items, retired }
    }
}
