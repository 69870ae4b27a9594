//! Control mapping.

use crate::controls::{CatalogEvidencePolicy, ControlCatalog, EvidencePolicy};
use sk_core::{AssetRecord, ControlMapping, ScopeDecision, ScopeVerdict};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps scoped assets to the controls that apply to them.
#[derive(Clone)]
pub struct ControlMapper {
    catalog: Arc<ControlCatalog>,
    policy: Arc<dyn EvidencePolicy>,
}

impl ControlMapper {
    /// Creates a mapper using the catalog's declared evidence checks.
    pub fn new(catalog: Arc<ControlCatalog>) -> Self {
        Self {
            catalog,
            policy: Arc::new(CatalogEvidencePolicy),
        }
    }

    /// Replaces the evidence policy.
    pub fn with_evidence_policy(mut self, policy: Arc<dyn EvidencePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &ControlCatalog {
        &self.catalog
    }

    /// Computes the full mapping set for one asset, in control id order.
    ///
    /// The result replaces whatever was mapped before.
    pub fn map_controls(&self, asset: &AssetRecord, decision: &ScopeDecision) -> Vec<ControlMapping> {
        if decision.asset_id != asset.id {
            warn!(
                asset_id = %asset.id,
                decision_asset_id = %decision.asset_id,
                "Scope decision belongs to a different asset, mapping nothing"
            );
            return Vec::new();
        }
        if decision.verdict == ScopeVerdict::OutOfScope {
            return Vec::new();
        }

        let mappings: Vec<ControlMapping> = self
            .catalog
            .iter()
            .filter(|control| control.applies_to(asset, decision.verdict))
            .map(|control| {
                let status = self.policy.assess(asset, control);
                ControlMapping::new(asset.id.clone(), control.id.clone(), status)
            })
            .collect();

        debug!(
            asset_id = %asset.id,
            verdict = %decision.verdict,
            mapped = mappings.len(),
            "Mapped controls"
        );
        mappings
    }
}

impl std::fmt::Debug for ControlMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlMapper")
            .field("controls", &self.catalog.len())
            .finish()
    }
}

/// Maps `asset` against `catalog` with the catalog evidence policy.
pub fn map_controls(
    asset: &AssetRecord,
    decision: &ScopeDecision,
    catalog: &ControlCatalog,
) -> Vec<ControlMapping> {
    ControlMapper::new(Arc::new(catalog.clone())).map_controls(asset, decision)
}
