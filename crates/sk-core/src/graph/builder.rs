//! Projection builder.

use super::{Edge, EdgeKind, GraphProjection, Node, NodeKind, Properties};
use crate::models::{
    AssetRecord, ComplianceStatus, ControlMapping, RemediationItem, ScopeDecision, ScopeVerdict,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Structural errors that abort a projection build.
///
/// A failed build never yields a partial projection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Dangling reference on {edge} edge {from} -> {to}: node {missing} does not exist")]
    DanglingReference {
        edge: EdgeKind,
        from: String,
        to: String,
        missing: String,
    },

    #[error("Duplicate asset record: {0}")]
    DuplicateAsset(String),

    #[error("Asset id {0} contains the reserved separator '::'")]
    ReservedAssetId(String),

    #[error("Asset {0} has no current scope decision")]
    MissingDecision(String),

    #[error("Asset {0} has more than one current scope decision")]
    DuplicateDecision(String),

    #[error("Asset {asset_id} is mapped to control {control_id} more than once")]
    DuplicateMapping {
        asset_id: String,
        control_id: String,
    },

    #[error("Out-of-scope asset {asset_id} is mapped to control {control_id}")]
    OutOfScopeMapping {
        asset_id: String,
        control_id: String,
    },

    #[error(
        "Remediation {remediation_id} has no control mapping for asset {asset_id} and control {control_id}"
    )]
    OrphanRemediation {
        remediation_id: String,
        asset_id: String,
        control_id: String,
    },

    #[error("Duplicate remediation item: {0}")]
    DuplicateRemediation(String),

    #[error("Remediation {remediation_id} references a {status} mapping")]
    RemediationForSatisfiedMapping {
        remediation_id: String,
        status: ComplianceStatus,
    },
}

impl ProjectionError {
    pub fn is_dangling_reference(&self) -> bool {
        matches!(self, ProjectionError::DanglingReference { .. })
    }
}

/// Descriptive data for control nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlNodeInfo {
    pub title: String,
    pub description: String,
    pub core_requirement: bool,
    pub advisory: bool,
}

/// Builds a [`GraphProjection`] from the outputs of one run.
///
/// Without control metadata, control nodes are created for every control id
/// the mappings mention. With metadata, only catalogued controls get nodes and
/// a mapping to anything else is a dangling reference.
#[derive(Debug, Clone, Default)]
pub struct ProjectionBuilder {
    controls: Option<BTreeMap<String, ControlNodeInfo>>,
}

impl ProjectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enriches control nodes from catalog metadata.
    pub fn with_controls(mut self, controls: BTreeMap<String, ControlNodeInfo>) -> Self {
        self.controls = Some(controls);
        self
    }

    /// Builds the projection: nodes first, then edges.
    pub fn build(
        &self,
        assets: &[AssetRecord],
        decisions: &[ScopeDecision],
        mappings: &[ControlMapping],
        remediations: &[RemediationItem],
    ) -> Result<GraphProjection, ProjectionError> {
        let mut projection = GraphProjection::default();

        // Assets
        for asset in assets {
            if !RemediationItem::is_valid_key(&asset.id) {
                return Err(ProjectionError::ReservedAssetId(asset.id.clone()));
            }
            let id = NodeKind::Asset.node_id(&asset.id);
            if projection.contains_node(&id) {
                return Err(ProjectionError::DuplicateAsset(asset.id.clone()));
            }
            projection.insert_node(asset_node(id, asset));
        }

        // Scope decisions
        let mut verdicts: BTreeMap<&str, ScopeVerdict> = BTreeMap::new();
        for decision in decisions {
            if verdicts
                .insert(decision.asset_id.as_str(), decision.verdict)
                .is_some()
            {
                return Err(ProjectionError::DuplicateDecision(decision.asset_id.clone()));
            }
            projection.insert_node(decision_node(decision));
        }

        // Controls
        let mapped_controls: BTreeSet<&str> =
            mappings.iter().map(|m| m.control_id.as_str()).collect();
        for control_id in mapped_controls {
            match &self.controls {
                Some(catalog) => {
                    if let Some(info) = catalog.get(control_id) {
                        projection.insert_node(control_node(control_id, Some(info)));
                    }
                }
                None => projection.insert_node(control_node(control_id, None)),
            }
        }

        // Remediation items
        for item in remediations {
            let node = remediation_node(item);
            if projection.contains_node(&node.id) {
                return Err(ProjectionError::DuplicateRemediation(item.id.clone()));
            }
            projection.insert_node(node);
        }

        // HAS_SCOPE
        for asset in assets {
            if !verdicts.contains_key(asset.id.as_str()) {
                return Err(ProjectionError::MissingDecision(asset.id.clone()));
            }
        }
        for decision in decisions {
            let from = NodeKind::Asset.node_id(&decision.asset_id);
            let to = NodeKind::ScopeDecision.node_id(&decision.asset_id);
            link(&mut projection, EdgeKind::HasScope, from, to, Properties::new())?;
        }

        // MAPPED_TO
        let mut mapped: BTreeMap<(&str, &str), ComplianceStatus> = BTreeMap::new();
        for mapping in mappings {
            let key = (mapping.asset_id.as_str(), mapping.control_id.as_str());
            if mapped.insert(key, mapping.status).is_some() {
                return Err(ProjectionError::DuplicateMapping {
                    asset_id: mapping.asset_id.clone(),
                    control_id: mapping.control_id.clone(),
                });
            }
            if verdicts.get(mapping.asset_id.as_str()) == Some(&ScopeVerdict::OutOfScope) {
                return Err(ProjectionError::OutOfScopeMapping {
                    asset_id: mapping.asset_id.clone(),
                    control_id: mapping.control_id.clone(),
                });
            }

            let from = NodeKind::Asset.node_id(&mapping.asset_id);
            let to = NodeKind::Control.node_id(&mapping.control_id);
            let mut properties = Properties::new();
            properties.insert("status".to_string(), json!(mapping.status));
            link(&mut projection, EdgeKind::MappedTo, from, to, properties)?;
        }

        // REQUIRES_REMEDIATION
        for item in remediations {
            let key = (item.asset_id.as_str(), item.control_id.as_str());
            match mapped.get(&key) {
                None => {
                    return Err(ProjectionError::OrphanRemediation {
                        remediation_id: item.id.clone(),
                        asset_id: item.asset_id.clone(),
                        control_id: item.control_id.clone(),
                    })
                }
                Some(status) if !status.is_gap() => {
                    return Err(ProjectionError::RemediationForSatisfiedMapping {
                        remediation_id: item.id.clone(),
                        status: *status,
                    })
                }
                Some(_) => {}
            }

            let from = NodeKind::Control.node_id(&item.control_id);
            let to = NodeKind::Remediation.node_id(&item.id);
            let mut properties = Properties::new();
            properties.insert("asset_id".to_string(), json!(item.asset_id));
            link(&mut projection, EdgeKind::RequiresRemediation, from, to, properties)?;
        }

        projection.finish();
        debug!(
            nodes = projection.node_count(),
            edges = projection.edge_count(),
            "Built graph projection"
        );
        Ok(projection)
    }
}

fn link(
    projection: &mut GraphProjection,
    kind: EdgeKind,
    from: String,
    to: String,
    properties: Properties,
) -> Result<(), ProjectionError> {
    for endpoint in [&from, &to] {
        if !projection.contains_node(endpoint) {
            return Err(ProjectionError::DanglingReference {
                edge: kind,
                from: from.clone(),
                to: to.clone(),
                missing: endpoint.clone(),
            });
        }
    }
    projection.push_edge(Edge {
        kind,
        from,
        to,
        properties,
    });
    Ok(())
}

fn asset_node(id: String, asset: &AssetRecord) -> Node {
    let attributes: serde_json::Map<String, serde_json::Value> = asset
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    let mut properties = Properties::new();
    properties.insert("asset_id".to_string(), json!(asset.id));
    properties.insert("name".to_string(), json!(asset.display_name()));
    properties.insert("origin".to_string(), json!(asset.source.origin));
    properties.insert(
        "ingested_at".to_string(),
        json!(asset.source.ingested_at.to_rfc3339()),
    );
    properties.insert(
        "attributes".to_string(),
        serde_json::Value::Object(attributes),
    );

    Node {
        id,
        kind: NodeKind::Asset,
        key: asset.id.clone(),
        properties,
    }
}

fn decision_node(decision: &ScopeDecision) -> Node {
    let mut properties = Properties::new();
    properties.insert("asset_id".to_string(), json!(decision.asset_id));
    properties.insert("verdict".to_string(), json!(decision.verdict));
    properties.insert("fired_rules".to_string(), json!(decision.fired_rules));
    properties.insert("justification".to_string(), json!(decision.justification()));

    Node {
        id: NodeKind::ScopeDecision.node_id(&decision.asset_id),
        kind: NodeKind::ScopeDecision,
        key: decision.asset_id.clone(),
        properties,
    }
}

fn control_node(control_id: &str, info: Option<&ControlNodeInfo>) -> Node {
    let mut properties = Properties::new();
    properties.insert("control_id".to_string(), json!(control_id));
    if let Some(info) = info {
        properties.insert("title".to_string(), json!(info.title));
        properties.insert("description".to_string(), json!(info.description));
        properties.insert("core_requirement".to_string(), json!(info.core_requirement));
        properties.insert("advisory".to_string(), json!(info.advisory));
    }

    Node {
        id: NodeKind::Control.node_id(control_id),
        kind: NodeKind::Control,
        key: control_id.to_string(),
        properties,
    }
}

fn remediation_node(item: &RemediationItem) -> Node {
    let mut properties = Properties::new();
    properties.insert("remediation_id".to_string(), json!(item.id));
    properties.insert("asset_id".to_string(), json!(item.asset_id));
    properties.insert("control_id".to_string(), json!(item.control_id));
    properties.insert("mapping_status".to_string(), json!(item.mapping_status));
    properties.insert("action".to_string(), json!(item.action));
    properties.insert("priority".to_string(), json!(item.priority));
    properties.insert("status".to_string(), json!(item.status));

    Node {
        id: NodeKind::Remediation.node_id(&item.id),
        kind: NodeKind::Remediation,
        key: item.id.clone(),
        properties,
    }
}
