//! Graph projection of a compliance run.
//!
//! A projection is the node/edge view of one run: assets, their scope
//! decisions, the controls they map to and the remediation items those
//! controls require. It is rebuilt from scratch on every run and handed whole
//! to a [`GraphStore`].

mod builder;
pub mod store;

pub use builder::{ControlNodeInfo, ProjectionBuilder, ProjectionError};
pub use store::{GraphStore, InMemoryGraphStore, PersistedProjection, StoreError, StoreResult};

use crate::models::{ComplianceStatus, ControlMapping};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of a projection node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Asset,
    ScopeDecision,
    Control,
    Remediation,
}

impl NodeKind {
    /// Prefix used in node ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Asset => "asset",
            NodeKind::ScopeDecision => "scope",
            NodeKind::Control => "control",
            NodeKind::Remediation => "remediation",
        }
    }

    /// Builds the node id for a domain key of this kind.
    pub fn node_id(&self, key: &str) -> String {
        format!("{}:{}", self.prefix(), key)
    }
}

/// Kind of a projection edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Asset → scope decision.
    HasScope,
    /// Asset → control, carrying the compliance status.
    MappedTo,
    /// Control → remediation item.
    RequiresRemediation,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::HasScope => write!(f, "HAS_SCOPE"),
            EdgeKind::MappedTo => write!(f, "MAPPED_TO"),
            EdgeKind::RequiresRemediation => write!(f, "REQUIRES_REMEDIATION"),
        }
    }
}

/// Properties attached to nodes and edges.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// A projection node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Projection-wide id, `<prefix>:<key>`.
    pub id: String,
    pub kind: NodeKind,
    /// Domain id (asset id, control id, remediation id).
    pub key: String,
    pub properties: Properties,
}

/// A directed projection edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
    pub properties: Properties,
}

impl Edge {
    fn sort_key(&self) -> (&str, EdgeKind, &str) {
        (self.from.as_str(), self.kind, self.to.as_str())
    }
}

/// Node/edge view of one compliance run.
///
/// Nodes are keyed by id and edges are kept sorted by `(from, kind, to)`, so
/// two projections built from the same inputs compare equal regardless of the
/// order the inputs arrived in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphProjection {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
}

impl GraphProjection {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes of one kind, in id order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Edges of one kind, in canonical order.
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Reconstructs the control mapping set from `MAPPED_TO` edges.
    ///
    /// The result is in canonical (asset id, control id) order.
    pub fn mappings(&self) -> Vec<ControlMapping> {
        let mut mappings: Vec<ControlMapping> = self
            .edges_of_kind(EdgeKind::MappedTo)
            .filter_map(|edge| {
                let asset = self.nodes.get(&edge.from)?;
                let control = self.nodes.get(&edge.to)?;
                let status: ComplianceStatus = edge
                    .properties
                    .get("status")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())?;
                Some(ControlMapping::new(
                    asset.key.clone(),
                    control.key.clone(),
                    status,
                ))
            })
            .collect();
        mappings.sort();
        mappings
    }

    /// Verifies that every edge endpoint is a node of this projection.
    pub fn is_closed(&self) -> bool {
        self.edges
            .iter()
            .all(|e| self.nodes.contains_key(&e.from) && self.nodes.contains_key(&e.to))
    }

    /// Structural difference from an earlier projection.
    pub fn diff(&self, previous: &GraphProjection) -> ProjectionDiff {
        let current_nodes: BTreeSet<&String> = self.nodes.keys().collect();
        let previous_nodes: BTreeSet<&String> = previous.nodes.keys().collect();

        let changed_nodes = current_nodes
            .intersection(&previous_nodes)
            .filter(|id| self.nodes.get(**id) != previous.nodes.get(**id))
            .map(|id| (*id).clone())
            .collect();

        let current_edges: BTreeSet<(&str, EdgeKind, &str)> =
            self.edges.iter().map(Edge::sort_key).collect();
        let previous_edges: BTreeSet<(&str, EdgeKind, &str)> =
            previous.edges.iter().map(Edge::sort_key).collect();

        ProjectionDiff {
            added_nodes: current_nodes
                .difference(&previous_nodes)
                .map(|id| (*id).clone())
                .collect(),
            removed_nodes: previous_nodes
                .difference(&current_nodes)
                .map(|id| (*id).clone())
                .collect(),
            changed_nodes,
            added_edges: current_edges
                .difference(&previous_edges)
                .map(|(from, kind, to)| EdgeRef::new(from, *kind, to))
                .collect(),
            removed_edges: previous_edges
                .difference(&current_edges)
                .map(|(from, kind, to)| EdgeRef::new(from, *kind, to))
                .collect(),
        }
    }

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub(crate) fn finish(&mut self) {
        self.edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

/// Reference to an edge by its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRef {
    pub from: String,
    pub kind: EdgeKind,
    pub to: String,
}

impl EdgeRef {
    fn new(from: &str, kind: EdgeKind, to: &str) -> Self {
        Self {
            from: from.to_string(),
            kind,
            to: to.to_string(),
        }
    }
}

/// Difference between two projections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDiff {
    pub added_nodes: Vec<String>,
    pub removed_nodes: Vec<String>,
    /// Nodes present in both whose properties differ.
    pub changed_nodes: Vec<String>,
    pub added_edges: Vec<EdgeRef>,
    pub removed_edges: Vec<EdgeRef>,
}

impl ProjectionDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}
