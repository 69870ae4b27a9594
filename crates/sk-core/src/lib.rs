//! # sk-core
//!
//! Core data models and graph projection for Scopekeeper.
//!
//! This crate provides the asset record model, scope decisions, control
//! mappings and remediation items, the graph projection builder that turns a
//! compliance run into nodes and edges, and the graph store collaborator trait.

pub mod graph;
pub mod models;

pub use graph::{
    ControlNodeInfo, Edge, EdgeKind, GraphProjection, GraphStore, InMemoryGraphStore, Node,
    NodeKind, PersistedProjection, ProjectionBuilder, ProjectionDiff, ProjectionError,
    StoreError,
};
pub use models::{
    apply_dlp_findings, ArchiveReason, ArchivedRemediation, AssetRecord, AttributeValue,
    ComplianceStatus, ControlMapping, DecisionRecord, DlpFinding, RemediationItem,
    RemediationPriority, RemediationStatus, ScopeChange, ScopeDecision, ScopeVerdict,
};
