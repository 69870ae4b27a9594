//! Data models for the scope classification engine.
//!
//! Asset records come in from ingestion; scope decisions, control mappings
//! and remediation items are derived from them by the policy crate.

pub mod asset;
pub mod finding;
pub mod mapping;
pub mod remediation;
pub mod scope;

pub use asset::{AssetRecord, AttributeValue, SourceMetadata};
pub use finding::{apply_dlp_findings, DlpFinding, DlpOverlay, SENSITIVE_FOUND};
pub use mapping::{ComplianceStatus, ControlMapping};
pub use remediation::{
    default_order, sort_default, ArchiveReason, ArchivedRemediation, RemediationItem,
    RemediationPriority, RemediationStatus, ID_SEPARATOR,
};
pub use scope::{DecisionRecord, ScopeChange, ScopeDecision, ScopeVerdict, NO_MATCHING_RULE};
