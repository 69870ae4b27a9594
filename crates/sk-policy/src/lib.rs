//! # sk-policy
//!
//! Scope classification and control mapping for Scopekeeper.
//!
//! This crate provides the scope rule language, the rule engine that decides
//! whether an asset is in PCI DSS scope, the control catalog and evidence
//! policy, the remediation planner, the YAML catalog loader, and the
//! compliance pipeline that ties them together against a persistent ledger.

pub mod catalog;
pub mod classifier;
pub mod controls;
pub mod ledger;
pub mod mapper;
pub mod pipeline;
pub mod planner;
pub mod rules;

pub use catalog::{
    default_catalog, load_catalog, parse_catalog, CatalogError, EntryKind, LoadedCatalog,
    RejectedEntry, DEFAULT_CATALOG_YAML,
};
pub use classifier::{classify, RuleSet};
pub use controls::{CatalogEvidencePolicy, Control, ControlCatalog, EvidencePolicy};
pub use ledger::{AssetEntry, ComplianceLedger, LedgerError};
pub use mapper::{map_controls, ControlMapper};
pub use pipeline::{CompliancePipeline, PipelineError, RunOutcome, RunSummary};
pub use planner::{Reconciliation, RemediationPlanner};
pub use rules::{RuleCondition, ScopeRule, ScopeRuleBuilder};
