//! Compliance ledger.
//!
//! The ledger is the durable state carried between runs: each asset's current
//! decision and its history, the live mappings and remediation items, and the
//! archive of remediation items that lost their mapping.

use serde::{Deserialize, Serialize};
use sk_core::{
    ArchivedRemediation, ControlMapping, DecisionRecord, RemediationItem, RemediationStatus,
    ScopeDecision,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from direct ledger updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Remediation item not found: {0}")]
    RemediationNotFound(String),
}

/// Ledger state for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Decision history, oldest first. Never truncated.
    pub history: Vec<DecisionRecord>,
    #[serde(default)]
    pub mappings: Vec<ControlMapping>,
    #[serde(default)]
    pub remediations: Vec<RemediationItem>,
    /// False once the asset dropped out of the inventory.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AssetEntry {
    pub(crate) fn new(record: DecisionRecord) -> Self {
        Self {
            history: vec![record],
            mappings: Vec::new(),
            remediations: Vec::new(),
            active: true,
        }
    }

    /// The current decision.
    pub fn current(&self) -> Option<&ScopeDecision> {
        self.history.last().map(|r| &r.decision)
    }

    pub fn current_record(&self) -> Option<&DecisionRecord> {
        self.history.last()
    }
}

/// Persistent compliance state across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLedger {
    #[serde(default)]
    assets: BTreeMap<String, AssetEntry>,
    #[serde(default)]
    archive: Vec<ArchivedRemediation>,
}

impl ComplianceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn asset(&self, asset_id: &str) -> Option<&AssetEntry> {
        self.assets.get(asset_id)
    }

    /// All assets ever seen, in id order.
    pub fn assets(&self) -> impl Iterator<Item = (&String, &AssetEntry)> {
        self.assets.iter()
    }

    /// Assets present in the latest run.
    pub fn active_assets(&self) -> impl Iterator<Item = (&String, &AssetEntry)> {
        self.assets.iter().filter(|(_, e)| e.active)
    }

    pub fn current_decision(&self, asset_id: &str) -> Option<&ScopeDecision> {
        self.assets.get(asset_id).and_then(AssetEntry::current)
    }

    pub fn history(&self, asset_id: &str) -> &[DecisionRecord] {
        self.assets
            .get(asset_id)
            .map(|e| e.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn mappings(&self, asset_id: &str) -> &[ControlMapping] {
        self.assets
            .get(asset_id)
            .map(|e| e.mappings.as_slice())
            .unwrap_or(&[])
    }

    pub fn remediations(&self, asset_id: &str) -> &[RemediationItem] {
        self.assets
            .get(asset_id)
            .map(|e| e.remediations.as_slice())
            .unwrap_or(&[])
    }

    /// Every live remediation item across assets.
    pub fn all_remediations(&self) -> Vec<&RemediationItem> {
        self.assets.values().flat_map(|e| e.remediations.iter()).collect()
    }

    pub fn archive(&self) -> &[ArchivedRemediation] {
        &self.archive
    }

    /// Archived items for one asset, oldest first.
    pub fn archived_for(&self, asset_id: &str) -> Vec<&ArchivedRemediation> {
        self.archive
            .iter()
            .filter(|a| a.item.asset_id == asset_id)
            .collect()
    }

    /// Updates the lifecycle status of a live remediation item.
    pub fn set_remediation_status(
        &mut self,
        item_id: &str,
        status: RemediationStatus,
    ) -> Result<(), LedgerError> {
        self.assets
            .values_mut()
            .flat_map(|e| e.remediations.iter_mut())
            .find(|i| i.id == item_id)
            .map(|item| item.status = status)
            .ok_or_else(|| LedgerError::RemediationNotFound(item_id.to_string()))
    }

    pub(crate) fn entry_mut(&mut self, asset_id: &str) -> Option<&mut AssetEntry> {
        self.assets.get_mut(asset_id)
    }

    pub(crate) fn insert_entry(&mut self, asset_id: String, entry: AssetEntry) {
        self.assets.insert(asset_id, entry);
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&String, &mut AssetEntry)> {
        self.assets.iter_mut()
    }

    pub(crate) fn push_archived(&mut self, archived: ArchivedRemediation) {
        self.archive.push(archived);
    }
}
