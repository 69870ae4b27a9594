//! Compliance run pipeline.
//!
//! A run classifies every asset, maps controls, plans remediation and builds
//! the graph projection. All results are staged against a read-only view of
//! the ledger and committed only once the projection is built (and, for
//! [`CompliancePipeline::run_and_persist`], stored). A failed run leaves the
//! ledger exactly as it was.

use crate::catalog::{LoadedCatalog, RejectedEntry};
use crate::classifier::RuleSet;
use crate::controls::{ControlCatalog, EvidencePolicy};
use crate::ledger::{AssetEntry, ComplianceLedger};
use crate::mapper::ControlMapper;
use crate::planner::RemediationPlanner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sk_core::models::sort_default;
use sk_core::{
    ArchiveReason, ArchivedRemediation, AssetRecord, ComplianceStatus, ControlMapping,
    DecisionRecord, GraphProjection, GraphStore, ProjectionBuilder, ProjectionError,
    RemediationItem, RemediationPriority, ScopeChange, ScopeDecision, ScopeVerdict, StoreError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors that abort a compliance run. Each names the run it aborted.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Run {run_id}: projection build failed: {source}")]
    Projection {
        run_id: Uuid,
        #[source]
        source: ProjectionError,
    },

    #[error("Run {run_id}: graph store rejected the projection: {source}")]
    Store {
        run_id: Uuid,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineError::Projection { run_id, .. } | PipelineError::Store { run_id, .. } => {
                *run_id
            }
        }
    }
}

/// Summary of one compliance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub asset_count: usize,
    pub verdicts: BTreeMap<ScopeVerdict, usize>,
    /// Assets needing human review.
    pub indeterminate_assets: Vec<String>,
    pub scope_changes: Vec<ScopeChange>,
    /// Mapping statuses across in-scope assets.
    pub mapping_status: BTreeMap<ComplianceStatus, usize>,
    pub remediation_priorities: BTreeMap<RemediationPriority, usize>,
    pub archived: usize,
    pub rejected_entries: Vec<RejectedEntry>,
    /// DLP findings that named no inventoried asset.
    #[serde(default)]
    pub unmatched_findings: Vec<String>,
    #[serde(default)]
    pub scope_note: Option<String>,
}

impl RunSummary {
    pub fn verdict_count(&self, verdict: ScopeVerdict) -> usize {
        self.verdicts.get(&verdict).copied().unwrap_or(0)
    }

    pub fn priority_count(&self, priority: RemediationPriority) -> usize {
        self.remediation_priorities
            .get(&priority)
            .copied()
            .unwrap_or(0)
    }

    pub fn remediation_count(&self) -> usize {
        self.remediation_priorities.values().sum()
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// Decisions in input order.
    pub decisions: Vec<ScopeDecision>,
    /// Mappings in canonical (asset, control) order.
    pub mappings: Vec<ControlMapping>,
    /// Live remediation items in default order.
    pub remediations: Vec<RemediationItem>,
    /// Items archived by this run.
    pub archived: Vec<ArchivedRemediation>,
    pub projection: GraphProjection,
    pub summary: RunSummary,
}

struct StagedAsset {
    decision: ScopeDecision,
    record_history: bool,
    mappings: Vec<ControlMapping>,
    remediations: Vec<RemediationItem>,
}

struct StagedRun {
    outcome: RunOutcome,
    assets: BTreeMap<String, StagedAsset>,
    removed_assets: Vec<String>,
}

/// Runs classification, mapping, planning and projection over asset batches.
///
/// The rule set and control catalog are shared read-only; one pipeline can
/// serve concurrent runs against separate ledgers.
#[derive(Debug, Clone)]
pub struct CompliancePipeline {
    rules: Arc<RuleSet>,
    catalog: Arc<ControlCatalog>,
    mapper: ControlMapper,
    planner: RemediationPlanner,
    rejected: Vec<RejectedEntry>,
    scope_note: Option<String>,
}

impl CompliancePipeline {
    pub fn new(rules: RuleSet, controls: ControlCatalog) -> Self {
        let catalog = Arc::new(controls);
        Self {
            rules: Arc::new(rules),
            mapper: ControlMapper::new(catalog.clone()),
            planner: RemediationPlanner::new(catalog.clone()),
            catalog,
            rejected: Vec::new(),
            scope_note: None,
        }
    }

    /// Creates a pipeline from a loaded catalog, carrying its rejections into
    /// every run summary.
    pub fn from_catalog(catalog: LoadedCatalog) -> Self {
        let mut pipeline = Self::new(catalog.rules, catalog.controls);
        pipeline.rejected = catalog.rejected;
        pipeline.scope_note = catalog.scope_note;
        pipeline
    }

    pub fn with_evidence_policy(mut self, policy: Arc<dyn EvidencePolicy>) -> Self {
        self.mapper = self.mapper.with_evidence_policy(policy);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn controls(&self) -> &ControlCatalog {
        &self.catalog
    }

    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }

    pub fn scope_note(&self) -> Option<&str> {
        self.scope_note.as_deref()
    }

    /// Runs the pipeline under a fresh run id and commits the results to `ledger`.
    pub fn run(
        &self,
        ledger: &mut ComplianceLedger,
        assets: &[AssetRecord],
    ) -> Result<RunOutcome, PipelineError> {
        self.run_with_id(Uuid::new_v4(), ledger, assets)
    }

    /// Runs the pipeline under a caller-chosen run id.
    #[instrument(skip(self, ledger, assets), fields(assets = assets.len()))]
    pub fn run_with_id(
        &self,
        run_id: Uuid,
        ledger: &mut ComplianceLedger,
        assets: &[AssetRecord],
    ) -> Result<RunOutcome, PipelineError> {
        let staged = self.stage(run_id, ledger, assets)?;
        Ok(commit(ledger, staged))
    }

    /// Runs the pipeline, replaces the stored graph, then commits to `ledger`.
    pub async fn run_and_persist(
        &self,
        ledger: &mut ComplianceLedger,
        assets: &[AssetRecord],
        store: &dyn GraphStore,
    ) -> Result<RunOutcome, PipelineError> {
        self.run_and_persist_with_id(Uuid::new_v4(), ledger, assets, store)
            .await
    }

    /// [`CompliancePipeline::run_and_persist`] under a caller-chosen run id.
    #[instrument(skip(self, ledger, assets, store), fields(assets = assets.len()))]
    pub async fn run_and_persist_with_id(
        &self,
        run_id: Uuid,
        ledger: &mut ComplianceLedger,
        assets: &[AssetRecord],
        store: &dyn GraphStore,
    ) -> Result<RunOutcome, PipelineError> {
        let staged = self.stage(run_id, ledger, assets)?;
        store
            .replace(run_id, staged.outcome.projection.clone())
            .await
            .map_err(|source| PipelineError::Store { run_id, source })?;
        Ok(commit(ledger, staged))
    }

    fn stage(
        &self,
        run_id: Uuid,
        ledger: &ComplianceLedger,
        assets: &[AssetRecord],
    ) -> Result<StagedRun, PipelineError> {
        let started_at = Utc::now();
        info!(%run_id, assets = assets.len(), "Starting compliance run");

        let mut staged_assets = BTreeMap::new();
        let mut decisions = Vec::with_capacity(assets.len());
        let mut all_mappings = Vec::new();
        let mut all_remediations = Vec::new();
        let mut archived = Vec::new();
        let mut scope_changes = Vec::new();

        for asset in assets {
            let decision = self.rules.classify(asset);
            let mappings = self.mapper.map_controls(asset, &decision);
            let planned = self.planner.plan(&mappings);

            let previous = ledger.asset(&asset.id);
            let previous_decision = previous.and_then(AssetEntry::current);
            let previous_items = previous.map(|e| e.remediations.as_slice()).unwrap_or(&[]);

            let reconciled = RemediationPlanner::reconcile(planned, previous_items);

            let previous_verdict = previous_decision.map(|d| d.verdict);
            if let Some(from) = previous_verdict.filter(|v| *v != decision.verdict) {
                info!(
                    asset_id = %asset.id,
                    from = %from,
                    to = %decision.verdict,
                    "Scope verdict changed"
                );
                scope_changes.push(ScopeChange {
                    asset_id: asset.id.clone(),
                    from,
                    to: decision.verdict,
                });
            }

            for item in reconciled.retired {
                let reason = if previous_verdict != Some(decision.verdict) {
                    ArchiveReason::ScopeChanged
                } else {
                    self.retirement_reason(&item, &mappings)
                };
                debug!(item_id = %item.id, reason = %reason, "Archiving remediation item");
                archived.push(ArchivedRemediation::new(item, run_id, reason));
            }

            if decision.verdict == ScopeVerdict::Indeterminate {
                warn!(asset_id = %asset.id, "Scope is indeterminate, flagged for review");
            }

            all_mappings.extend(mappings.iter().cloned());
            all_remediations.extend(reconciled.items.iter().cloned());
            decisions.push(decision.clone());

            staged_assets.insert(
                asset.id.clone(),
                StagedAsset {
                    record_history: previous_decision != Some(&decision),
                    decision,
                    mappings,
                    remediations: reconciled.items,
                },
            );
        }

        // Assets that dropped out of the inventory.
        let mut removed_assets = Vec::new();
        for (asset_id, entry) in ledger.active_assets() {
            if staged_assets.contains_key(asset_id) {
                continue;
            }
            info!(asset_id = %asset_id, "Asset absent from inventory");
            removed_assets.push(asset_id.clone());
            for item in &entry.remediations {
                archived.push(ArchivedRemediation::new(
                    item.clone(),
                    run_id,
                    ArchiveReason::AssetRemoved,
                ));
            }
        }

        let projection = ProjectionBuilder::new()
            .with_controls(self.catalog.node_info())
            .build(assets, &decisions, &all_mappings, &all_remediations)
            .map_err(|source| PipelineError::Projection { run_id, source })?;

        all_mappings.sort();
        sort_default(&mut all_remediations);

        let summary = self.summarize(
            run_id,
            started_at,
            &decisions,
            &all_mappings,
            &all_remediations,
            scope_changes,
            archived.len(),
        );

        info!(
            %run_id,
            in_scope = summary.verdict_count(ScopeVerdict::InScope),
            out_of_scope = summary.verdict_count(ScopeVerdict::OutOfScope),
            indeterminate = summary.verdict_count(ScopeVerdict::Indeterminate),
            remediations = all_remediations.len(),
            archived = archived.len(),
            "Compliance run staged"
        );

        Ok(StagedRun {
            outcome: RunOutcome {
                run_id,
                decisions,
                mappings: all_mappings,
                remediations: all_remediations,
                archived,
                projection,
                summary,
            },
            assets: staged_assets,
            removed_assets,
        })
    }

    fn retirement_reason(&self, item: &RemediationItem, mappings: &[ControlMapping]) -> ArchiveReason {
        match mappings.iter().find(|m| m.control_id == item.control_id) {
            Some(m) if m.status == ComplianceStatus::Met => ArchiveReason::ControlSatisfied,
            Some(m) if m.status == ComplianceStatus::NotApplicable => {
                ArchiveReason::ControlNotApplicable
            }
            Some(_) => ArchiveReason::ControlRemoved,
            None if self.catalog.contains(&item.control_id) => ArchiveReason::ControlNotApplicable,
            None => ArchiveReason::ControlRemoved,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        decisions: &[ScopeDecision],
        mappings: &[ControlMapping],
        remediations: &[RemediationItem],
        scope_changes: Vec<ScopeChange>,
        archived: usize,
    ) -> RunSummary {
        let mut verdicts = BTreeMap::new();
        for decision in decisions {
            *verdicts.entry(decision.verdict).or_insert(0) += 1;
        }

        let in_scope: BTreeSet<&str> = decisions
            .iter()
            .filter(|d| d.is_in_scope())
            .map(|d| d.asset_id.as_str())
            .collect();
        let mut mapping_status = BTreeMap::new();
        for mapping in mappings
            .iter()
            .filter(|m| in_scope.contains(&m.asset_id.as_str()))
        {
            *mapping_status.entry(mapping.status).or_insert(0) += 1;
        }

        let mut remediation_priorities = BTreeMap::new();
        for item in remediations {
            *remediation_priorities.entry(item.priority).or_insert(0) += 1;
        }

        RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            asset_count: decisions.len(),
            verdicts,
            indeterminate_assets: decisions
                .iter()
                .filter(|d| d.requires_review())
                .map(|d| d.asset_id.clone())
                .collect(),
            scope_changes,
            mapping_status,
            remediation_priorities,
            archived,
            rejected_entries: self.rejected.clone(),
            unmatched_findings: Vec::new(),
            scope_note: self.scope_note.clone(),
        }
    }
}

fn commit(ledger: &mut ComplianceLedger, staged: StagedRun) -> RunOutcome {
    let StagedRun {
        outcome,
        assets,
        removed_assets,
    } = staged;
    let run_id = outcome.run_id;

    for (asset_id, staged_asset) in assets {
        let record = DecisionRecord::new(run_id, staged_asset.decision);
        match ledger.entry_mut(&asset_id) {
            Some(entry) => {
                if staged_asset.record_history {
                    entry.history.push(record);
                }
                entry.mappings = staged_asset.mappings;
                entry.remediations = staged_asset.remediations;
                entry.active = true;
            }
            None => {
                let mut entry = AssetEntry::new(record);
                entry.mappings = staged_asset.mappings;
                entry.remediations = staged_asset.remediations;
                ledger.insert_entry(asset_id, entry);
            }
        }
    }

    for (asset_id, entry) in ledger.entries_mut() {
        if removed_assets.contains(asset_id) {
            entry.mappings.clear();
            entry.remediations.clear();
            entry.active = false;
        }
    }

    for archived in &outcome.archived {
        ledger.push_archived(archived.clone());
    }

    info!(%run_id, "Compliance run committed");
    outcome
}
