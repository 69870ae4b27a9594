//! Run command - executes one compliance run over an inventory file.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sk_core::{apply_dlp_findings, AssetRecord, DlpFinding, GraphStore, InMemoryGraphStore};
use sk_observability::{
    AuditEventType, AuditLog, AuditLogEntry, AuditResult, MetricsCollector, KPIs,
};
use sk_policy::{
    default_catalog, load_catalog, ComplianceLedger, CompliancePipeline, LoadedCatalog,
    PipelineError, RunOutcome, RunSummary,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::AppConfig;

const ACTOR: &str = "scopekeeper-cli";

/// Inputs of one run, from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub inventory: PathBuf,
    pub catalog: Option<PathBuf>,
    pub findings: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Fills paths not given on the command line from configuration.
    pub fn resolve(mut self, config: &AppConfig) -> Self {
        if self.catalog.is_none() {
            self.catalog = config.catalog_path();
        }
        if self.ledger.is_none() {
            self.ledger = config.output.ledger_path.as_ref().map(PathBuf::from);
        }
        if self.output.is_none() {
            self.output = config.output.projection_path.as_ref().map(PathBuf::from);
        }
        self
    }
}

/// What a finished run reports back to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub kpis: KPIs,
    pub projection_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    /// Audit entries awaiting human follow-up.
    pub review_items: usize,
    /// Why the DLP findings file was ignored, if it was.
    pub findings_error: Option<String>,
}

/// Loads inputs, runs the pipeline and writes the projection, ledger and audit trail.
pub async fn execute_run(args: RunArgs, config: &AppConfig) -> Result<RunReport> {
    let args = args.resolve(config);
    let audit_path = config.output.audit_path.as_ref().map(PathBuf::from);
    let metrics = MetricsCollector::new();
    let audit = AuditLog::unbounded();

    let catalog = load_run_catalog(args.catalog.as_deref())?;
    audit
        .record(AuditLogEntry::new(
            AuditEventType::CatalogLoaded,
            ACTOR,
            format!(
                "Catalog loaded with {} rules and {} controls",
                catalog.rules.len(),
                catalog.controls.len()
            ),
        ))
        .await;
    for rejected in &catalog.rejected {
        metrics.record_catalog_rejection(&rejected.kind.to_string());
        audit
            .record(
                AuditLogEntry::new(
                    AuditEventType::CatalogEntryRejected,
                    ACTOR,
                    rejected.to_string(),
                )
                .with_result(AuditResult::Review),
            )
            .await;
    }

    let assets: Vec<AssetRecord> = read_json(&args.inventory, "inventory")?;
    let (findings, findings_error) = match &args.findings {
        Some(path) => load_findings(path, &audit).await,
        None => (Vec::new(), None),
    };
    let overlay = apply_dlp_findings(assets, &findings);
    for asset_id in &overlay.unmatched {
        warn!(%asset_id, "DLP finding names no inventoried asset");
    }

    let mut ledger = match &args.ledger {
        Some(path) if path.exists() => read_json(path, "ledger")?,
        _ => ComplianceLedger::new(),
    };

    let pipeline = CompliancePipeline::from_catalog(catalog);
    let store = InMemoryGraphStore::new();

    let run_id = Uuid::new_v4();
    metrics.record_run_started(run_id).await;
    audit
        .record(
            AuditLogEntry::new(AuditEventType::RunStarted, ACTOR, "Compliance run started")
                .for_run(run_id)
                .with_details(serde_json::json!({ "assets": overlay.assets.len() })),
        )
        .await;

    let outcome = match pipeline
        .run_and_persist_with_id(run_id, &mut ledger, &overlay.assets, &store)
        .instrument(sk_observability::run_span!(run_id, assets = overlay.assets.len()))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics.record_run_failed(e.run_id(), failure_reason(&e)).await;
            audit
                .record(
                    AuditLogEntry::new(AuditEventType::RunFailed, ACTOR, "Compliance run aborted")
                        .for_run(e.run_id())
                        .with_result(AuditResult::Failure(e.to_string())),
                )
                .await;
            if let Some(path) = &audit_path {
                if let Err(export_err) = export_audit(&audit, path).await {
                    warn!(error = %export_err, "Failed to export audit trail");
                }
            }
            return Err(e).context("Compliance run failed");
        }
    };

    record_outcome(&outcome, &metrics, &audit)
        .instrument(sk_observability::run_span!(run_id))
        .await;

    let mut summary = outcome.summary.clone();
    summary.unmatched_findings = overlay.unmatched;

    if let Some(path) = &args.output {
        let persisted = store
            .current()
            .await?
            .context("Graph store holds no projection after the run")?;
        write_json(path, &persisted)?;
        audit
            .record(
                AuditLogEntry::new(
                    AuditEventType::DataExport,
                    ACTOR,
                    format!("Projection written to {}", path.display()),
                )
                .for_run(outcome.run_id)
                .with_details(serde_json::json!({ "path": path })),
            )
            .await;
    }

    if let Some(path) = &args.ledger {
        write_json(path, &ledger)?;
        audit
            .record(
                AuditLogEntry::new(
                    AuditEventType::DataExport,
                    ACTOR,
                    format!("Ledger written to {}", path.display()),
                )
                .for_run(outcome.run_id)
                .with_details(serde_json::json!({ "path": path })),
            )
            .await;
    }

    let review_items = audit.review_queue().await.len();

    if let Some(path) = &audit_path {
        export_audit(&audit, path).await?;
    }

    info!(
        run_id = %outcome.run_id,
        assets = summary.asset_count,
        remediations = summary.remediation_count(),
        "Run finished"
    );

    Ok(RunReport {
        summary,
        kpis: metrics.calculate_kpis().await,
        projection_path: args.output,
        ledger_path: args.ledger,
        audit_path,
        review_items,
        findings_error,
    })
}

async fn record_outcome(outcome: &RunOutcome, metrics: &MetricsCollector, audit: &AuditLog) {
    let run_id = outcome.run_id;
    let event = |event_type, description: String| {
        AuditLogEntry::new(event_type, ACTOR, description).for_run(run_id)
    };

    for decision in &outcome.decisions {
        metrics.record_classification(run_id, decision.verdict).await;
        if decision.requires_review() {
            audit
                .record(
                    event(
                        AuditEventType::IndeterminateScope,
                        "No rule decided the scope verdict".into(),
                    )
                    .for_asset(&decision.asset_id)
                    .with_details(serde_json::json!({ "justification": decision.justification() }))
                    .with_result(AuditResult::Review),
                )
                .instrument(sk_observability::asset_span!(decision.asset_id))
                .await;
        }
    }

    for change in &outcome.summary.scope_changes {
        audit
            .record(
                event(
                    AuditEventType::ScopeChanged,
                    format!("Scope changed from {} to {}", change.from, change.to),
                )
                .for_asset(&change.asset_id)
                .with_details(serde_json::json!({ "from": change.from, "to": change.to })),
            )
            .await;
    }

    for item in &outcome.remediations {
        metrics
            .record_remediation(run_id, item.priority, item.status)
            .await;
    }

    metrics.record_archived(outcome.archived.len());
    for archived in &outcome.archived {
        audit
            .record(
                event(
                    AuditEventType::RemediationArchived,
                    format!("Archived {}: {}", archived.item.id, archived.reason),
                )
                .for_asset(&archived.item.asset_id)
                .with_details(serde_json::json!({
                    "item_id": archived.item.id,
                    "reason": archived.reason,
                })),
            )
            .await;
    }

    audit
        .record(
            event(
                AuditEventType::ProjectionPersisted,
                "Graph projection replaced".into(),
            )
            .with_details(serde_json::json!({
                "nodes": outcome.projection.node_count(),
                "edges": outcome.projection.edge_count(),
            })),
        )
        .await;

    metrics
        .record_run_completed(run_id, outcome.summary.duration_seconds())
        .await;
    audit
        .record(
            event(AuditEventType::RunCompleted, "Compliance run committed".into())
                .with_details(serde_json::to_value(&outcome.summary).unwrap_or_default()),
        )
        .await;
}

/// Reads DLP findings. An unreadable or malformed file is ignored with a
/// warning and a review entry, and the run goes ahead without findings.
async fn load_findings(path: &Path, audit: &AuditLog) -> (Vec<DlpFinding>, Option<String>) {
    match read_json(path, "DLP findings") {
        Ok(findings) => (findings, None),
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(error = %reason, "Ignoring DLP findings");
            audit
                .record(
                    AuditLogEntry::new(
                        AuditEventType::FindingsIgnored,
                        ACTOR,
                        "DLP findings ignored",
                    )
                    .with_details(serde_json::json!({ "path": path, "error": reason }))
                    .with_result(AuditResult::Review),
                )
                .await;
            (Vec::new(), Some(reason))
        }
    }
}

async fn export_audit(audit: &AuditLog, path: &Path) -> Result<()> {
    let json = audit.to_json().await.context("Failed to serialize audit trail")?;
    write_text(path, &json)
}

fn load_run_catalog(path: Option<&Path>) -> Result<LoadedCatalog> {
    match path {
        Some(path) => load_catalog(path)
            .with_context(|| format!("Failed to load catalog: {}", path.display())),
        None => default_catalog().context("Failed to parse the default catalog"),
    }
}

fn failure_reason(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Projection { source, .. } if source.is_dangling_reference() => {
            "dangling_reference"
        }
        PipelineError::Projection { .. } => "projection",
        PipelineError::Store { .. } => "store",
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    write_text(path, &contents)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write file: {}", path.display()))
}
