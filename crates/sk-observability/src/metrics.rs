//! Metrics collection for Scopekeeper.
//!
//! Counters and histograms go through the `metrics` facade, so any installed
//! recorder (Prometheus or otherwise) picks them up. The [`MetricsCollector`]
//! also keeps in-memory tallies from which run KPIs are computed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use serde::{Deserialize, Serialize};
use sk_core::{RemediationPriority, RemediationStatus, ScopeVerdict};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Key indicators for the compliance estate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KPIs {
    /// Share of classified assets that are IN_SCOPE.
    pub in_scope_ratio: f64,
    /// Assets awaiting human scope review.
    pub indeterminate_count: u64,
    /// CRITICAL remediation items not yet resolved.
    pub open_critical_count: u64,
    /// Total assets classified in the latest run.
    pub total_assets: u64,
    /// Assets by verdict in the latest run.
    pub assets_by_verdict: BTreeMap<String, u64>,
    /// Remediation items by priority in the latest run.
    pub remediations_by_priority: BTreeMap<String, u64>,
    /// Runs completed since the collector started.
    pub completed_runs: u64,
    /// Runs that failed since the collector started.
    pub failed_runs: u64,
    /// Latest completed run.
    pub last_run_id: Option<Uuid>,
    /// Duration of the latest completed run.
    pub last_run_duration_secs: Option<f64>,
}

/// Per-run tallies.
#[derive(Debug, Clone, Default)]
struct RunTally {
    verdicts: BTreeMap<ScopeVerdict, u64>,
    priorities: BTreeMap<RemediationPriority, u64>,
    open_critical: u64,
    duration_secs: Option<f64>,
}

#[derive(Debug, Default)]
struct CollectorState {
    latest: Option<(Uuid, RunTally)>,
    in_progress: BTreeMap<Uuid, RunTally>,
    completed_runs: u64,
    failed_runs: u64,
}

/// Metrics collector for compliance runs.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    state: Arc<RwLock<CollectorState>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        // Register metric descriptions
        Self::register_metrics();

        Self {
            state: Arc::new(RwLock::new(CollectorState::default())),
        }
    }

    /// Registers metric descriptions.
    fn register_metrics() {
        describe_counter!(
            "sk_assets_classified_total",
            "Total number of assets classified, by verdict"
        );
        describe_counter!(
            "sk_remediations_planned_total",
            "Total number of remediation items planned, by priority"
        );
        describe_counter!(
            "sk_catalog_rejections_total",
            "Total number of catalog entries rejected, by kind"
        );
        describe_counter!(
            "sk_remediations_archived_total",
            "Total number of remediation items archived"
        );
        describe_counter!("sk_runs_total", "Total number of compliance runs, by result");

        describe_gauge!(
            "sk_indeterminate_assets",
            "Assets awaiting scope review after the latest run"
        );

        describe_histogram!(
            "sk_run_duration_seconds",
            "Duration of a compliance run"
        );
    }

    /// Records the start of a run.
    pub async fn record_run_started(&self, run_id: Uuid) {
        let mut state = self.state.write().await;
        state.in_progress.insert(run_id, RunTally::default());
    }

    /// Records a classified asset.
    pub async fn record_classification(&self, run_id: Uuid, verdict: ScopeVerdict) {
        counter!("sk_assets_classified_total", "verdict" => verdict.to_string()).increment(1);

        let mut state = self.state.write().await;
        if let Some(tally) = state.in_progress.get_mut(&run_id) {
            *tally.verdicts.entry(verdict).or_insert(0) += 1;
        }
    }

    /// Records a planned remediation item.
    pub async fn record_remediation(
        &self,
        run_id: Uuid,
        priority: RemediationPriority,
        status: RemediationStatus,
    ) {
        counter!("sk_remediations_planned_total", "priority" => priority.to_string())
            .increment(1);

        let mut state = self.state.write().await;
        if let Some(tally) = state.in_progress.get_mut(&run_id) {
            *tally.priorities.entry(priority).or_insert(0) += 1;
            if priority == RemediationPriority::Critical && status != RemediationStatus::Resolved
            {
                tally.open_critical += 1;
            }
        }
    }

    /// Records archived remediation items.
    pub fn record_archived(&self, count: usize) {
        counter!("sk_remediations_archived_total").increment(count as u64);
    }

    /// Records a rejected catalog entry.
    pub fn record_catalog_rejection(&self, kind: &str) {
        counter!("sk_catalog_rejections_total", "kind" => kind.to_string()).increment(1);
    }

    /// Records run completion and makes it the latest run.
    pub async fn record_run_completed(&self, run_id: Uuid, duration_secs: f64) {
        counter!("sk_runs_total", "result" => "success").increment(1);
        histogram!("sk_run_duration_seconds").record(duration_secs);

        let mut state = self.state.write().await;
        let mut tally = state.in_progress.remove(&run_id).unwrap_or_default();
        tally.duration_secs = Some(duration_secs);

        let indeterminate = tally
            .verdicts
            .get(&ScopeVerdict::Indeterminate)
            .copied()
            .unwrap_or(0);
        gauge!("sk_indeterminate_assets").set(indeterminate as f64);

        state.completed_runs += 1;
        state.latest = Some((run_id, tally));
    }

    /// Records a failed run. The latest completed run stays current.
    pub async fn record_run_failed(&self, run_id: Uuid, reason: &str) {
        counter!("sk_runs_total", "result" => "failure", "reason" => reason.to_string())
            .increment(1);

        let mut state = self.state.write().await;
        state.in_progress.remove(&run_id);
        state.failed_runs += 1;
    }

    /// Calculates KPIs from the latest completed run.
    pub async fn calculate_kpis(&self) -> KPIs {
        let state = self.state.read().await;

        let mut kpis = KPIs {
            completed_runs: state.completed_runs,
            failed_runs: state.failed_runs,
            ..Default::default()
        };

        let Some((run_id, tally)) = &state.latest else {
            return kpis;
        };

        let total: u64 = tally.verdicts.values().sum();
        let in_scope = tally
            .verdicts
            .get(&ScopeVerdict::InScope)
            .copied()
            .unwrap_or(0);

        kpis.total_assets = total;
        kpis.in_scope_ratio = if total > 0 {
            in_scope as f64 / total as f64
        } else {
            0.0
        };
        kpis.indeterminate_count = tally
            .verdicts
            .get(&ScopeVerdict::Indeterminate)
            .copied()
            .unwrap_or(0);
        kpis.open_critical_count = tally.open_critical;
        kpis.assets_by_verdict = tally
            .verdicts
            .iter()
            .map(|(v, n)| (v.to_string(), *n))
            .collect();
        kpis.remediations_by_priority = tally
            .priorities
            .iter()
            .map(|(p, n)| (p.to_string(), *n))
            .collect();
        kpis.last_run_id = Some(*run_id);
        kpis.last_run_duration_secs = tally.duration_secs;
        kpis
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_run() {
        let collector = MetricsCollector::new();
        let run_id = Uuid::new_v4();

        collector.record_run_started(run_id).await;

        let state = collector.state.read().await;
        assert!(state.in_progress.contains_key(&run_id));
    }

    #[tokio::test]
    async fn test_calculate_kpis() {
        let collector = MetricsCollector::new();
        let run_id = Uuid::new_v4();

        collector.record_run_started(run_id).await;
        collector
            .record_classification(run_id, ScopeVerdict::InScope)
            .await;
        collector
            .record_classification(run_id, ScopeVerdict::OutOfScope)
            .await;
        collector
            .record_classification(run_id, ScopeVerdict::InScope)
            .await;
        collector
            .record_classification(run_id, ScopeVerdict::Indeterminate)
            .await;
        collector
            .record_remediation(run_id, RemediationPriority::Critical, RemediationStatus::Open)
            .await;
        collector
            .record_remediation(
                run_id,
                RemediationPriority::Critical,
                RemediationStatus::Resolved,
            )
            .await;
        collector
            .record_remediation(run_id, RemediationPriority::Low, RemediationStatus::Open)
            .await;
        collector.record_run_completed(run_id, 0.25).await;

        let kpis = collector.calculate_kpis().await;
        assert_eq!(kpis.total_assets, 4);
        assert_eq!(kpis.in_scope_ratio, 0.5);
        assert_eq!(kpis.indeterminate_count, 1);
        assert_eq!(kpis.open_critical_count, 1);
        assert_eq!(kpis.remediations_by_priority.get("CRITICAL"), Some(&2));
        assert_eq!(kpis.completed_runs, 1);
        assert_eq!(kpis.last_run_id, Some(run_id));
        assert_eq!(kpis.last_run_duration_secs, Some(0.25));
    }

    #[tokio::test]
    async fn test_failed_run_keeps_latest() {
        let collector = MetricsCollector::new();

        let good = Uuid::new_v4();
        collector.record_run_started(good).await;
        collector
            .record_classification(good, ScopeVerdict::InScope)
            .await;
        collector.record_run_completed(good, 0.1).await;

        let bad = Uuid::new_v4();
        collector.record_run_started(bad).await;
        collector
            .record_classification(bad, ScopeVerdict::OutOfScope)
            .await;
        collector.record_run_failed(bad, "dangling_reference").await;

        let kpis = collector.calculate_kpis().await;
        assert_eq!(kpis.in_scope_ratio, 1.0);
        assert_eq!(kpis.failed_runs, 1);
        assert!(collector.state.read().await.in_progress.is_empty());
    }

    #[tokio::test]
    async fn test_empty_kpis() {
        let kpis = MetricsCollector::new().calculate_kpis().await;
        assert_eq!(kpis, KPIs::default());
    }
}
