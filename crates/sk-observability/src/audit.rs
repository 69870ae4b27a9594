//! Audit trail for Scopekeeper.
//!
//! Records run lifecycle and every scope or remediation event an assessor may
//! ask about later, in a bounded in-memory ring that can be exported as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// One audited event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Component that produced the event.
    pub actor: String,
    pub run_id: Option<Uuid>,
    pub asset_id: Option<String>,
    pub description: String,
    pub details: serde_json::Value,
    pub result: AuditResult,
}

impl AuditLogEntry {
    /// Creates a successful entry not tied to any run or asset.
    pub fn new(event_type: AuditEventType, actor: &str, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            actor: actor.to_string(),
            run_id: None,
            asset_id: None,
            description: description.into(),
            details: serde_json::Value::Null,
            result: AuditResult::Success,
        }
    }

    pub fn for_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn for_asset(mut self, asset_id: &str) -> Self {
        self.asset_id = Some(asset_id.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn needs_review(&self) -> bool {
        self.result == AuditResult::Review
    }
}

/// Auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    CatalogLoaded,
    CatalogEntryRejected,
    /// A DLP findings file could not be used.
    FindingsIgnored,
    RunStarted,
    /// Results committed to the ledger.
    RunCompleted,
    /// Run aborted before commit.
    RunFailed,
    /// No rule decided an asset's verdict.
    IndeterminateScope,
    ScopeChanged,
    RemediationArchived,
    ProjectionPersisted,
    /// Results written to a file.
    DataExport,
    Custom(String),
}

/// Outcome recorded with an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure(String),
    /// Needs human follow-up.
    Review,
}

/// Selects audit entries. Unset fields match every entry.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub run_id: Option<Uuid>,
    pub asset_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub review_only: bool,
}

impl AuditFilter {
    pub fn run(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            ..Default::default()
        }
    }

    pub fn asset(asset_id: &str) -> Self {
        Self {
            asset_id: Some(asset_id.to_string()),
            ..Default::default()
        }
    }

    pub fn event(event_type: AuditEventType) -> Self {
        Self {
            event_type: Some(event_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.run_id.map_or(true, |id| entry.run_id == Some(id))
            && self
                .asset_id
                .as_deref()
                .map_or(true, |id| entry.asset_id.as_deref() == Some(id))
            && self
                .event_type
                .as_ref()
                .map_or(true, |t| &entry.event_type == t)
            && (!self.review_only || entry.needs_review())
    }
}

/// Preallocation cap for large or unbounded trails.
const INITIAL_ALLOCATION: usize = 1024;

/// Audit trail. A bounded trail evicts its oldest entries once `capacity` is
/// reached and counts what it dropped.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditLogEntry>>>,
    capacity: usize,
    evicted: Arc<AtomicUsize>,
    mirror_to_tracing: bool,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(
                capacity.min(INITIAL_ALLOCATION),
            ))),
            capacity,
            evicted: Arc::new(AtomicUsize::new(0)),
            mirror_to_tracing: true,
        }
    }

    /// Creates a trail that keeps every entry, for one-shot runs whose trail is
    /// exported in full.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Creates a trail that does not echo entries to tracing.
    pub fn quiet(capacity: usize) -> Self {
        Self {
            mirror_to_tracing: false,
            ..Self::new(capacity)
        }
    }

    /// Appends an entry. Failures and review items are echoed at WARN.
    pub async fn record(&self, entry: AuditLogEntry) {
        if self.mirror_to_tracing {
            match &entry.result {
                AuditResult::Success => info!(
                    event_type = ?entry.event_type,
                    run_id = ?entry.run_id,
                    asset_id = ?entry.asset_id,
                    "Audit: {}",
                    entry.description
                ),
                AuditResult::Failure(reason) => warn!(
                    event_type = ?entry.event_type,
                    run_id = ?entry.run_id,
                    %reason,
                    "Audit failure: {}",
                    entry.description
                ),
                AuditResult::Review => warn!(
                    event_type = ?entry.event_type,
                    run_id = ?entry.run_id,
                    asset_id = ?entry.asset_id,
                    "Audit review: {}",
                    entry.description
                ),
            }
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity.max(1) {
            entries.pop_front();
            if self.evicted.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!(
                    capacity = self.capacity,
                    "Audit trail full, evicting oldest entries"
                );
            }
        }
        entries.push_back(entry);
    }

    /// Entries dropped to stay within capacity.
    pub fn evicted(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }

    /// All entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn query(&self, filter: &AuditFilter) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Entries awaiting human follow-up.
    pub async fn review_queue(&self) -> Vec<AuditLogEntry> {
        self.query(&AuditFilter {
            review_only: true,
            ..Default::default()
        })
        .await
    }

    pub async fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.entries.read().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTOR: &str = "scopekeeper";

    #[tokio::test]
    async fn test_record_plain_event() {
        let trail = AuditLog::quiet(100);

        trail
            .record(AuditLogEntry::new(
                AuditEventType::CatalogLoaded,
                ACTOR,
                "Default catalog loaded",
            ))
            .await;

        let entries = trail.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, AuditEventType::CatalogLoaded);
        assert_eq!(entries[0].result, AuditResult::Success);
        assert!(entries[0].run_id.is_none());
    }

    #[tokio::test]
    async fn test_query_by_run_and_asset() {
        let trail = AuditLog::quiet(100);
        let run_id = Uuid::new_v4();

        trail
            .record(
                AuditLogEntry::new(AuditEventType::RunStarted, ACTOR, "Compliance run started")
                    .for_run(run_id)
                    .with_details(serde_json::json!({"assets": 2})),
            )
            .await;
        trail
            .record(
                AuditLogEntry::new(
                    AuditEventType::IndeterminateScope,
                    ACTOR,
                    "No rule decided the scope verdict",
                )
                .for_run(run_id)
                .for_asset("kiosk-03")
                .with_result(AuditResult::Review),
            )
            .await;
        trail
            .record(
                AuditLogEntry::new(AuditEventType::RunStarted, ACTOR, "Another run")
                    .for_run(Uuid::new_v4()),
            )
            .await;

        assert_eq!(trail.query(&AuditFilter::run(run_id)).await.len(), 2);
        assert_eq!(trail.query(&AuditFilter::asset("kiosk-03")).await.len(), 1);
        assert_eq!(
            trail
                .query(&AuditFilter::event(AuditEventType::RunStarted))
                .await
                .len(),
            2
        );

        let review = trail.review_queue().await;
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].asset_id.as_deref(), Some("kiosk-03"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let trail = AuditLog::quiet(5);

        for i in 0..10 {
            trail
                .record(AuditLogEntry::new(
                    AuditEventType::Custom(format!("event-{}", i)),
                    "test",
                    format!("Event {}", i),
                ))
                .await;
        }

        assert_eq!(trail.len().await, 5);
        assert_eq!(trail.evicted(), 5);
        let entries = trail.entries().await;
        assert!(matches!(
            &entries[0].event_type,
            AuditEventType::Custom(s) if s == "event-5"
        ));
    }

    #[tokio::test]
    async fn test_unbounded_keeps_everything() {
        assert_eq!(AuditLog::unbounded().capacity, usize::MAX);

        let trail = AuditLog::quiet(usize::MAX);
        for i in 0..20_000 {
            trail
                .record(AuditLogEntry::new(
                    AuditEventType::ScopeChanged,
                    "test",
                    format!("Asset {}", i),
                ))
                .await;
        }

        assert_eq!(trail.len().await, 20_000);
        assert_eq!(trail.evicted(), 0);
    }

    #[tokio::test]
    async fn test_json_export() {
        let trail = AuditLog::quiet(100);
        assert!(trail.is_empty().await);

        trail
            .record(
                AuditLogEntry::new(AuditEventType::RunFailed, ACTOR, "Projection build failed")
                    .for_run(Uuid::new_v4())
                    .with_result(AuditResult::Failure("dangling reference".to_string())),
            )
            .await;

        let json = trail.to_json().await.unwrap();
        assert!(json.contains("run_failed"));
        assert!(json.contains("dangling reference"));

        let parsed: Vec<AuditLogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
