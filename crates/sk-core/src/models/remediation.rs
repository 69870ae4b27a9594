//! Remediation items and their archive.

use super::mapping::ComplianceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Joins asset and control ids into a remediation id. Neither id may contain it.
pub const ID_SEPARATOR: &str = "::";

/// Urgency of a remediation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RemediationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationPriority::Low => write!(f, "LOW"),
            RemediationPriority::Medium => write!(f, "MEDIUM"),
            RemediationPriority::High => write!(f, "HIGH"),
            RemediationPriority::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Lifecycle of a remediation item. Persists across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

impl fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationStatus::Open => write!(f, "OPEN"),
            RemediationStatus::InProgress => write!(f, "IN_PROGRESS"),
            RemediationStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// A proposed corrective action for one non-MET control mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationItem {
    /// Derived from the mapping, so reruns produce the same id.
    pub id: String,
    pub asset_id: String,
    pub control_id: String,
    /// Status of the mapping this item remediates.
    pub mapping_status: ComplianceStatus,
    /// Recommended action.
    pub action: String,
    pub priority: RemediationPriority,
    pub status: RemediationStatus,
}

impl RemediationItem {
    /// Creates an OPEN item.
    pub fn new(
        asset_id: &str,
        control_id: &str,
        mapping_status: ComplianceStatus,
        action: String,
        priority: RemediationPriority,
    ) -> Self {
        Self {
            id: Self::item_id(asset_id, control_id),
            asset_id: asset_id.to_string(),
            control_id: control_id.to_string(),
            mapping_status,
            action,
            priority,
            status: RemediationStatus::Open,
        }
    }

    /// Stable id for the item remediating `control_id` on `asset_id`.
    ///
    /// Unique only while neither id contains [`ID_SEPARATOR`]; see
    /// [`RemediationItem::is_valid_key`].
    pub fn item_id(asset_id: &str, control_id: &str) -> String {
        format!("{}{}{}", asset_id, ID_SEPARATOR, control_id)
    }

    /// Whether `id` can take part in a remediation id.
    pub fn is_valid_key(id: &str) -> bool {
        !id.contains(ID_SEPARATOR)
    }

    /// Compares everything except the lifecycle status.
    pub fn same_content(&self, other: &RemediationItem) -> bool {
        self.id == other.id
            && self.mapping_status == other.mapping_status
            && self.action == other.action
            && self.priority == other.priority
    }
}

/// Default report order: priority descending, then control id, then asset id.
pub fn default_order(a: &RemediationItem, b: &RemediationItem) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.control_id.cmp(&b.control_id))
        .then_with(|| a.asset_id.cmp(&b.asset_id))
}

/// Sorts items into the default report order.
pub fn sort_default(items: &mut [RemediationItem]) {
    items.sort_by(default_order);
}

/// Why a remediation item left the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    /// The asset's scope verdict changed.
    ScopeChanged,
    /// The control mapping is now MET.
    ControlSatisfied,
    /// The control mapping is now NOT_APPLICABLE.
    ControlNotApplicable,
    /// The control no longer maps to the asset.
    ControlRemoved,
    /// The asset was absent from the latest inventory.
    AssetRemoved,
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveReason::ScopeChanged => write!(f, "scope changed"),
            ArchiveReason::ControlSatisfied => write!(f, "control satisfied"),
            ArchiveReason::ControlNotApplicable => write!(f, "control not applicable"),
            ArchiveReason::ControlRemoved => write!(f, "control no longer mapped"),
            ArchiveReason::AssetRemoved => write!(f, "asset removed from inventory"),
        }
    }
}

/// A remediation item kept for audit after it stopped being live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRemediation {
    pub item: RemediationItem,
    /// Run that archived the item.
    pub run_id: Uuid,
    pub archived_at: DateTime<Utc>,
    pub reason: ArchiveReason,
}

impl ArchivedRemediation {
    pub fn new(item: RemediationItem, run_id: Uuid, reason: ArchiveReason) -> Self {
        Self {
            item,
            run_id,
            archived_at: Utc::now(),
            reason,
        }
    }
}
