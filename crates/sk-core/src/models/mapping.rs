//! Control mappings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compliance status of one asset against one control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Met,
    Partial,
    NotMet,
    NotApplicable,
}

impl ComplianceStatus {
    /// Whether the status calls for remediation.
    pub fn is_gap(&self) -> bool {
        matches!(self, ComplianceStatus::Partial | ComplianceStatus::NotMet)
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Met => write!(f, "MET"),
            ComplianceStatus::Partial => write!(f, "PARTIAL"),
            ComplianceStatus::NotMet => write!(f, "NOT_MET"),
            ComplianceStatus::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

/// Links an asset to a control it must satisfy.
///
/// Ordering is by asset id, then control id, which is the canonical order
/// used when mappings are reconstructed from a projection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlMapping {
    pub asset_id: String,
    pub control_id: String,
    pub status: ComplianceStatus,
}

impl ControlMapping {
    pub fn new(
        asset_id: impl Into<String>,
        control_id: impl Into<String>,
        status: ComplianceStatus,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            control_id: control_id.into(),
            status,
        }
    }
}
