//! DLP findings overlay.
//!
//! Data-loss-prevention scans report whether sensitive data was found on an
//! asset. Findings are folded into the asset attributes before
//! classification so that scope rules can reference `sensitive_found`.

use super::asset::{AssetRecord, AttributeValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute written by the overlay.
pub const SENSITIVE_FOUND: &str = "sensitive_found";

/// One DLP scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlpFinding {
    /// Asset the finding belongs to.
    pub asset_id: String,
    /// Whether the scan found sensitive data.
    pub sensitive_found: bool,
}

/// Records produced by applying findings, plus findings that matched nothing.
#[derive(Debug, Clone)]
pub struct DlpOverlay {
    pub assets: Vec<AssetRecord>,
    pub unmatched: Vec<String>,
}

/// Applies DLP findings to a batch of not-yet-classified records.
///
/// A finding overrides the asset's `sensitive_found` attribute. Assets with no
/// finding and no existing attribute get `sensitive_found = false`. When several
/// findings target one asset, any positive finding wins.
pub fn apply_dlp_findings(assets: Vec<AssetRecord>, findings: &[DlpFinding]) -> DlpOverlay {
    let mut by_asset: BTreeMap<&str, bool> = BTreeMap::new();
    for finding in findings {
        let entry = by_asset.entry(finding.asset_id.as_str()).or_insert(false);
        *entry |= finding.sensitive_found;
    }

    let known: BTreeSet<&str> = assets.iter().map(|a| a.id.as_str()).collect();
    let unmatched = by_asset
        .keys()
        .filter(|id| !known.contains(*id))
        .map(|id| id.to_string())
        .collect();

    let assets = assets
        .into_iter()
        .map(|mut asset| {
            match by_asset.get(asset.id.as_str()) {
                Some(found) => {
                    asset
                        .attributes
                        .insert(SENSITIVE_FOUND.to_string(), AttributeValue::Bool(*found));
                }
                None => {
                    asset
                        .attributes
                        .entry(SENSITIVE_FOUND.to_string())
                        .or_insert(AttributeValue::Bool(false));
                }
            }
            asset
        })
        .collect();

    DlpOverlay { assets, unmatched }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, found: bool) -> DlpFinding {
        DlpFinding {
            asset_id: id.to_string(),
            sensitive_found: found,
        }
    }

    #[test]
    fn test_overlay_sets_flag() {
        let assets = vec![
            AssetRecord::new("a1", "inventory.json"),
            AssetRecord::new("a2", "inventory.json").with_attribute(SENSITIVE_FOUND, true),
            AssetRecord::new("a3", "inventory.json"),
        ];
        let findings = vec![finding("a1", true), finding("a2", false)];

        let overlay = apply_dlp_findings(assets, &findings);
        assert!(overlay.unmatched.is_empty());
        assert_eq!(overlay.assets[0].flag(SENSITIVE_FOUND), Some(true));
        assert_eq!(overlay.assets[1].flag(SENSITIVE_FOUND), Some(false));
        assert_eq!(overlay.assets[2].flag(SENSITIVE_FOUND), Some(false));
    }

    #[test]
    fn test_existing_flag_kept_without_finding() {
        let assets =
            vec![AssetRecord::new("a1", "inventory.json").with_attribute(SENSITIVE_FOUND, true)];
        let overlay = apply_dlp_findings(assets, &[]);
        assert_eq!(overlay.assets[0].flag(SENSITIVE_FOUND), Some(true));
    }

    #[test]
    fn test_unmatched_and_positive_wins() {
        let assets = vec![AssetRecord::new("a1", "inventory.json")];
        let findings = vec![
            finding("a1", false),
            finding("a1", true),
            finding("ghost", true),
        ];

        let overlay = apply_dlp_findings(assets, &findings);
        assert_eq!(overlay.unmatched, vec!["ghost".to_string()]);
        assert_eq!(overlay.assets[0].flag(SENSITIVE_FOUND), Some(true));
    }
}
