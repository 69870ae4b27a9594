//! YAML catalog loader.
//!
//! A catalog document carries the scope rules, the control catalog and an
//! optional scope note for reports:
//!
//! ```yaml
//! scope_note: "..."
//! rules:
//!   - id: stores-chd
//!     additive: true
//!     conditions: [{ is_true: stores_chd }]
//!     justification: stores CHD
//! controls:
//!   - id: REQ-03
//!     title: Encrypt stored cardholder data
//!     core_requirement: true
//!     evidence: [{ is_true: encryption_at_rest }]
//!     remediation: Enable DB/disk encryption with KMS.
//! ```
//!
//! `${VAR}` references are substituted from the environment before parsing.
//! Entries are deserialized and validated one at a time; a malformed entry is
//! rejected and recorded without failing the load.

use crate::classifier::RuleSet;
use crate::controls::{Control, ControlCatalog};
use crate::rules::ScopeRule;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

/// The catalog shipped with Scopekeeper.
pub const DEFAULT_CATALOG_YAML: &str = include_str!("../catalog/default.yaml");

/// Errors that fail a catalog load as a whole.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML catalog: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid catalog structure: {0}")]
    InvalidStructure(String),
}

/// Kind of a rejected catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "MALFORMED_RULE")]
    Rule,
    #[serde(rename = "MALFORMED_CONTROL")]
    Control,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Rule => write!(f, "MALFORMED_RULE"),
            EntryKind::Control => write!(f, "MALFORMED_CONTROL"),
        }
    }
}

/// A catalog entry that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub kind: EntryKind,
    /// Position in its `rules` or `controls` list.
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl fmt::Display for RejectedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} #{} ({}): {}", self.kind, self.index, id, self.reason),
            None => write!(f, "{} #{}: {}", self.kind, self.index, self.reason),
        }
    }
}

/// A parsed catalog.
#[derive(Debug, Clone, Default)]
pub struct LoadedCatalog {
    pub rules: RuleSet,
    pub controls: ControlCatalog,
    pub rejected: Vec<RejectedEntry>,
    /// Free-text scoping note for reports.
    pub scope_note: Option<String>,
}

impl LoadedCatalog {
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Loads a catalog from a YAML (or JSON) file.
pub fn load_catalog(path: &Path) -> Result<LoadedCatalog, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    let catalog = parse_catalog(&content)?;
    info!(
        path = %path.display(),
        rules = catalog.rules.len(),
        controls = catalog.controls.len(),
        rejected = catalog.rejected.len(),
        "Loaded catalog"
    );
    Ok(catalog)
}

/// Parses the shipped default catalog.
pub fn default_catalog() -> Result<LoadedCatalog, CatalogError> {
    parse_catalog(DEFAULT_CATALOG_YAML)
}

/// Parses a catalog document.
pub fn parse_catalog(content: &str) -> Result<LoadedCatalog, CatalogError> {
    let content = substitute_env_vars(content)?;
    let document: serde_yaml::Value = serde_yaml::from_str(&content)?;

    let document = match document {
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        serde_yaml::Value::Mapping(map) => map,
        _ => {
            return Err(CatalogError::InvalidStructure(
                "catalog document must be a mapping".to_string(),
            ))
        }
    };

    let scope_note = match document.get("scope_note") {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(note)) => Some(note.trim().to_string()),
        Some(_) => {
            return Err(CatalogError::InvalidStructure(
                "scope_note must be a string".to_string(),
            ))
        }
    };

    let mut rejected = Vec::new();

    let rules: Vec<ScopeRule> = parse_entries(
        section(&document, "rules")?,
        EntryKind::Rule,
        |rule: &ScopeRule| (rule.id.clone(), rule.validate()),
        &mut rejected,
    );

    let controls: Vec<Control> = parse_entries(
        section(&document, "controls")?,
        EntryKind::Control,
        |control: &Control| (control.id.clone(), control.validate()),
        &mut rejected,
    );

    Ok(LoadedCatalog {
        rules: RuleSet::new(rules),
        controls: controls.into_iter().collect(),
        rejected,
        scope_note,
    })
}

fn section<'a>(
    document: &'a serde_yaml::Mapping,
    key: &str,
) -> Result<&'a [serde_yaml::Value], CatalogError> {
    match document.get(key) {
        None | Some(serde_yaml::Value::Null) => Ok(&[]),
        Some(serde_yaml::Value::Sequence(entries)) => Ok(entries.as_slice()),
        Some(_) => Err(CatalogError::InvalidStructure(format!(
            "'{}' must be a list",
            key
        ))),
    }
}

/// Deserializes and validates each entry, rejecting malformed and duplicate ones.
///
/// Entries go through `serde_json::Value` so that externally tagged predicate
/// enums accept the plain `{ is_true: attr }` mapping form.
fn parse_entries<T, F>(
    entries: &[serde_yaml::Value],
    kind: EntryKind,
    check: F,
    rejected: &mut Vec<RejectedEntry>,
) -> Vec<T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> (String, Result<(), String>),
{
    let mut seen = BTreeSet::new();
    let mut accepted = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let declared_id = entry
            .get("id")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string);

        let parsed = serde_json::to_value(entry)
            .and_then(serde_json::from_value::<T>)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                let (id, validation) = check(&value);
                validation?;
                if !seen.insert(id.clone()) {
                    return Err(format!("duplicate identifier '{}'", id));
                }
                Ok(value)
            });

        match parsed {
            Ok(value) => accepted.push(value),
            Err(reason) => {
                warn!(
                    kind = %kind,
                    index,
                    id = declared_id.as_deref().unwrap_or("<none>"),
                    reason = %reason,
                    "Rejected catalog entry"
                );
                rejected.push(RejectedEntry {
                    kind,
                    index,
                    id: declared_id,
                    reason,
                });
            }
        }
    }

    accepted
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex for env vars")
    })
}

/// Substitutes `${VAR}` references with environment values.
fn substitute_env_vars(input: &str) -> Result<String, CatalogError> {
    let mut missing = Vec::new();

    let result = env_var_pattern().replace_all(input, |caps: &regex::Captures<'_>| {
        match env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(CatalogError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result.into_owned())
}
