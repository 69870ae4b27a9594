//! Asset record model.
//!
//! An asset record is one normalized inventory item: a stable identifier,
//! a mapping of scalar attributes, and where the record came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single inventory item handed to the engine by the ingestion collaborator.
///
/// Attributes are kept in a `BTreeMap` so every walk over them happens in key
/// order and classification never depends on hash iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Identifier that stays stable across re-ingestion.
    #[serde(alias = "asset_id")]
    pub id: String,
    /// Normalized attributes (`network_segment`, `stores_chd`, ...).
    #[serde(default, deserialize_with = "deserialize_attributes")]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Where this record was ingested from.
    #[serde(default)]
    pub source: SourceMetadata,
}

impl AssetRecord {
    /// Creates a record with no attributes.
    pub fn new(id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            source: SourceMetadata::new(origin),
        }
    }

    /// Adds an attribute, replacing any previous value for the key.
    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Looks up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Returns the attribute interpreted as a boolean flag, if it is one.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.attribute(key).and_then(AttributeValue::as_bool)
    }

    /// Display name taken from the `name` attribute, falling back to the id.
    pub fn display_name(&self) -> String {
        match self.attribute("name") {
            Some(AttributeValue::Text(name)) if !name.is_empty() => name.clone(),
            _ => self.id.clone(),
        }
    }
}

/// Origin of an asset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File or feed the record was read from.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// When the ingestion collaborator produced the record.
    #[serde(default = "Utc::now")]
    pub ingested_at: DateTime<Utc>,
}

impl SourceMetadata {
    /// Creates source metadata stamped with the current time.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ingested_at: Utc::now(),
        }
    }
}

impl Default for SourceMetadata {
    fn default() -> Self {
        Self::new(default_origin())
    }
}

fn default_origin() -> String {
    "unknown".to_string()
}

/// Null attributes are treated as absent.
fn deserialize_attributes<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, AttributeValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Option<AttributeValue>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect())
}

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Interprets the value as a boolean.
    ///
    /// Accepts real booleans, `0`/`1`, and the usual textual spellings
    /// (`true`/`false`, `yes`/`no`, `y`/`n`) in any case.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Integer(0) => Some(false),
            AttributeValue::Integer(1) => Some(true),
            AttributeValue::Integer(_) | AttributeValue::Float(_) => None,
            AttributeValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
        }
    }

    /// Interprets the value as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Text(text) => text.trim().parse().ok(),
            AttributeValue::Bool(_) => None,
        }
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Compares two values, treating integers and floats as the same number
    /// and booleans against their textual spellings.
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
            (AttributeValue::Bool(a), other) | (other, AttributeValue::Bool(a)) => {
                other.as_bool() == Some(*a)
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Converts the value to JSON for graph properties.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Integer(i) => serde_json::Value::from(*i),
            AttributeValue::Float(f) => serde_json::Value::from(*f),
            AttributeValue::Text(t) => serde_json::Value::String(t.clone()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Text(t) => write!(f, "{}", t),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_inventory_row() {
        let json = r#"{
            "asset_id": "web-01",
            "attributes": {
                "name": "Checkout web",
                "stores_chd": false,
                "network_segment": "dmz",
                "open_ports": 3,
                "cpu_load": 0.5,
                "owner": null
            },
            "source": {"origin": "inventory.csv", "ingested_at": "2026-01-05T10:00:00Z"}
        }"#;

        let asset: AssetRecord = serde_json::from_str(json).unwrap();
        assert_eq!(asset.id, "web-01");
        assert_eq!(asset.flag("stores_chd"), Some(false));
        assert_eq!(
            asset.attribute("network_segment"),
            Some(&AttributeValue::Text("dmz".to_string()))
        );
        assert_eq!(asset.attribute("open_ports"), Some(&AttributeValue::Integer(3)));
        assert_eq!(asset.attribute("cpu_load"), Some(&AttributeValue::Float(0.5)));
        assert!(asset.attribute("owner").is_none());
        assert_eq!(asset.source.origin, "inventory.csv");
        assert_eq!(asset.display_name(), "Checkout web");
    }

    #[test]
    fn test_missing_source_defaults() {
        let asset: AssetRecord = serde_json::from_str(r#"{"id": "db-01"}"#).unwrap();
        assert_eq!(asset.source.origin, "unknown");
        assert!(asset.attributes.is_empty());
        assert_eq!(asset.display_name(), "db-01");
    }

    #[test]
    fn test_textual_booleans() {
        assert_eq!(AttributeValue::from("Yes").as_bool(), Some(true));
        assert_eq!(AttributeValue::from("FALSE").as_bool(), Some(false));
        assert_eq!(AttributeValue::Integer(1).as_bool(), Some(true));
        assert_eq!(AttributeValue::Integer(7).as_bool(), None);
        assert_eq!(AttributeValue::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_loose_equality() {
        assert!(AttributeValue::Integer(2).loosely_equals(&AttributeValue::Float(2.0)));
        assert!(AttributeValue::Bool(true).loosely_equals(&AttributeValue::from("true")));
        assert!(AttributeValue::from("cde").loosely_equals(&AttributeValue::from("cde")));
        assert!(!AttributeValue::from("cde").loosely_equals(&AttributeValue::from("CDE")));
        assert!(!AttributeValue::from("3").loosely_equals(&AttributeValue::Bool(true)));
    }
}
