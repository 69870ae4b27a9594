//! Configuration loading for the Scopekeeper CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Where run results are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Saves configuration to a file, creating its directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Catalog to use when none is given on the command line.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.path.as_ref().map(PathBuf::from)
    }
}

/// Catalog configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to a catalog YAML. The shipped default catalog is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

/// Output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default path for the graph projection JSON.
    #[serde(default)]
    pub projection_path: Option<String>,

    /// Default path for the compliance ledger JSON.
    #[serde(default)]
    pub ledger_path: Option<String>,

    /// Where to export the run's audit trail, if anywhere.
    #[serde(default)]
    pub audit_path: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format.
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.catalog_path().is_none());
        assert!(config.output.ledger_path.is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
catalog:
  path: /etc/scopekeeper/catalog.yaml

output:
  projection_path: out/projection.json
  ledger_path: out/ledger.json

logging:
  level: debug
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.catalog_path(),
            Some(PathBuf::from("/etc/scopekeeper/catalog.yaml"))
        );
        assert_eq!(
            config.output.ledger_path.as_deref(),
            Some("out/ledger.json")
        );
        assert!(config.output.audit_path.is_none());
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json_format);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.output.projection_path = Some("projection.json".to_string());
        config.logging.json_format = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scopekeeper/config.yaml");

        AppConfig::default().save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
