//! Catalog validation for Scopekeeper.
//!
//! Turns a loaded catalog into a list of errors and warnings an operator can
//! act on before running against real inventory.

use colored::Colorize;
use serde::Serialize;
use sk_policy::LoadedCatalog;

/// Result of catalog validation.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    /// Entries that were rejected.
    pub errors: Vec<String>,
    /// Problems that do not block a run.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Creates a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Catalog Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Rejected Entries:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Catalog OK", "✓".green());
        }
    }
}

/// Validates a loaded catalog.
pub struct CatalogValidator;

impl CatalogValidator {
    pub fn validate(catalog: &LoadedCatalog) -> ValidationResult {
        let mut result = ValidationResult::new();

        for rejected in &catalog.rejected {
            result.add_error(rejected.to_string());
        }

        Self::validate_rules(catalog, &mut result);
        Self::validate_controls(catalog, &mut result);

        if catalog.scope_note.is_none() {
            result.add_warning("No scope_note set; reports will carry no scoping caveat");
        }

        result
    }

    fn validate_rules(catalog: &LoadedCatalog, result: &mut ValidationResult) {
        if catalog.rules.is_empty() {
            result.add_warning("No scope rules accepted; every asset will be INDETERMINATE");
            return;
        }

        let deciding = catalog
            .rules
            .rules()
            .iter()
            .filter(|r| r.enabled && !r.additive)
            .count();
        if deciding == 0 {
            result.add_warning(
                "No enabled deciding rule; additive rules alone never settle a verdict",
            );
        }

        for rule in catalog.rules.rules().iter().filter(|r| !r.enabled) {
            result.add_warning(format!("Rule '{}' is disabled", rule.id));
        }
    }

    fn validate_controls(catalog: &LoadedCatalog, result: &mut ValidationResult) {
        if catalog.controls.is_empty() {
            result.add_warning("No controls accepted; in-scope assets will map to nothing");
        }
    }
}
