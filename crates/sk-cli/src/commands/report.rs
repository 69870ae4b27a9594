//! Console rendering of a finished run.

use colored::{ColoredString, Colorize};
use sk_core::{ComplianceStatus, RemediationPriority, ScopeVerdict};

use super::run::RunReport;

/// Prints a run report for an operator.
pub fn print_run_report(report: &RunReport) {
    let summary = &report.summary;

    println!("{}", "Compliance Run".bold());
    println!("──────────────");
    println!("Run:      {}", summary.run_id);
    println!("Duration: {:.3}s", summary.duration_seconds());
    println!("Assets:   {}", summary.asset_count);

    println!("\n{}", "Scope".bold());
    for verdict in [
        ScopeVerdict::InScope,
        ScopeVerdict::OutOfScope,
        ScopeVerdict::Indeterminate,
    ] {
        println!(
            "  {:<14} {}",
            verdict_label(verdict),
            summary.verdict_count(verdict)
        );
    }
    if !summary.indeterminate_assets.is_empty() {
        println!("  {} Needs review:", "⚠".yellow());
        for asset_id in &summary.indeterminate_assets {
            println!("    - {}", asset_id);
        }
    }
    for change in &summary.scope_changes {
        println!(
            "  {} {}: {} → {}",
            "↻".cyan(),
            change.asset_id,
            verdict_label(change.from),
            verdict_label(change.to)
        );
    }

    if !summary.mapping_status.is_empty() {
        println!("\n{}", "Controls (in-scope assets)".bold());
        for (status, count) in &summary.mapping_status {
            println!("  {:<14} {}", status_label(*status), count);
        }
    }

    println!("\n{}", "Remediation".bold());
    if summary.remediation_count() == 0 {
        println!("  {} No open gaps", "✓".green());
    } else {
        for priority in [
            RemediationPriority::Critical,
            RemediationPriority::High,
            RemediationPriority::Medium,
            RemediationPriority::Low,
        ] {
            let count = summary.priority_count(priority);
            if count > 0 {
                println!("  {:<14} {}", priority_label(priority), count);
            }
        }
    }
    if summary.archived > 0 {
        println!("  Archived:      {}", summary.archived);
    }

    if !summary.rejected_entries.is_empty() {
        println!("\n{}", "Rejected Catalog Entries".red().bold());
        for rejected in &summary.rejected_entries {
            println!("  {} {}", "✗".red(), rejected);
        }
    }

    if let Some(reason) = &report.findings_error {
        println!("\n{}", "DLP Findings Ignored".yellow().bold());
        println!("  {} {}", "⚠".yellow(), reason);
    }

    if !summary.unmatched_findings.is_empty() {
        println!("\n{}", "Unmatched DLP Findings".yellow().bold());
        for asset_id in &summary.unmatched_findings {
            println!("  {} {}", "⚠".yellow(), asset_id);
        }
    }

    if report.review_items > 0 {
        println!(
            "\n{} {} audit entries await review",
            "⚠".yellow(),
            report.review_items
        );
    }

    let outputs = [
        ("Projection", &report.projection_path),
        ("Ledger", &report.ledger_path),
        ("Audit", &report.audit_path),
    ];
    if outputs.iter().any(|(_, path)| path.is_some()) {
        println!("\n{}", "Written".bold());
        for (label, path) in outputs {
            if let Some(path) = path {
                println!("  {} {}: {}", "→".green(), label, path.display());
            }
        }
    }

    if let Some(note) = &summary.scope_note {
        println!("\n{}", note.dimmed());
    }
}

fn verdict_label(verdict: ScopeVerdict) -> ColoredString {
    let label = verdict.to_string();
    match verdict {
        ScopeVerdict::InScope => label.red(),
        ScopeVerdict::OutOfScope => label.green(),
        ScopeVerdict::Indeterminate => label.yellow(),
    }
}

fn status_label(status: ComplianceStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        ComplianceStatus::Met => label.green(),
        ComplianceStatus::Partial => label.yellow(),
        ComplianceStatus::NotMet => label.red(),
        ComplianceStatus::NotApplicable => label.dimmed(),
    }
}

fn priority_label(priority: RemediationPriority) -> ColoredString {
    let label = priority.to_string();
    match priority {
        RemediationPriority::Critical => label.red().bold(),
        RemediationPriority::High => label.red(),
        RemediationPriority::Medium => label.yellow(),
        RemediationPriority::Low => label.normal(),
    }
}
