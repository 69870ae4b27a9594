//! Scopekeeper CLI
//!
//! Command-line driver for PCI DSS scope classification and control mapping.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sk_observability::LoggingConfig;
use sk_policy::{load_catalog, DEFAULT_CATALOG_YAML};
use std::path::PathBuf;

mod commands;
mod config;
mod validator;

use commands::{execute_run, print_run_report, RunArgs};
use config::AppConfig;
use validator::CatalogValidator;

#[derive(Parser)]
#[command(name = "scopekeeper")]
#[command(author = "Scopekeeper Team")]
#[command(version)]
#[command(about = "PCI DSS scope classification and control mapping", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an inventory, map controls and plan remediation
    Run {
        /// Inventory JSON (list of asset records)
        #[arg(short, long, value_name = "FILE")]
        inventory: PathBuf,

        /// Catalog YAML (defaults to the shipped catalog)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// DLP findings JSON
        #[arg(long, value_name = "FILE")]
        findings: Option<PathBuf>,

        /// Ledger JSON, read before and written after the run
        #[arg(short, long, value_name = "FILE")]
        ledger: Option<PathBuf>,

        /// Where to write the graph projection JSON
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Validate a catalog file
    Validate {
        /// Catalog YAML to validate
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,
    },

    /// Print the default catalog
    Catalog,

    /// Show the effective configuration
    Config {
        /// Print every setting, not only the file location
        #[arg(long)]
        show: bool,

        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let (config, config_loaded) = match AppConfig::load(&config_path) {
        Ok(config) => (config, true),
        Err(e) => {
            if cli.verbose {
                eprintln!("Using default configuration ({:#})", e);
            }
            (AppConfig::default(), false)
        }
    };

    // Initialize logging
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        LoggingConfig::parse_level(&config.logging.level).unwrap_or(tracing::Level::INFO)
    };

    sk_observability::init_logging_with_config(LoggingConfig {
        level: log_level,
        json_format: config.logging.json_format || cli.format == OutputFormat::Json,
        ..Default::default()
    });

    // Execute command
    match cli.command {
        Commands::Run {
            inventory,
            catalog,
            findings,
            ledger,
            output,
        } => {
            cmd_run(
                RunArgs {
                    inventory,
                    catalog,
                    findings,
                    ledger,
                    output,
                },
                &config,
                cli.format,
            )
            .await
        }
        Commands::Validate { catalog } => cmd_validate(catalog, cli.format),
        Commands::Catalog => cmd_catalog(),
        Commands::Config { show, init } => {
            if init {
                cmd_config_init(&config_path)
            } else {
                cmd_config(&config, &config_path, config_loaded, show, cli.format)
            }
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "scopekeeper", "scopekeeper") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/scopekeeper.yaml")
    }
}

async fn cmd_run(args: RunArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let report = match execute_run(args, config).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: {:#}", "Run failed".red().bold(), e);
            std::process::exit(1);
        }
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }

    Ok(())
}

fn cmd_validate(catalog_path: PathBuf, format: OutputFormat) -> Result<()> {
    let catalog = match load_catalog(&catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("{}: {}", "Catalog file error".red().bold(), e);
            std::process::exit(1);
        }
    };

    let validation_result = CatalogValidator::validate(&catalog);

    if format == OutputFormat::Json {
        let report = serde_json::json!({
            "catalog": catalog_path,
            "accepted_rules": catalog.rules.len(),
            "accepted_controls": catalog.controls.len(),
            "rejected": catalog.rejected,
            "errors": validation_result.errors,
            "warnings": validation_result.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Validating catalog: {}",
            catalog_path.display().to_string().cyan()
        );
        validation_result.print();

        println!();
        println!("{}", "Catalog Summary".bold());
        println!("───────────────");
        println!("  Rules accepted:    {}", catalog.rules.len());
        println!("  Controls accepted: {}", catalog.controls.len());
        println!("  Entries rejected:  {}", catalog.rejected.len());

        println!();
        if validation_result.has_errors() {
            println!(
                "{}",
                "Catalog has rejected entries. Fix the errors above."
                    .red()
                    .bold()
            );
        } else if validation_result.has_warnings() {
            println!(
                "{}",
                "Catalog is valid with warnings. Review the warnings above."
                    .yellow()
                    .bold()
            );
        } else {
            println!("{}", "Catalog is valid.".green().bold());
        }
    }

    if validation_result.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_catalog() -> Result<()> {
    print!("{}", DEFAULT_CATALOG_YAML);
    Ok(())
}

fn cmd_config_init(config_path: &std::path::Path) -> Result<()> {
    if config_path.exists() {
        eprintln!(
            "{}: {} already exists",
            "Not overwriting".yellow().bold(),
            config_path.display()
        );
        std::process::exit(1);
    }

    AppConfig::default().save(config_path)?;
    println!(
        "{} Wrote default configuration to {}",
        "✓".green(),
        config_path.display()
    );
    Ok(())
}

fn cmd_config(
    config: &AppConfig,
    config_path: &std::path::Path,
    loaded: bool,
    show: bool,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        let mut value = serde_json::json!({
            "path": config_path,
            "loaded": loaded,
        });
        if show {
            value["config"] = serde_json::to_value(config)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Current Configuration".bold());
    println!("─────────────────────────");
    let source = if loaded {
        "loaded".green()
    } else {
        "not found, using defaults".yellow()
    };
    println!("File: {} ({})", config_path.display(), source);

    if show {
        println!();
        print!("{}", serde_yaml::to_string(config)?);
    } else {
        println!(
            "Catalog: {}",
            config.catalog.path.as_deref().unwrap_or("<default>")
        );
    }

    Ok(())
}
