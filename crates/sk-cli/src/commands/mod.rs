//! CLI command implementations.

pub mod report;
pub mod run;

pub use report::print_run_report;
pub use run::{execute_run, RunArgs, RunReport};
