//! # sk-observability
//!
//! Logging, metrics, and audit infrastructure for Scopekeeper.
//!
//! This crate provides structured logging with tracing, run metrics and KPIs,
//! and an audit trail of scope and remediation events.

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditEventType, AuditFilter, AuditLog, AuditLogEntry, AuditResult};
pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::{MetricsCollector, KPIs};
