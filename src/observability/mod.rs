//! Audit trail and structured logging

pub mod audit;
pub mod logging;

pub use audit::{AuditEntry, AuditLog, Direction};
pub use logging::{init_from_env, init_logging, LogFormat, LogOutput, LoggingConfig};
