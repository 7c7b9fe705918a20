//! # Monitoring Handler
//!
//! Lambda-style entry point of the RDS Operations Dashboard error-resolution
//! core. Owns the process context, routes operations to the engines, runs
//! the classify / resolve / alert / record pipeline and keeps the audit trail.

pub mod audit;
pub mod context;
pub mod handler;
pub mod pipeline;

pub use audit::{AuditEvent, AuditEventKind, AuditLogger, AuditStatistics, AUDIT_TABLE};
pub use context::{Backends, ProcessContext};
pub use handler::{cors_headers, handle_event, LambdaResponse, Operation};
pub use pipeline::{process_error, process_escalations, PipelineOutcome};
