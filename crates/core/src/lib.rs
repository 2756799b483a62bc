//! Core library: validation, type dispatch, archive recursion, copy
//! integrity and the audit log of a USB sanitising run.

pub mod archive;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod fs_apply;
pub mod integrity;
pub mod models;
pub mod pipeline;
pub mod policy;

pub use audit::{AuditLog, FileReport, MemoryAuditLog, TextAuditLog};
pub use config::GroomerConfig;
pub use models::{FileRecord, SafetyState};
pub use pipeline::{GroomSummary, Groomer};
