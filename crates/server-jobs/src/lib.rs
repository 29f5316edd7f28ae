// crates/server-jobs/src/lib.rs
//! Live status of in-flight pipeline runs.
//!
//! Provides:
//! - `StatusTable` - concurrent project → status map with event broadcast
//! - `AdmissionGuard` - single-flight token, one pipeline per project
//! - `JobStatus` / `JobSnapshot` / `JobEvent` - wire types for the HTTP layer

pub mod table;
pub mod types;

pub use table::{AdmissionGuard, StatusTable};
pub use types::{JobEvent, JobSnapshot, JobStatus};
