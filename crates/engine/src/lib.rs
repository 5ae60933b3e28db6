//! The workflow engine service.
//!
//! Wraps the pure state machine from `docflow-core` with storage, a
//! per-document lock, and post-commit notification dispatch. Scheduled
//! sweeps run through [`JobTracker`] so every run leaves a `job_run` row.

mod effects;
pub mod jobs;
pub mod locks;
mod reminders;
pub mod service;
mod sweeps;

pub use docflow_db::repositories::{DocumentHistory, PendingApproval};
pub use jobs::{JobTask, JobTracker, SweepReport};
pub use locks::{DocumentGuard, DocumentLocks};
pub use reminders::ReminderReport;
pub use service::{
    ActionReceipt, ApprovalCommand, RejectCommand, WorkflowEngine, WorkflowEngineBuilder,
};
pub use sweeps::{AutoApproveReport, SkipSweepReport};
