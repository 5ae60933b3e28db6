pub mod aggregate;
pub mod reminders;
pub mod resolver;

pub use aggregate::{
    ApprovalOutcome, DocumentWorkflow, SkipPass, Transition, WorkflowEffect, WorkflowPolicy,
};
pub use reminders::{
    DueStep, QuietHours, ReminderBatch, ReminderPlan, ReminderPolicy, ReminderTier,
    SuppressedBatch, Suppression,
};
pub use resolver::{
    ApproverResolver, Directory, DirectoryError, HolderScope, InMemoryDirectory,
    ResolutionContext, ResolutionRule,
};
