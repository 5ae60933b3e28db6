pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use chrono;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::approval::{
    ApprovalAction, ApprovalLog, ApprovalLogId, ApprovalStep, ApprovalStepId, ClientMetadata,
    StepStatus,
};
pub use domain::directory::{DirectoryUser, OrgScope, UserId};
pub use domain::document::{
    Document, DocumentContext, DocumentId, DocumentStatus, NewDocument, VerificationCode,
};
pub use domain::document_type::{DocumentType, DocumentTypeId};
pub use domain::role::RoleTag;
pub use errors::{InterfaceError, WorkflowError};
pub use notify::{CompletionHook, DeliveryError, NotificationGateway, TracingNotifier};
pub use workflow::{
    ApprovalOutcome, ApproverResolver, Directory, DocumentWorkflow, ReminderPolicy, ReminderTier,
    WorkflowEffect, WorkflowPolicy,
};
