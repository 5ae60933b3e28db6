use thiserror::Error;

use crate::domain::approval::StepStatus;

/// Failures surfaced by workflow operations to their immediate caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("user `{actor}` is not the assigned approver for step {step_order}")]
    Forbidden { actor: String, step_order: u32 },
    #[error("step {step_order} is already {status}")]
    Conflict { step_order: u32, status: StepStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Structural errors are expected outcomes of user input or races; the
    /// rest indicate the platform is unhealthy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Forbidden { .. } | Self::Conflict { .. } | Self::Validation(_)
        )
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
            Self::Integration(_) => "integration",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Validation(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::Forbidden { .. } => InterfaceError::Forbidden { message, correlation_id },
            Self::Conflict { .. } => InterfaceError::Conflict { message, correlation_id },
            Self::Storage(_) | Self::Integration(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The document or approval step could not be found.",
            Self::Forbidden { .. } => "You are not the assigned approver for this step.",
            Self::Conflict { .. } => {
                "This step has already been handled. Refresh to see the latest state."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}
