use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::directory::UserId;
use crate::domain::document::DocumentId;
use crate::domain::role::RoleTag;

pub const AUTO_SKIP_COMMENT: &str = "auto-skipped: approver not found";
pub const AUTO_APPROVAL_USER_AGENT: &str = "auto-approval system";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalStepId(pub String);

impl ApprovalStepId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalLogId(pub String);

impl ApprovalLogId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    AutoApproved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::AutoApproved => "auto_approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "auto_approved" => Some(Self::AutoApproved),
            "rejected" => Some(Self::Rejected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub document_id: DocumentId,
    pub step_order: u32,
    pub role_required: RoleTag,
    pub approver: Option<UserId>,
    pub status: StepStatus,
    pub deadline: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl ApprovalStep {
    pub fn is_assigned_to(&self, user: &UserId) -> bool {
        self.approver.as_ref() == Some(user)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
    AutoApproved,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AutoApproved => "auto_approved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "auto_approved" => Some(Self::AutoApproved),
            _ => None,
        }
    }
}

/// Request metadata captured alongside a human action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMetadata {
    pub fn system(user_agent: &str) -> Self {
        Self { ip_address: None, user_agent: Some(user_agent.to_string()) }
    }
}

/// Append-only audit entry for one action taken on a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLog {
    pub id: ApprovalLogId,
    pub document_id: DocumentId,
    pub step_id: ApprovalStepId,
    pub actor: Option<UserId>,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub client: ClientMetadata,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ApprovalAction, StepStatus};

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        for status in [
            StepStatus::Approved,
            StepStatus::AutoApproved,
            StepStatus::Rejected,
            StepStatus::Skipped,
        ] {
            assert!(status.is_terminal());
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn actions_parse_storage_names() {
        assert_eq!(ApprovalAction::parse("auto_approved"), Some(ApprovalAction::AutoApproved));
        assert_eq!(ApprovalAction::parse("skipped"), None);
    }
}
