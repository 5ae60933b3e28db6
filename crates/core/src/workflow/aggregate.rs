//! The document approval state machine.
//!
//! [`DocumentWorkflow`] owns a document together with its ordered steps and
//! applies every transition in memory. Callers persist the result and then
//! act on the returned [`WorkflowEffect`]s once the change is durable.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::domain::approval::{
    ApprovalAction, ApprovalLog, ApprovalLogId, ApprovalStep, ApprovalStepId, ClientMetadata,
    StepStatus, AUTO_APPROVAL_USER_AGENT, AUTO_SKIP_COMMENT,
};
use crate::domain::directory::UserId;
use crate::domain::document::{Document, DocumentStatus};
use crate::domain::document_type::DocumentType;
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowPolicy {
    pub default_deadline_hours: u32,
    pub reject_reason_min_chars: usize,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

impl From<&WorkflowConfig> for WorkflowPolicy {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            default_deadline_hours: config.default_deadline_hours,
            reject_reason_min_chars: config.reject_reason_min_chars,
        }
    }
}

impl WorkflowPolicy {
    pub fn deadline_hours_for(&self, document_type: &DocumentType) -> u32 {
        document_type.deadline_hours_or(self.default_deadline_hours)
    }

    pub fn validate_reject_reason(&self, reason: &str) -> Result<(), WorkflowError> {
        let length = reason.trim().chars().count();
        if length < self.reject_reason_min_chars {
            return Err(WorkflowError::Validation(format!(
                "rejection reason must be at least {} characters (got {length})",
                self.reject_reason_min_chars
            )));
        }
        Ok(())
    }
}

/// Side effects to run after a transition has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum WorkflowEffect {
    ApprovalNeeded { approver: UserId, step_order: u32 },
    AutoApproved { missed_approver: Option<UserId>, step_order: u32 },
    Rejected { rejected_by: UserId, reason: String },
    /// The last blocking step finished. Emitted at most once per document.
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    ApprovedNextStep { next_step: u32, total_steps: u32 },
    FullyApproved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub outcome: ApprovalOutcome,
    pub log: ApprovalLog,
    pub skipped_steps: Vec<u32>,
    pub effects: Vec<WorkflowEffect>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkipPass {
    pub skipped_steps: Vec<u32>,
    pub completed: bool,
    pub effects: Vec<WorkflowEffect>,
}

impl SkipPass {
    pub fn changed(&self) -> bool {
        !self.skipped_steps.is_empty() || !self.effects.is_empty()
    }
}

enum Activation {
    Step(usize),
    Completed,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentWorkflow {
    pub document: Document,
    pub steps: Vec<ApprovalStep>,
    #[serde(skip)]
    changed: BTreeSet<usize>,
}

impl DocumentWorkflow {
    /// Rebuilds the aggregate from storage, checking the step sequence is
    /// contiguous from zero.
    pub fn from_parts(
        document: Document,
        mut steps: Vec<ApprovalStep>,
    ) -> Result<Self, WorkflowError> {
        steps.sort_by_key(|step| step.step_order);
        for (index, step) in steps.iter().enumerate() {
            if step.step_order as usize != index || step.document_id != document.id {
                return Err(WorkflowError::Storage(format!(
                    "approval steps of document {} are not a contiguous sequence",
                    document.id
                )));
            }
        }
        Ok(Self { document, steps, changed: BTreeSet::new() })
    }

    /// Creates one step per role and activates the first assigned one.
    ///
    /// `approvers` holds the resolved approver for each role in workflow order.
    /// Steps without an approver are created already skipped. When no step is
    /// left pending the document completes immediately.
    pub fn create(
        mut document: Document,
        document_type: &DocumentType,
        approvers: Vec<Option<UserId>>,
        deadline_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<WorkflowEffect>), WorkflowError> {
        if approvers.len() != document_type.workflow.len() {
            return Err(WorkflowError::Validation(format!(
                "expected {} resolved approvers for document type {}, got {}",
                document_type.workflow.len(),
                document_type.id.0,
                approvers.len()
            )));
        }

        let deadline = now + Duration::hours(i64::from(deadline_hours));
        let steps = document_type
            .workflow
            .iter()
            .zip(approvers)
            .enumerate()
            .map(|(index, (role, approver))| {
                let assigned = approver.is_some();
                ApprovalStep {
                    id: ApprovalStepId::generate(),
                    document_id: document.id.clone(),
                    step_order: index as u32,
                    role_required: role.clone(),
                    approver,
                    status: if assigned { StepStatus::Pending } else { StepStatus::Skipped },
                    deadline,
                    approved_at: (!assigned).then_some(now),
                    comment: (!assigned).then(|| AUTO_SKIP_COMMENT.to_string()),
                }
            })
            .collect();

        document.status = DocumentStatus::Uploaded;
        document.current_step = 0;
        let mut workflow = Self { document, steps, changed: BTreeSet::new() };
        let mut effects = Vec::new();
        let mut skipped = Vec::new();
        workflow.activate_from(0, now, None, &mut effects, &mut skipped);
        workflow.changed.clear();

        Ok((workflow, effects))
    }

    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn current(&self) -> Option<&ApprovalStep> {
        self.steps.get(self.document.current_step as usize)
    }

    /// Steps modified since the aggregate was loaded, in step order.
    pub fn changed_steps(&self) -> Vec<&ApprovalStep> {
        self.changed.iter().filter_map(|index| self.steps.get(*index)).collect()
    }

    /// Skips the current step while it is pending without an approver.
    ///
    /// Also repairs a document whose current step is already terminal by
    /// moving on to the next pending step.
    pub fn skip_unassigned(&mut self, now: DateTime<Utc>) -> SkipPass {
        let mut pass = SkipPass::default();
        if self.document.status != DocumentStatus::PendingApproval {
            return pass;
        }

        let index = self.document.current_step as usize;
        let Some(step) = self.steps.get(index) else {
            return pass;
        };

        let restart_at = match (step.status, step.approver.is_some()) {
            (StepStatus::Pending, true) => return pass,
            (StepStatus::Pending, false) => {
                self.mark_skipped(index, now);
                pass.skipped_steps.push(index as u32);
                index + 1
            }
            (_, _) => index + 1,
        };

        let activation =
            self.activate_from(restart_at, now, None, &mut pass.effects, &mut pass.skipped_steps);
        pass.completed = matches!(activation, Activation::Completed);
        pass
    }

    pub fn approve(
        &mut self,
        actor: &UserId,
        comment: Option<String>,
        client: ClientMetadata,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let index = self.actionable_step(actor)?;

        let step = &mut self.steps[index];
        step.status = StepStatus::Approved;
        step.approved_at = Some(now);
        step.comment = comment.clone();
        self.changed.insert(index);

        let log = self.log_entry(index, Some(actor.clone()), ApprovalAction::Approved, comment, client, now);
        let mut effects = Vec::new();
        let mut skipped_steps = Vec::new();
        let outcome = match self.activate_from(index + 1, now, None, &mut effects, &mut skipped_steps)
        {
            Activation::Step(next) => ApprovalOutcome::ApprovedNextStep {
                next_step: next as u32,
                total_steps: self.total_steps(),
            },
            Activation::Completed => ApprovalOutcome::FullyApproved,
        };

        Ok(Transition { outcome, log, skipped_steps, effects })
    }

    pub fn reject(
        &mut self,
        actor: &UserId,
        reason: &str,
        client: ClientMetadata,
        policy: &WorkflowPolicy,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        policy.validate_reject_reason(reason)?;
        let index = self.actionable_step(actor)?;
        let reason = reason.trim().to_string();

        let step = &mut self.steps[index];
        step.status = StepStatus::Rejected;
        step.approved_at = Some(now);
        step.comment = Some(reason.clone());
        self.changed.insert(index);

        self.document.status = DocumentStatus::Rejected;
        self.document.completed_at = Some(now);
        self.document.updated_at = now;

        let log = self.log_entry(
            index,
            Some(actor.clone()),
            ApprovalAction::Rejected,
            Some(reason.clone()),
            client,
            now,
        );
        let effects = vec![WorkflowEffect::Rejected { rejected_by: actor.clone(), reason }];

        Ok(Transition { outcome: ApprovalOutcome::Rejected, log, skipped_steps: Vec::new(), effects })
    }

    /// Approves the current step on behalf of its approver once its deadline
    /// has passed. The step activated next receives a fresh deadline.
    pub fn auto_approve(
        &mut self,
        deadline_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let index = self.document.current_step as usize;
        let step = self.steps.get(index).ok_or_else(|| self.missing_current_step())?;
        if self.document.status != DocumentStatus::PendingApproval
            || step.status != StepStatus::Pending
        {
            return Err(WorkflowError::Conflict { step_order: step.step_order, status: step.status });
        }
        if step.deadline >= now {
            return Err(WorkflowError::Validation(format!(
                "step {} is not overdue until {}",
                step.step_order,
                step.deadline.to_rfc3339()
            )));
        }

        let overdue_hours = (now - step.deadline).num_seconds() as f64 / 3600.0;
        let comment = format!("auto-approved {overdue_hours:.1}h after deadline");
        let missed_approver = step.approver.clone();

        let step = &mut self.steps[index];
        step.status = StepStatus::AutoApproved;
        step.approved_at = Some(now);
        step.comment = Some(comment.clone());
        self.changed.insert(index);

        let log = self.log_entry(
            index,
            missed_approver.clone(),
            ApprovalAction::AutoApproved,
            Some(comment),
            ClientMetadata::system(AUTO_APPROVAL_USER_AGENT),
            now,
        );
        let mut effects =
            vec![WorkflowEffect::AutoApproved { missed_approver, step_order: index as u32 }];
        let mut skipped_steps = Vec::new();
        let fresh_deadline = Duration::hours(i64::from(deadline_hours));
        let outcome = match self.activate_from(
            index + 1,
            now,
            Some(fresh_deadline),
            &mut effects,
            &mut skipped_steps,
        ) {
            Activation::Step(next) => ApprovalOutcome::ApprovedNextStep {
                next_step: next as u32,
                total_steps: self.total_steps(),
            },
            Activation::Completed => ApprovalOutcome::FullyApproved,
        };

        Ok(Transition { outcome, log, skipped_steps, effects })
    }

    /// Checks the structural invariants of the aggregate.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.step_order as usize != index {
                return Err(format!("step at position {index} has order {}", step.step_order));
            }
        }

        let current = self.document.current_step as usize;
        match self.document.status {
            DocumentStatus::Uploaded => Ok(()),
            DocumentStatus::PendingApproval => {
                match self.steps.get(current) {
                    Some(step) if step.status == StepStatus::Pending => {}
                    _ => return Err(format!("current step {current} is not pending")),
                }
                if let Some(open) = self.steps[..current].iter().find(|step| !step.status.is_terminal())
                {
                    return Err(format!("step {} before the current step is pending", open.step_order));
                }
                Ok(())
            }
            DocumentStatus::Approved => {
                match self.steps.iter().find(|step| !step.status.is_terminal()) {
                    Some(open) => Err(format!("approved document has pending step {}", open.step_order)),
                    None => Ok(()),
                }
            }
            DocumentStatus::Rejected => match self.steps.get(current) {
                Some(step) if step.status == StepStatus::Rejected => Ok(()),
                _ => Err(format!("rejected document's current step {current} is not rejected")),
            },
        }
    }

    fn actionable_step(&self, actor: &UserId) -> Result<usize, WorkflowError> {
        let index = self.document.current_step as usize;
        let step = self.steps.get(index).ok_or_else(|| self.missing_current_step())?;

        if !step.is_assigned_to(actor) {
            return Err(WorkflowError::Forbidden {
                actor: actor.0.clone(),
                step_order: step.step_order,
            });
        }
        if step.status != StepStatus::Pending
            || self.document.status != DocumentStatus::PendingApproval
        {
            return Err(WorkflowError::Conflict { step_order: step.step_order, status: step.status });
        }

        Ok(index)
    }

    fn missing_current_step(&self) -> WorkflowError {
        WorkflowError::not_found(
            "approval step",
            format!("{}#{}", self.document.id, self.document.current_step),
        )
    }

    /// Moves to the first pending step at or after `start`, skipping steps
    /// that lost their approver, or completes the document when none is left.
    fn activate_from(
        &mut self,
        start: usize,
        now: DateTime<Utc>,
        fresh_deadline: Option<Duration>,
        effects: &mut Vec<WorkflowEffect>,
        skipped: &mut Vec<u32>,
    ) -> Activation {
        let mut candidate = self.next_pending(start);
        loop {
            let Some(index) = candidate else {
                self.document.status = DocumentStatus::Approved;
                self.document.completed_at = Some(now);
                self.document.updated_at = now;
                effects.push(WorkflowEffect::Completed);
                return Activation::Completed;
            };

            self.document.current_step = index as u32;
            self.document.status = DocumentStatus::PendingApproval;
            self.document.updated_at = now;

            let Some(approver) = self.steps[index].approver.clone() else {
                self.mark_skipped(index, now);
                skipped.push(index as u32);
                candidate = self.next_pending(index + 1);
                continue;
            };

            if let Some(window) = fresh_deadline {
                self.steps[index].deadline = now + window;
                self.changed.insert(index);
            }
            effects.push(WorkflowEffect::ApprovalNeeded { approver, step_order: index as u32 });
            return Activation::Step(index);
        }
    }

    fn next_pending(&self, start: usize) -> Option<usize> {
        (start..self.steps.len()).find(|index| self.steps[*index].status == StepStatus::Pending)
    }

    fn mark_skipped(&mut self, index: usize, now: DateTime<Utc>) {
        let step = &mut self.steps[index];
        step.status = StepStatus::Skipped;
        step.approved_at = Some(now);
        step.comment = Some(AUTO_SKIP_COMMENT.to_string());
        self.changed.insert(index);
    }

    fn log_entry(
        &self,
        index: usize,
        actor: Option<UserId>,
        action: ApprovalAction,
        comment: Option<String>,
        client: ClientMetadata,
        now: DateTime<Utc>,
    ) -> ApprovalLog {
        ApprovalLog {
            id: ApprovalLogId::generate(),
            document_id: self.document.id.clone(),
            step_id: self.steps[index].id.clone(),
            actor,
            action,
            comment,
            client,
            recorded_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::domain::approval::{ClientMetadata, StepStatus, AUTO_SKIP_COMMENT};
    use crate::domain::directory::UserId;
    use crate::domain::document::{
        Document, DocumentContext, DocumentId, DocumentStatus, VerificationCode,
    };
    use crate::domain::document_type::{DocumentType, DocumentTypeId};
    use crate::domain::role::RoleTag;
    use crate::errors::WorkflowError;

    use super::{ApprovalOutcome, DocumentWorkflow, WorkflowEffect, WorkflowPolicy};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).single().expect("valid timestamp")
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn document_type(roles: &[RoleTag]) -> DocumentType {
        DocumentType {
            id: DocumentTypeId("memo".to_string()),
            name: "Memo".to_string(),
            workflow: roles.to_vec(),
            deadline_hours: Some(48),
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn document() -> Document {
        Document {
            id: DocumentId("doc-1".to_string()),
            uuid: Uuid::nil(),
            verification_code: VerificationCode("AB12".to_string()),
            document_type_id: DocumentTypeId("memo".to_string()),
            title: "Lab report".to_string(),
            owner: user("uploader"),
            context: DocumentContext::default(),
            status: DocumentStatus::Uploaded,
            current_step: 0,
            created_at: now(),
            completed_at: None,
            updated_at: now(),
        }
    }

    fn head_and_dean(head: Option<&str>, dean: Option<&str>) -> (DocumentWorkflow, Vec<WorkflowEffect>) {
        DocumentWorkflow::create(
            document(),
            &document_type(&[RoleTag::DepartmentHead, RoleTag::FacultyDean]),
            vec![head.map(user), dean.map(user)],
            48,
            now(),
        )
        .expect("workflow should be created")
    }

    #[test]
    fn creation_activates_first_assigned_step() {
        let (workflow, effects) = head_and_dean(Some("head"), Some("dean"));

        assert_eq!(workflow.document.status, DocumentStatus::PendingApproval);
        assert_eq!(workflow.document.current_step, 0);
        assert_eq!(workflow.steps.len(), 2);
        assert!(workflow.steps.iter().all(|step| step.status == StepStatus::Pending));
        assert!(workflow.steps.iter().all(|step| step.deadline == now() + Duration::hours(48)));
        assert_eq!(
            effects,
            vec![WorkflowEffect::ApprovalNeeded { approver: user("head"), step_order: 0 }]
        );
        assert!(workflow.changed_steps().is_empty());
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn creation_skips_missing_head_and_starts_at_dean() {
        let (workflow, effects) = head_and_dean(None, Some("dean"));

        assert_eq!(workflow.steps[0].status, StepStatus::Skipped);
        assert_eq!(workflow.steps[0].approved_at, Some(now()));
        assert_eq!(workflow.steps[0].comment.as_deref(), Some(AUTO_SKIP_COMMENT));
        assert_eq!(workflow.document.current_step, 1);
        assert_eq!(workflow.document.status, DocumentStatus::PendingApproval);
        assert_eq!(
            effects,
            vec![WorkflowEffect::ApprovalNeeded { approver: user("dean"), step_order: 1 }]
        );
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn creation_with_no_approvers_completes_immediately() {
        let (workflow, effects) = head_and_dean(None, None);

        assert_eq!(workflow.document.status, DocumentStatus::Approved);
        assert_eq!(workflow.document.completed_at, Some(now()));
        assert_eq!(effects, vec![WorkflowEffect::Completed]);
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn creation_rejects_mismatched_approver_list() {
        let result = DocumentWorkflow::create(
            document(),
            &document_type(&[RoleTag::DepartmentHead]),
            vec![],
            48,
            now(),
        );
        assert!(matches!(result, Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn sequential_approvals_complete_the_document() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));

        let first = workflow
            .approve(&user("head"), Some("ok".to_string()), ClientMetadata::default(), now())
            .expect("head approves");
        assert_eq!(first.outcome, ApprovalOutcome::ApprovedNextStep { next_step: 1, total_steps: 2 });
        assert_eq!(
            first.effects,
            vec![WorkflowEffect::ApprovalNeeded { approver: user("dean"), step_order: 1 }]
        );
        assert_eq!(workflow.document.current_step, 1);
        workflow.check_invariants().expect("invariants hold after first approval");

        let later = now() + Duration::hours(2);
        let second = workflow
            .approve(&user("dean"), None, ClientMetadata::default(), later)
            .expect("dean approves");
        assert_eq!(second.outcome, ApprovalOutcome::FullyApproved);
        assert_eq!(second.effects, vec![WorkflowEffect::Completed]);
        assert_eq!(workflow.document.status, DocumentStatus::Approved);
        assert_eq!(workflow.document.completed_at, Some(later));
        assert_eq!(workflow.changed_steps().len(), 2);
        workflow.check_invariants().expect("invariants hold after completion");
    }

    #[test]
    fn wrong_actor_is_forbidden_and_double_approval_conflicts() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));

        let forbidden = workflow.approve(&user("dean"), None, ClientMetadata::default(), now());
        assert!(matches!(forbidden, Err(WorkflowError::Forbidden { step_order: 0, .. })));

        workflow.approve(&user("head"), None, ClientMetadata::default(), now()).expect("approve");
        workflow.approve(&user("dean"), None, ClientMetadata::default(), now()).expect("approve");

        let again = workflow.approve(&user("dean"), None, ClientMetadata::default(), now());
        assert!(matches!(
            again,
            Err(WorkflowError::Conflict { step_order: 1, status: StepStatus::Approved })
        ));
    }

    #[test]
    fn reject_validates_reason_then_terminates_document() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let policy = WorkflowPolicy::default();

        let short = workflow.reject(&user("head"), " no ", ClientMetadata::default(), &policy, now());
        assert!(matches!(short, Err(WorkflowError::Validation(_))));
        assert_eq!(workflow.document.status, DocumentStatus::PendingApproval);

        let transition = workflow
            .reject(&user("head"), "missing signature", ClientMetadata::default(), &policy, now())
            .expect("reject");
        assert_eq!(transition.outcome, ApprovalOutcome::Rejected);
        assert_eq!(
            transition.effects,
            vec![WorkflowEffect::Rejected {
                rejected_by: user("head"),
                reason: "missing signature".to_string()
            }]
        );
        assert_eq!(workflow.document.status, DocumentStatus::Rejected);
        assert_eq!(workflow.steps[1].status, StepStatus::Pending, "later placeholder untouched");
        workflow.check_invariants().expect("invariants hold");

        let again = workflow.reject(&user("head"), "second try", ClientMetadata::default(), &policy, now());
        assert!(matches!(again, Err(WorkflowError::Conflict { .. })));
    }

    #[test]
    fn reject_threshold_is_configurable() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let strict = WorkflowPolicy { reject_reason_min_chars: 20, ..WorkflowPolicy::default() };

        let result =
            workflow.reject(&user("head"), "too short here", ClientMetadata::default(), &strict, now());
        assert!(matches!(result, Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn skip_pass_advances_past_vacated_step() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        workflow.steps[0].approver = None;

        let pass = workflow.skip_unassigned(now());

        assert_eq!(pass.skipped_steps, vec![0]);
        assert!(!pass.completed);
        assert_eq!(
            pass.effects,
            vec![WorkflowEffect::ApprovalNeeded { approver: user("dean"), step_order: 1 }]
        );
        assert_eq!(workflow.document.current_step, 1);
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn skip_pass_completes_when_last_step_is_vacant() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        workflow.steps[1].approver = None;
        let transition = workflow
            .approve(&user("head"), None, ClientMetadata::default(), now())
            .expect("approval skips the vacant dean step");
        assert_eq!(transition.outcome, ApprovalOutcome::FullyApproved);
        assert_eq!(transition.skipped_steps, vec![1]);
        assert_eq!(workflow.document.status, DocumentStatus::Approved);
        workflow.check_invariants().expect("invariants hold");

        let pass = workflow.skip_unassigned(now());
        assert!(!pass.changed(), "terminal documents are left alone");
    }

    #[test]
    fn skip_pass_is_a_noop_for_assigned_steps() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let pass = workflow.skip_unassigned(now());
        assert!(!pass.changed());
        assert!(workflow.changed_steps().is_empty());
    }

    #[test]
    fn advancement_never_lands_on_pre_skipped_steps() {
        let (mut workflow, _) = DocumentWorkflow::create(
            document(),
            &document_type(&[RoleTag::DepartmentHead, RoleTag::Director, RoleTag::FacultyDean]),
            vec![Some(user("head")), None, Some(user("dean"))],
            48,
            now(),
        )
        .expect("workflow");
        assert_eq!(workflow.total_steps(), 3);

        let transition =
            workflow.approve(&user("head"), None, ClientMetadata::default(), now()).expect("approve");
        assert_eq!(
            transition.outcome,
            ApprovalOutcome::ApprovedNextStep { next_step: 2, total_steps: 3 }
        );
        assert_eq!(workflow.document.current_step, 2);
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn auto_approve_refreshes_next_deadline() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let sweep_at = now() + Duration::hours(98);

        let transition = workflow.auto_approve(48, sweep_at).expect("auto approve");

        assert_eq!(workflow.steps[0].status, StepStatus::AutoApproved);
        assert_eq!(workflow.steps[0].comment.as_deref(), Some("auto-approved 50.0h after deadline"));
        assert_eq!(workflow.steps[1].deadline, sweep_at + Duration::hours(48));
        assert_eq!(transition.log.actor, Some(user("head")));
        assert_eq!(
            transition.effects,
            vec![
                WorkflowEffect::AutoApproved { missed_approver: Some(user("head")), step_order: 0 },
                WorkflowEffect::ApprovalNeeded { approver: user("dean"), step_order: 1 },
            ]
        );
        assert_eq!(workflow.changed_steps().len(), 2);
        workflow.check_invariants().expect("invariants hold");
    }

    #[test]
    fn auto_approve_refuses_steps_before_deadline() {
        let (mut workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let result = workflow.auto_approve(48, now() + Duration::hours(1));
        assert!(matches!(result, Err(WorkflowError::Validation(_))));
        assert_eq!(workflow.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn from_parts_rejects_gaps() {
        let (workflow, _) = head_and_dean(Some("head"), Some("dean"));
        let mut steps = workflow.steps.clone();
        steps.remove(0);

        let result = DocumentWorkflow::from_parts(workflow.document.clone(), steps);
        assert!(matches!(result, Err(WorkflowError::Storage(_))));
    }
}
