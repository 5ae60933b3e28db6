use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use docflow_core::clock::{Clock, SystemClock};
use docflow_core::config::AppConfig;
use docflow_core::domain::approval::ClientMetadata;
use docflow_core::domain::directory::UserId;
use docflow_core::domain::document::{
    Document, DocumentId, DocumentStatus, NewDocument, VerificationCode,
};
use docflow_core::errors::WorkflowError;
use docflow_core::notify::{CompletionHook, NotificationGateway, TracingNotifier};
use docflow_core::workflow::{
    ApprovalOutcome, ApproverResolver, Directory, DirectoryError, DocumentWorkflow,
    ReminderPolicy, ResolutionContext, SkipPass, WorkflowEffect, WorkflowPolicy,
};
use docflow_db::repositories::{
    DocumentHistory, DocumentTypeRepository, PendingApproval, SqlDirectory,
    SqlDocumentTypeRepository, SqlReminderLedger, SqlWorkflowQueries, SqlWorkflowRepository,
};
use docflow_db::{DbPool, DbTransaction, RepositoryError};

use crate::effects;
use crate::locks::DocumentLocks;

const MAX_CODE_ATTEMPTS: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalCommand {
    pub document_id: DocumentId,
    pub actor: UserId,
    pub comment: Option<String>,
    pub client: ClientMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectCommand {
    pub document_id: DocumentId,
    pub actor: UserId,
    pub reason: String,
    pub client: ClientMetadata,
}

/// Result of a committed human action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub outcome: ApprovalOutcome,
    pub document: Document,
    /// Steps skipped by the pre-action pass or while advancing.
    pub skipped_steps: Vec<u32>,
}

pub struct WorkflowEngine {
    pub(crate) store: SqlWorkflowRepository,
    pub(crate) queries: SqlWorkflowQueries,
    pub(crate) document_types: Arc<dyn DocumentTypeRepository>,
    pub(crate) reminder_ledger: SqlReminderLedger,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) resolver: ApproverResolver,
    pub(crate) notifier: Arc<dyn NotificationGateway>,
    pub(crate) completion: Arc<dyn CompletionHook>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: WorkflowPolicy,
    pub(crate) reminder_policy: ReminderPolicy,
    pub(crate) locks: DocumentLocks,
    pub(crate) reminder_sweep: Mutex<()>,
}

pub struct WorkflowEngineBuilder {
    pool: DbPool,
    directory: Option<Arc<dyn Directory>>,
    resolver: ApproverResolver,
    notifier: Arc<dyn NotificationGateway>,
    completion: Arc<dyn CompletionHook>,
    clock: Arc<dyn Clock>,
    policy: WorkflowPolicy,
    reminder_policy: ReminderPolicy,
    locks: DocumentLocks,
}

impl WorkflowEngineBuilder {
    /// Takes the workflow and reminder policies from loaded configuration.
    pub fn config(mut self, config: &AppConfig) -> Self {
        self.policy = WorkflowPolicy::from(&config.workflow);
        self.reminder_policy = ReminderPolicy::from(&config.reminders);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn resolver(mut self, resolver: ApproverResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn completion_hook(mut self, completion: Arc<dyn CompletionHook>) -> Self {
        self.completion = completion;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn workflow_policy(mut self, policy: WorkflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn reminder_policy(mut self, policy: ReminderPolicy) -> Self {
        self.reminder_policy = policy;
        self
    }

    /// Shares a lock registry with another engine in the same process.
    pub fn locks(mut self, locks: DocumentLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let directory: Arc<dyn Directory> = match self.directory {
            Some(directory) => directory,
            None => Arc::new(SqlDirectory::new(self.pool.clone())),
        };

        WorkflowEngine {
            store: SqlWorkflowRepository::new(self.pool.clone()),
            queries: SqlWorkflowQueries::new(self.pool.clone()),
            document_types: Arc::new(SqlDocumentTypeRepository::new(self.pool.clone())),
            reminder_ledger: SqlReminderLedger::new(self.pool),
            directory,
            resolver: self.resolver,
            notifier: self.notifier,
            completion: self.completion,
            clock: self.clock,
            policy: self.policy,
            reminder_policy: self.reminder_policy,
            locks: self.locks,
            reminder_sweep: Mutex::new(()),
        }
    }
}

impl WorkflowEngine {
    /// Starts from the SQL directory, the tracing notifier, the system clock
    /// and default policies.
    pub fn builder(pool: DbPool) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            pool,
            directory: None,
            resolver: ApproverResolver::standard(),
            notifier: Arc::new(TracingNotifier),
            completion: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            policy: WorkflowPolicy::default(),
            reminder_policy: ReminderPolicy::default(),
            locks: DocumentLocks::new(),
        }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn reminder_policy(&self) -> &ReminderPolicy {
        &self.reminder_policy
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Routes a new upload into its document type's workflow.
    ///
    /// Approvers are resolved before the write transaction opens, so the
    /// directory is never queried while the database write lock is held.
    pub async fn submit_document(&self, new: NewDocument) -> Result<DocumentWorkflow, WorkflowError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(WorkflowError::Validation("document title must not be empty".to_string()));
        }

        let document_type = self
            .document_types
            .find_by_id(&new.document_type_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("document type", new.document_type_id.0.clone()))?;
        if !document_type.is_active {
            return Err(WorkflowError::Validation(format!(
                "document type `{}` is not accepting uploads",
                document_type.id.0
            )));
        }

        let uploader = self.directory.find_user(&new.owner).await.map_err(integration)?;
        let context = ResolutionContext::for_uploader(uploader.as_ref(), new.context.clone());
        let approvers = self
            .resolver
            .resolve_all(self.directory.as_ref(), &document_type.workflow, &context)
            .await
            .map_err(integration)?;
        let deadline_hours = self.policy.deadline_hours_for(&document_type);

        let document_id = DocumentId::generate();
        let _guard = self.locks.acquire(&document_id).await;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let verification_code = self.unique_verification_code(&mut tx).await?;

        let document = Document {
            id: document_id,
            uuid: Uuid::new_v4(),
            verification_code,
            document_type_id: new.document_type_id,
            title,
            owner: new.owner,
            context: new.context,
            status: DocumentStatus::Uploaded,
            current_step: 0,
            created_at: now,
            completed_at: None,
            updated_at: now,
        };
        let (workflow, effects) =
            DocumentWorkflow::create(document, &document_type, approvers, deadline_hours, now)?;
        self.store.insert(&mut tx, &workflow).await?;
        commit(tx).await?;

        let skipped = workflow.steps.iter().filter(|step| step.approver.is_none()).count();
        info!(
            event_name = "workflow.document.submitted",
            correlation_id = %workflow.document.id,
            document_type = %document_type.id.0,
            owner = %workflow.document.owner,
            total_steps = workflow.total_steps(),
            skipped_steps = skipped,
            status = workflow.document.status.as_str(),
            "document entered approval workflow"
        );

        self.dispatch(&workflow.document, &effects).await;
        Ok(workflow)
    }

    pub async fn approve(&self, command: ApprovalCommand) -> Result<ActionReceipt, WorkflowError> {
        let _guard = self.locks.acquire(&command.document_id).await;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut workflow = self.load(&mut tx, &command.document_id).await?;

        let pass = workflow.skip_unassigned(now);
        let step_order = workflow.document.current_step;
        let transition = workflow.approve(&command.actor, command.comment, command.client, now)?;
        self.store.save(&mut tx, &workflow).await?;
        self.store.append_log(&mut tx, &transition.log).await?;
        commit(tx).await?;

        info!(
            event_name = "workflow.step.approved",
            correlation_id = %workflow.document.id,
            actor = %command.actor,
            step_order,
            outcome = ?transition.outcome,
            "approval step approved"
        );

        self.dispatch(&workflow.document, pass.effects.iter().chain(&transition.effects)).await;
        Ok(ActionReceipt {
            outcome: transition.outcome,
            document: workflow.document,
            skipped_steps: pass.skipped_steps.into_iter().chain(transition.skipped_steps).collect(),
        })
    }

    pub async fn reject(&self, command: RejectCommand) -> Result<ActionReceipt, WorkflowError> {
        self.policy.validate_reject_reason(&command.reason)?;

        let _guard = self.locks.acquire(&command.document_id).await;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut workflow = self.load(&mut tx, &command.document_id).await?;

        let pass = workflow.skip_unassigned(now);
        let step_order = workflow.document.current_step;
        let transition =
            workflow.reject(&command.actor, &command.reason, command.client, &self.policy, now)?;
        self.store.save(&mut tx, &workflow).await?;
        self.store.append_log(&mut tx, &transition.log).await?;
        commit(tx).await?;

        info!(
            event_name = "workflow.step.rejected",
            correlation_id = %workflow.document.id,
            actor = %command.actor,
            step_order,
            "document rejected"
        );

        self.dispatch(&workflow.document, pass.effects.iter().chain(&transition.effects)).await;
        Ok(ActionReceipt {
            outcome: transition.outcome,
            document: workflow.document,
            skipped_steps: pass.skipped_steps,
        })
    }

    /// Runs the unassigned-step pass for one document and persists it when
    /// anything changed.
    pub async fn skip_unassigned(&self, document_id: &DocumentId) -> Result<SkipPass, WorkflowError> {
        let _guard = self.locks.acquire(document_id).await;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut workflow = self.load(&mut tx, document_id).await?;

        let pass = workflow.skip_unassigned(now);
        if !pass.changed() {
            return Ok(pass);
        }
        self.store.save(&mut tx, &workflow).await?;
        commit(tx).await?;

        info!(
            event_name = "workflow.step.skipped",
            correlation_id = %document_id,
            skipped_steps = ?pass.skipped_steps,
            completed = pass.completed,
            "unassigned steps skipped"
        );

        self.dispatch(&workflow.document, &pass.effects).await;
        Ok(pass)
    }

    pub async fn pending_for_approver(
        &self,
        approver: &UserId,
    ) -> Result<Vec<PendingApproval>, WorkflowError> {
        Ok(self.queries.pending_for_approver(approver).await?)
    }

    pub async fn document_history(
        &self,
        document_id: &DocumentId,
    ) -> Result<DocumentHistory, WorkflowError> {
        self.queries
            .history(document_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("document", document_id.0.clone()))
    }

    /// Looks up a document by the code printed on it. Input is trimmed and
    /// uppercased first; malformed codes never reach storage.
    pub async fn verify(&self, raw_code: &str) -> Result<Option<Document>, WorkflowError> {
        let code = VerificationCode::normalize(raw_code);
        if !code.is_well_formed() {
            return Ok(None);
        }
        Ok(self.queries.find_by_verification_code(&code).await?)
    }

    pub(crate) async fn load(
        &self,
        tx: &mut DbTransaction,
        document_id: &DocumentId,
    ) -> Result<DocumentWorkflow, WorkflowError> {
        self.store
            .load(tx, document_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("document", document_id.0.clone()))
    }

    pub(crate) async fn dispatch<'a>(
        &self,
        document: &Document,
        effects: impl IntoIterator<Item = &'a WorkflowEffect>,
    ) {
        effects::dispatch(self.notifier.as_ref(), self.completion.as_ref(), document, effects).await;
    }

    async fn unique_verification_code(
        &self,
        tx: &mut DbTransaction,
    ) -> Result<VerificationCode, WorkflowError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = VerificationCode::generate(&mut rand::thread_rng());
            if !self.store.verification_code_taken(tx, &candidate).await? {
                return Ok(candidate);
            }
        }
        Err(WorkflowError::Storage(format!(
            "no free verification code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }
}

pub(crate) async fn commit(tx: DbTransaction) -> Result<(), WorkflowError> {
    tx.commit().await.map_err(RepositoryError::from)?;
    Ok(())
}

fn integration(error: DirectoryError) -> WorkflowError {
    WorkflowError::Integration(error.to_string())
}
