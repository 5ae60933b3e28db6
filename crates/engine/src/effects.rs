use tracing::{info, warn};

use docflow_core::domain::document::Document;
use docflow_core::notify::{CompletionHook, DeliveryError, NotificationGateway};
use docflow_core::workflow::WorkflowEffect;

/// Delivers the effects of a committed transition.
///
/// Runs strictly after commit. A failed delivery is logged and the rest of
/// the effects still run; nothing here can undo the transition.
pub(crate) async fn dispatch<'a>(
    notifier: &dyn NotificationGateway,
    completion: &dyn CompletionHook,
    document: &Document,
    effects: impl IntoIterator<Item = &'a WorkflowEffect>,
) {
    for effect in effects {
        match effect {
            WorkflowEffect::ApprovalNeeded { approver, step_order } => {
                let result = notifier.approval_needed(document, approver, *step_order).await;
                report("approval_needed", document, result);
            }
            WorkflowEffect::AutoApproved { missed_approver, step_order } => {
                let result =
                    notifier.auto_approved(document, missed_approver.as_ref(), *step_order).await;
                report("auto_approved", document, result);
            }
            WorkflowEffect::Rejected { rejected_by, reason } => {
                let result = notifier.document_rejected(document, rejected_by, reason).await;
                report("document_rejected", document, result);
            }
            WorkflowEffect::Completed => {
                info!(
                    event_name = "workflow.document.completed",
                    correlation_id = %document.id,
                    verification_code = %document.verification_code.0,
                    "document fully approved"
                );
                let result = completion.on_fully_approved(document).await;
                report("on_fully_approved", document, result);
                let result = notifier.document_approved(document).await;
                report("document_approved", document, result);
            }
        }
    }
}

fn report(effect: &'static str, document: &Document, result: Result<(), DeliveryError>) {
    if let Err(error) = result {
        warn!(
            event_name = "workflow.effect.delivery_failed",
            correlation_id = %document.id,
            effect,
            error = %error,
            "post-commit side effect failed"
        );
    }
}
