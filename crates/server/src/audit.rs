use pizzabot_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Forwards audit events to the process log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let session_id = event.session_id().map(|id| id.as_str()).unwrap_or("unknown");
        let context = &event.context;
        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %context.correlation_id,
                session_id,
                actor = %context.actor,
                category = event.category.as_str(),
                metadata = ?event.metadata,
                "audit"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %context.correlation_id,
                session_id,
                actor = %context.actor,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                metadata = ?event.metadata,
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pizzabot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};

    use super::TracingAuditSink;

    #[test]
    fn emitting_without_a_subscriber_is_harmless() {
        let sink = TracingAuditSink;
        let context = AuditContext::new(None, "corr-1", "web");
        sink.emit(AuditEvent::from_context(
            &context,
            "order.checkout_committed",
            AuditCategory::Order,
            AuditOutcome::Success,
        ));
        sink.emit(
            AuditEvent::from_context(
                &context,
                "dialogue.wizard_transition",
                AuditCategory::Dialogue,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", "empty cart"),
        );
    }
}
