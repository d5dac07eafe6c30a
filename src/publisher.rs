//! Post-commit event publication: every committed lifecycle transition is
//! logged, and forwarded to NATS when a client is configured. Publication is
//! best-effort; a broker hiccup never fails an already committed operation.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    /// Logging-only publisher, used in tests and when no broker is configured.
    pub fn disabled() -> Self {
        Self { nats: None }
    }

    pub async fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            tracing::info!(subject = event.subject(), event = ?event, "domain event");
            if let Some(client) = &self.nats {
                match serde_json::to_vec(event) {
                    Ok(payload) => {
                        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                            tracing::warn!(error = %e, subject = event.subject(), "event publish failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "event serialization failed"),
                }
            }
        }
    }
}
