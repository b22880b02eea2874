//! Relay: turns an inbound WhatsApp message into a queued AI reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ai::{AiClient, Contact, QueryRequest};
use crate::dispatch::Outbox;
use crate::error::{AiError, WebhookError};
use crate::session::SessionRegistry;
use crate::status::{JobStatusRecord, JobTracker};
use crate::webhook::model::InboundWebhook;

/// Default deadline for the AI query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(25);

/// What became of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// No usable text; nothing was dispatched.
    Ignored,
    /// The AI answered; `queued` is false if the outbox dropped the reply.
    Accepted { queued: bool },
}

/// Shared handles the HTTP layer calls into.
pub struct Relay {
    ai: Arc<dyn AiClient>,
    sessions: Arc<SessionRegistry>,
    outbox: Arc<Outbox>,
    tracker: Arc<JobTracker>,
    query_timeout: Duration,
}

impl Relay {
    pub fn new(
        ai: Arc<dyn AiClient>,
        sessions: Arc<SessionRegistry>,
        outbox: Arc<Outbox>,
        tracker: Arc<JobTracker>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            ai,
            sessions,
            outbox,
            tracker,
            query_timeout,
        }
    }

    /// Handle one inbound event: refresh the sender's session, ask the AI,
    /// record the new conversation ids and queue the answer.
    pub async fn handle_inbound(&self, event: &InboundWebhook) -> Result<InboundOutcome, WebhookError> {
        let phone = event.sender().ok_or(WebhookError::MissingSender)?;
        let Some(text) = event.text() else {
            info!(phone = %phone, kind = %event.message.kind, "Ignoring message without text");
            return Ok(InboundOutcome::Ignored);
        };
        let name = event.contact.name.trim();

        let session = self.sessions.upsert(&phone, name).await;

        let request = QueryRequest {
            query: text,
            streaming: false,
            conversation_id: session.conversation_id,
            visitor_id: session.visitor_id,
            contact: Some(Contact {
                first_name: name.to_string(),
                phone: phone.clone(),
            }),
        };

        let response = tokio::time::timeout(self.query_timeout, self.ai.query(request))
            .await
            .unwrap_or(Err(AiError::Timeout(self.query_timeout)))
            .inspect_err(|e| warn!(phone = %phone, error = %e, "AI query failed"))?;

        self.sessions
            .update_conversation(&phone, &response.conversation_id, &response.visitor_id)
            .await;

        let queued = self.enqueue_reply(&phone, &response.conversation_id, &response.answer);
        info!(
            phone = %phone,
            conversation_id = %response.conversation_id,
            queued,
            "Inbound message answered"
        );

        Ok(InboundOutcome::Accepted { queued })
    }

    pub fn enqueue_reply(&self, phone: &str, conversation_id: &str, text: &str) -> bool {
        self.outbox.enqueue_reply(phone, conversation_id, text)
    }

    pub async fn get_job_status(&self, message_id: &str) -> Option<JobStatusRecord> {
        self.tracker.get(message_id).await
    }

    pub async fn upsert_job_status(
        &self,
        message_id: &str,
        status: &str,
        phone: &str,
        conversation_id: &str,
    ) -> JobStatusRecord {
        self.tracker
            .upsert_status(message_id, status, phone, conversation_id)
            .await
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}
