//! Outbound reply job.

use crate::gateway::SendMessageRequest;

/// A reply waiting to be delivered to a WhatsApp contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundJob {
    /// Destination phone number.
    pub phone: String,
    /// AI conversation the reply belongs to.
    pub conversation_id: String,
    pub text: String,
}

impl OutboundJob {
    pub fn new(
        phone: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            conversation_id: conversation_id.into(),
            text: text.into(),
        }
    }

    /// Build the gateway request: a text message with link preview enabled.
    pub fn to_request(&self) -> SendMessageRequest {
        SendMessageRequest::text(&self.phone, &self.text)
    }
}
