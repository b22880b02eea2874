//! Inbound webhook payloads from the WhatsApp gateway.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Message notification posted by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundWebhook {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub message: InboundMessage,
    pub contact: InboundContact,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Text or media content of the inbound message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub caption: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latitude: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub longitude: String,
    /// Some providers put the sender's number here instead of on the contact.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub from: String,
}

/// Who sent the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundContact {
    pub phone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl InboundWebhook {
    /// Sender phone, falling back to `message.from`.
    pub fn sender(&self) -> Option<String> {
        non_blank(&self.contact.phone).or_else(|| non_blank(&self.message.from))
    }

    /// Message text, falling back to the media caption.
    pub fn text(&self) -> Option<String> {
        non_blank(&self.message.text).or_else(|| non_blank(&self.message.caption))
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Delivery status notification for a previously sent message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusCallback {
    pub message_id: String,
    pub status: String,
    #[serde(alias = "phone")]
    pub destination: String,
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_prefers_contact_phone() {
        let hook: InboundWebhook = serde_json::from_str(
            r#"{"message":{"type":"text","from":"+2"},"contact":{"phone":" +1 "}}"#,
        )
        .unwrap();
        assert_eq!(hook.sender().as_deref(), Some("+1"));
    }

    #[test]
    fn sender_falls_back_to_from() {
        let hook: InboundWebhook =
            serde_json::from_str(r#"{"message":{"type":"text","from":"+2"},"contact":{}}"#).unwrap();
        assert_eq!(hook.sender().as_deref(), Some("+2"));
    }

    #[test]
    fn no_sender_anywhere() {
        let hook: InboundWebhook = serde_json::from_str(r#"{"message":{"type":"text"}}"#).unwrap();
        assert!(hook.sender().is_none());
    }

    #[test]
    fn text_falls_back_to_caption() {
        let hook: InboundWebhook = serde_json::from_str(
            r#"{"message":{"type":"image","caption":" a photo ","url":"https://x"}}"#,
        )
        .unwrap();
        assert_eq!(hook.text().as_deref(), Some("a photo"));
        assert_eq!(hook.message.kind, "image");
    }

    #[test]
    fn blank_text_and_caption_is_none() {
        let hook: InboundWebhook =
            serde_json::from_str(r#"{"message":{"type":"audio","text":"   "}}"#).unwrap();
        assert!(hook.text().is_none());
    }

    #[test]
    fn full_payload_parses() {
        let hook: InboundWebhook = serde_json::from_str(
            r#"{
                "event": "message",
                "timestamp": 1700000000,
                "message": { "id": "wamid.1", "type": "text", "text": "oi" },
                "contact": { "phone": "+5511", "name": "Ana" },
                "metadata": { "source": "gupshup" }
            }"#,
        )
        .unwrap();
        assert_eq!(hook.event, "message");
        assert_eq!(hook.timestamp, Some(1_700_000_000));
        assert_eq!(hook.contact.name, "Ana");
        assert_eq!(hook.metadata["source"], "gupshup");
    }

    #[test]
    fn status_callback_accepts_phone_alias() {
        let cb: StatusCallback =
            serde_json::from_str(r#"{"messageId":"m1","status":"READ","phone":"+1"}"#).unwrap();
        assert_eq!(cb.message_id, "m1");
        assert_eq!(cb.destination, "+1");
        assert!(cb.conversation_id.is_empty());
    }
}
