//! Outbound WhatsApp gateway: delivers replies through the CSA integration API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::CsaConfig;
use crate::error::GatewayError;

/// Payload accepted by the CSA `send` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub destination: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub text: String,
    /// Message type: "text", "image", "document", ...
    #[serde(rename = "type")]
    pub kind: String,
    pub preview: bool,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub provider: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
}

impl SendMessageRequest {
    /// A plain text message with link preview enabled.
    pub fn text(destination: &str, text: &str) -> Self {
        Self {
            destination: destination.to_string(),
            text: text.to_string(),
            kind: "text".to_string(),
            preview: true,
            instance_id: String::new(),
            product: String::new(),
            provider: String::new(),
            name: String::new(),
        }
    }
}

/// Something that can deliver a message to a WhatsApp contact.
///
/// Returns the gateway's message id when it reports one.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, request: SendMessageRequest) -> Result<Option<String>, GatewayError>;
}

/// HTTP client for the CSA WhatsApp integration.
pub struct CsaClient {
    client: reqwest::Client,
    base_url: String,
    webhook_id: String,
    token: SecretString,
    instance_id: String,
    product: String,
    provider: String,
    sender_name: String,
}

impl CsaClient {
    pub fn new(config: &CsaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            webhook_id: config.webhook_id.clone(),
            token: config.token.clone(),
            instance_id: config.instance_id.clone(),
            product: config.product.clone(),
            provider: config.provider.clone(),
            sender_name: config.sender_name.clone(),
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/api/integration/whatsapp/{}/send",
            self.base_url, self.webhook_id
        )
    }

    /// Fill routing fields the caller left empty.
    fn with_defaults(&self, mut request: SendMessageRequest) -> SendMessageRequest {
        if request.instance_id.is_empty() {
            request.instance_id = self.instance_id.clone();
        }
        if request.product.is_empty() {
            request.product = self.product.clone();
        }
        if request.provider.is_empty() {
            request.provider = self.provider.clone();
        }
        if request.name.is_empty() {
            request.name = self.sender_name.clone();
        }
        request
    }
}

#[async_trait]
impl OutboundSender for CsaClient {
    async fn send(&self, request: SendMessageRequest) -> Result<Option<String>, GatewayError> {
        let request = self.with_defaults(request);

        let resp = self
            .client
            .post(self.send_url())
            .header("accept", "application/json")
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    status = status.as_u16(),
                    error = %e,
                    "Failed to read CSA response body"
                );
                String::new()
            }
        };

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = extract_message_id(&body);
        tracing::debug!(
            destination = %request.destination,
            message_id = ?message_id,
            "CSA accepted message"
        );
        Ok(message_id)
    }
}

/// Pull a message id out of a CSA response body, if it carries one.
fn extract_message_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("messageId"),
        value.get("id"),
        value.get("data").and_then(|d| d.get("messageId")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CsaClient {
        let config = CsaConfig {
            url: "https://csa.example.com/".to_string(),
            webhook_id: "wh-1".to_string(),
            instance_id: "inst-9".to_string(),
            sender_name: "Relay Bot".to_string(),
            ..CsaConfig::default()
        };
        CsaClient::new(&config)
    }

    #[test]
    fn send_url_trims_trailing_slash() {
        assert_eq!(
            client().send_url(),
            "https://csa.example.com/api/integration/whatsapp/wh-1/send"
        );
    }

    #[test]
    fn defaults_fill_only_empty_fields() {
        let mut request = SendMessageRequest::text("+551100", "hi");
        request.provider = "meta".to_string();

        let filled = client().with_defaults(request);
        assert_eq!(filled.instance_id, "inst-9");
        assert_eq!(filled.product, "whatsapp");
        assert_eq!(filled.provider, "meta");
        assert_eq!(filled.name, "Relay Bot");
    }

    #[test]
    fn request_serializes_camel_case() {
        let mut request = SendMessageRequest::text("+551100", "hi");
        request.instance_id = "inst".to_string();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["instanceId"], "inst");
        assert_eq!(json["preview"], true);
        assert!(json.get("name").is_none());
    }

    /// Answers one request with a 200 whose body is shorter than its
    /// declared length, then hangs up.
    async fn truncated_ok_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"messageId\":\"m")
                .await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unreadable_success_body_still_counts_as_sent() {
        let config = CsaConfig {
            url: truncated_ok_server().await,
            webhook_id: "wh-1".to_string(),
            ..CsaConfig::default()
        };
        let message_id = CsaClient::new(&config)
            .send(SendMessageRequest::text("+551100", "hi"))
            .await
            .unwrap();
        assert_eq!(message_id, None);
    }

    #[test]
    fn message_id_extraction() {
        assert_eq!(extract_message_id(r#"{"messageId":"m1"}"#), Some("m1".to_string()));
        assert_eq!(extract_message_id(r#"{"id":"m2"}"#), Some("m2".to_string()));
        assert_eq!(
            extract_message_id(r#"{"data":{"messageId":"m3"}}"#),
            Some("m3".to_string())
        );
        assert_eq!(extract_message_id(r#"{"messageId":""}"#), None);
        assert_eq!(extract_message_id("ok"), None);
    }
}
