//! AI query client: asks a Chatvolt agent for the reply to an inbound message.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ChatvoltConfig;
use crate::error::AiError;

/// Contact details forwarded to the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub first_name: String,
    #[serde(rename = "phoneNumber", skip_serializing_if = "String::is_empty", default)]
    pub phone: String,
}

/// Payload for the agent `query` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub streaming: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub conversation_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub visitor_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contact: Option<Contact>,
}

/// The agent's answer plus the conversation it now belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub visitor_id: String,
    #[serde(default)]
    pub message_id: String,
}

/// An AI service that answers a user's message.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, AiError>;
}

/// HTTP client for the Chatvolt agents API.
pub struct ChatvoltClient {
    client: reqwest::Client,
    base_url: String,
    agent_id: String,
    token: SecretString,
}

impl ChatvoltClient {
    pub fn new(config: &ChatvoltConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            agent_id: config.agent_id.clone(),
            token: config.token.clone(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/agents/{}/query", self.base_url, self.agent_id)
    }
}

#[async_trait]
impl AiClient for ChatvoltClient {
    async fn query(&self, mut request: QueryRequest) -> Result<QueryResponse, AiError> {
        if request.query.trim().is_empty() {
            return Err(AiError::EmptyQuery);
        }
        request.streaming = false;

        let resp = self
            .client
            .post(self.query_url())
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read Chatvolt error body");
                String::new()
            });
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            conversation_id = %parsed.conversation_id,
            answer_len = parsed.answer.len(),
            "Chatvolt answered"
        );
        Ok(parsed)
    }
}
