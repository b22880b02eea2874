//! Error types for the relay.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Outbound messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Request(String),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gateway send timed out after {0:?}")]
    Timeout(Duration),
}

/// AI query service errors.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Query text is empty")]
    EmptyQuery,

    #[error("AI request failed: {0}")]
    Request(String),

    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from AI service: {0}")]
    InvalidResponse(String),

    #[error("AI query timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised while handling an inbound webhook event.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Inbound event has no sender phone")]
    MissingSender,

    #[error("Failed to query AI: {0}")]
    Ai(#[from] AiError),
}
