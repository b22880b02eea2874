//! Inbound HTTP surface for the WhatsApp gateway.

pub mod model;
pub mod routes;
pub mod server;

pub use model::{InboundContact, InboundMessage, InboundWebhook, StatusCallback};
pub use routes::{AppState, relay_routes};
pub use server::serve_until;
