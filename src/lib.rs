//! WhatsApp Relay: answers WhatsApp messages with an AI agent.
//!
//! Inbound webhook → session registry → AI query → bounded outbox → send
//! workers → WhatsApp gateway. Delivery status callbacks land in the job
//! status tracker.

pub mod ai;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod session;
pub mod status;
pub mod webhook;
