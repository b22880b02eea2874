//! Session registry: tracks the AI conversation for each WhatsApp sender.
//!
//! Sessions expire after a sliding idle TTL. Every upsert cancels the
//! session's pending expiry task and schedules a new one. Expiry tasks take
//! the same lock as regular operations and only remove the entry if it still
//! carries the generation they were scheduled for, so a refresh that races
//! an expiring timer always wins.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info};

/// Default idle time before a session is forgotten.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

/// Whether `get` counts as sender activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LookupPolicy {
    /// Lookups leave the idle timer alone.
    #[default]
    Passive,
    /// Lookups reset the idle timer like an upsert.
    Refresh,
}

/// Conversation state for one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub phone: String,
    pub name: String,
    pub conversation_id: String,
    pub visitor_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

struct Entry {
    session: Session,
    generation: u64,
    expiry: AbortHandle,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, Entry>,
    next_generation: u64,
}

/// Owns every live session and its expiry timer.
pub struct SessionRegistry {
    state: Arc<Mutex<State>>,
    ttl: Duration,
    policy: LookupPolicy,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self::with_policy(ttl, LookupPolicy::default())
    }

    pub fn with_policy(ttl: Duration, policy: LookupPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ttl,
            policy,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> LookupPolicy {
        self.policy
    }

    /// Return the sender's session, creating it on first contact, and reset
    /// its idle timer. A non-empty `name` replaces the stored display name.
    pub async fn upsert(&self, phone: &str, name: &str) -> Session {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let generation = next_generation(&mut state);
        let expiry = self.schedule_expiry(phone, generation);

        let (session, stage) = match state.sessions.get_mut(phone) {
            Some(entry) => {
                entry.expiry.abort();
                entry.expiry = expiry;
                entry.generation = generation;
                if !name.is_empty() {
                    entry.session.name = name.to_string();
                }
                entry.session.last_active = now;
                (entry.session.clone(), "upsert:existing")
            }
            None => {
                let session = Session {
                    phone: phone.to_string(),
                    name: name.to_string(),
                    conversation_id: String::new(),
                    visitor_id: String::new(),
                    created_at: now,
                    last_active: now,
                };
                state.sessions.insert(
                    phone.to_string(),
                    Entry {
                        session: session.clone(),
                        generation,
                        expiry,
                    },
                );
                (session, "upsert:new")
            }
        };

        record_stage(&session, stage);
        session
    }

    /// Store the conversation and visitor ids returned by the AI service.
    /// Does nothing if the session has already expired.
    pub async fn update_conversation(&self, phone: &str, conversation_id: &str, visitor_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.sessions.get_mut(phone) {
            entry.session.conversation_id = conversation_id.to_string();
            entry.session.visitor_id = visitor_id.to_string();
            record_stage(&entry.session, "conversation:update");
        }
    }

    /// Look up a live session. Under [`LookupPolicy::Refresh`] this also
    /// resets the idle timer.
    pub async fn get(&self, phone: &str) -> Option<Session> {
        let mut state = self.state.lock().await;
        let generation = match self.policy {
            LookupPolicy::Refresh if state.sessions.contains_key(phone) => {
                Some(next_generation(&mut state))
            }
            _ => None,
        };

        let entry = state.sessions.get_mut(phone)?;
        if let Some(generation) = generation {
            entry.expiry.abort();
            entry.expiry = self.schedule_expiry(phone, generation);
            entry.generation = generation;
            entry.session.last_active = Utc::now();
        }
        record_stage(&entry.session, "get");
        Some(entry.session.clone())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.sessions.is_empty()
    }

    /// Cancel every pending expiry and forget all sessions.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let count = state.sessions.len();
        for (_, entry) in state.sessions.drain() {
            entry.expiry.abort();
        }
        info!(count, "Session registry shut down");
    }

    fn schedule_expiry(&self, phone: &str, generation: u64) -> AbortHandle {
        let state = Arc::downgrade(&self.state);
        let phone = phone.to_string();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            expire(state, &phone, generation).await;
        })
        .abort_handle()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_lock() {
            for (_, entry) in state.sessions.drain() {
                entry.expiry.abort();
            }
        }
    }
}

fn next_generation(state: &mut State) -> u64 {
    state.next_generation += 1;
    state.next_generation
}

async fn expire(state: Weak<Mutex<State>>, phone: &str, generation: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;
    let current = state
        .sessions
        .get(phone)
        .is_some_and(|entry| entry.generation == generation);
    if current {
        if let Some(entry) = state.sessions.remove(phone) {
            record_stage(&entry.session, "expired");
        }
    }
}

fn record_stage(session: &Session, stage: &str) {
    debug!(
        stage,
        phone = %session.phone,
        name = %session.name,
        conversation = %session.conversation_id,
        visitor = %session.visitor_id,
        "Session lifecycle"
    );
}
