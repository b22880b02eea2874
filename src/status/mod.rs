//! Delivery status tracking, keyed by gateway message id.
//!
//! Status callbacks may arrive out of order; the last write always wins for
//! the status itself, while the phone and conversation recorded first are kept.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default number of records retained before the stalest is evicted.
pub const DEFAULT_STATUS_CAPACITY: usize = 10_000;

/// Last known state of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Submitted,
    Enqueued,
    #[default]
    Pending,
    Sent,
    Delivered,
    Failed,
    /// Any status the gateway reports that we do not model, lower-cased.
    Other(String),
}

impl JobStatus {
    /// Case-insensitive parse. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Some(match normalized.as_str() {
            "submitted" => Self::Submitted,
            "enqueued" => Self::Enqueued,
            "pending" => Self::Pending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            _ => Self::Other(normalized),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "submitted",
            Self::Enqueued => "enqueued",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw).unwrap_or_default()
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Tracking metadata for one outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    pub message_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub phone: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub conversation_id: String,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

/// In-memory status store with a bounded number of records.
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobStatusRecord>>,
    capacity: usize,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_CAPACITY)
    }
}

impl JobTracker {
    /// Create a tracker retaining at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Create or update the status of a message.
    ///
    /// An empty `message_id` is ignored and yields a default record. A blank
    /// `status` leaves the stored status untouched but still bumps the timestamp.
    pub async fn upsert_status(
        &self,
        message_id: &str,
        status: &str,
        phone: &str,
        conversation_id: &str,
    ) -> JobStatusRecord {
        if message_id.is_empty() {
            return JobStatusRecord::default();
        }

        let parsed = JobStatus::parse(status);
        let mut jobs = self.jobs.write().await;

        if !jobs.contains_key(message_id) && jobs.len() >= self.capacity {
            evict_stalest(&mut jobs);
        }

        let record = jobs
            .entry(message_id.to_string())
            .or_insert_with(|| JobStatusRecord {
                message_id: message_id.to_string(),
                ..JobStatusRecord::default()
            });

        if record.phone.is_empty() {
            record.phone = phone.to_string();
        }
        if record.conversation_id.is_empty() {
            record.conversation_id = conversation_id.to_string();
        }
        if let Some(parsed) = parsed {
            record.status = parsed;
        }
        record.updated_at = Utc::now();

        debug!(
            message_id = %record.message_id,
            status = %record.status,
            phone = %record.phone,
            "Job status updated"
        );

        record.clone()
    }

    /// Look up a message's last known status.
    pub async fn get(&self, message_id: &str) -> Option<JobStatusRecord> {
        self.jobs.read().await.get(message_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn evict_stalest(jobs: &mut HashMap<String, JobStatusRecord>) {
    let stalest = jobs
        .values()
        .min_by_key(|r| r.updated_at)
        .map(|r| r.message_id.clone());

    if let Some(message_id) = stalest {
        jobs.remove(&message_id);
        info!(message_id = %message_id, "Evicted stalest job status record");
    }
}
