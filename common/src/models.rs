// Wire shapes stored in Redis and the summaries built from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job payload as stored in a queue: `{"class": "...", "args": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Job type identifier used by workers to pick a handler
    pub class: String,
    /// Ordered argument list
    pub args: Vec<Value>,
}

impl JobPayload {
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
        }
    }
}

/// Per-worker activity record: `{"queue": "...", "run_at": "...", "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub queue: String,
    pub run_at: DateTime<Utc>,
    pub payload: JobPayload,
}

/// Entry of the `failed` queue describing one failed job attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failed_at: DateTime<Utc>,
    pub payload: JobPayload,
    /// Top-level error message
    pub error: String,
    /// Error cause chain, outermost first
    #[serde(default)]
    pub backtrace: Vec<String>,
    pub worker: String,
    pub queue: String,
}

/// Whether a worker currently has a live status record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Working,
    Idle,
}

/// Point-in-time overview of the whole system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Jobs waiting across every known queue
    pub pending: u64,
    pub processed: i64,
    pub queues: usize,
    pub workers: usize,
    pub working: usize,
    pub failed: u64,
}
