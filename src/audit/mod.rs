//! Audit trail of handled queries
//!
//! Every query, whatever its outcome, leaves one record. The log is bounded:
//! once full, the oldest record is evicted.

use crate::models::{AgentResult, BriefResponse, ConfidenceVerdict, Intent, Query};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: Arc<Query>,
    pub intent: Option<Intent>,
    pub agent_results: Arc<Vec<AgentResult>>,
    pub verdict: Option<ConfidenceVerdict>,
    pub response: Arc<BriefResponse>,
    pub reasoning_trace: Arc<Vec<String>>,
    pub context_hash: String,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn query_id(&self) -> Uuid {
        self.query.id
    }
}

struct Entries {
    by_id: HashMap<Uuid, QueryRecord>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory audit storage
pub struct AuditLog {
    entries: Arc<RwLock<Entries>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries {
                by_id: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Store a record, evicting the oldest one when full.
    pub async fn record(&self, record: QueryRecord) -> Uuid {
        let id = record.query_id();
        let mut entries = self.entries.write().await;

        if entries.by_id.insert(id, record).is_none() {
            entries.order.push_back(id);
        }

        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.by_id.remove(&oldest);
            }
        }

        id
    }

    pub async fn get(&self, query_id: Uuid) -> Option<QueryRecord> {
        self.entries.read().await.by_id.get(&query_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Most recent query ids, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        entries.order.iter().rev().take(limit).copied().collect()
    }

    /// Recompute the context hash of a stored record.
    pub async fn verify_integrity(&self, query_id: Uuid) -> bool {
        let entries = self.entries.read().await;

        match entries.by_id.get(&query_id) {
            Some(record) => {
                compute_context_hash(&record.query, &record.agent_results) == record.context_hash
            }
            None => false,
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the query and the agent results it produced.
/// Serializes straight into the hasher.
pub fn compute_context_hash(query: &Query, results: &[AgentResult]) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &(query, results)).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
