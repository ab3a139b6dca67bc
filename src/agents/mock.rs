//! Scripted in-process agent used by tests and offline runs.

use super::AgentClient;
use crate::error::AgentError;
use crate::models::{AgentHealth, AgentPayload, AgentRequest, Capability};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Outcome = Result<AgentPayload, AgentError>;

/// Replays queued outcomes in order, then falls back to a fixed outcome.
pub struct MockAgent {
    capability: Capability,
    name: String,
    delay: Duration,
    queue: Mutex<VecDeque<Outcome>>,
    fallback: Option<Outcome>,
    health: AgentHealth,
    calls: AtomicU32,
    seen: Mutex<Vec<AgentRequest>>,
}

impl MockAgent {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            name: format!("mock-{}", capability),
            delay: Duration::ZERO,
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            health: AgentHealth::Ok,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_health(mut self, health: AgentHealth) -> Self {
        self.health = health;
        self
    }

    /// Outcome returned once the queue is drained.
    pub fn always(mut self, outcome: Outcome) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Queue a one-shot outcome.
    pub fn then(self, outcome: Outcome) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(outcome);
        }
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    fn next_outcome(&self) -> Outcome {
        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        queued
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                Err(AgentError::NotConfigured(format!(
                    "{} has no scripted outcome",
                    self.name
                )))
            })
    }
}

#[async_trait::async_trait]
impl AgentClient for MockAgent {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.next_outcome()
    }

    async fn health(&self) -> AgentHealth {
        self.health
    }
}
