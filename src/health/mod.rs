//! Last-known health of every capability
//!
//! Updated passively from dispatched agent results and actively from probes.

use crate::agents::AgentRegistry;
use crate::error::FailureClass;
use crate::models::{AgentHealth, AgentResult, Capability};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceHealth {
    /// "ok" or "degraded"
    pub status: String,
    pub detail: String,
}

pub struct HealthTracker {
    states: Arc<RwLock<BTreeMap<Capability, AgentHealth>>>,
}

impl HealthTracker {
    /// Registered capabilities start as unknown, the rest as disabled.
    pub fn new(registry: &AgentRegistry) -> Self {
        let states = Capability::ALL
            .iter()
            .map(|cap| {
                let health = if registry.is_enabled(*cap) {
                    AgentHealth::Unknown
                } else {
                    AgentHealth::Disabled
                };
                (*cap, health)
            })
            .collect();

        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    pub async fn record(&self, result: &AgentResult) {
        let health = match result.failure_class() {
            None => AgentHealth::Ok,
            Some(FailureClass::TransientUpstream) => AgentHealth::Degraded,
            Some(FailureClass::PermanentUpstream) => AgentHealth::Failing,
        };
        self.set(result.capability, health).await;
    }

    pub async fn set(&self, capability: Capability, health: AgentHealth) {
        let mut states = self.states.write().await;
        if states.get(&capability) == Some(&AgentHealth::Disabled) {
            return;
        }
        states.insert(capability, health);
    }

    pub async fn get(&self, capability: Capability) -> AgentHealth {
        self.states
            .read()
            .await
            .get(&capability)
            .copied()
            .unwrap_or(AgentHealth::Disabled)
    }

    pub async fn snapshot(&self) -> BTreeMap<Capability, AgentHealth> {
        self.states.read().await.clone()
    }

    /// Probe every registered client concurrently and store the answers.
    pub async fn probe_all(&self, registry: &AgentRegistry) {
        let probes = registry.list().into_iter().filter_map(|cap| {
            let client = registry.get(cap)?;
            Some(async move { (cap, client.health().await) })
        });

        for (cap, health) in join_all(probes).await {
            debug!(capability = %cap, ?health, "Probed agent");
            self.set(cap, health).await;
        }
    }

    /// Orchestrator health: ok only when every capability is registered and
    /// none is failing or offline.
    pub async fn overall(&self) -> ServiceHealth {
        let states = self.states.read().await;

        let problems: Vec<String> = states
            .iter()
            .filter(|(_, h)| {
                matches!(
                    h,
                    AgentHealth::Disabled | AgentHealth::Failing | AgentHealth::Offline
                )
            })
            .map(|(cap, h)| format!("{} {}", cap, health_label(*h)))
            .collect();

        if problems.is_empty() {
            ServiceHealth {
                status: "ok".to_string(),
                detail: format!("{} capabilities available", states.len()),
            }
        } else {
            ServiceHealth {
                status: "degraded".to_string(),
                detail: problems.join(", "),
            }
        }
    }
}

fn health_label(health: AgentHealth) -> &'static str {
    match health {
        AgentHealth::Ok => "ok",
        AgentHealth::Degraded => "degraded",
        AgentHealth::Failing => "failing",
        AgentHealth::Offline => "offline",
        AgentHealth::Unknown => "unknown",
        AgentHealth::Disabled => "disabled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::MockAgent;
    use crate::error::AgentError;
    use crate::models::{AgentParameters, AgentRequest};
    use uuid::Uuid;

    fn registry() -> AgentRegistry {
        AgentRegistry::new()
            .with(Arc::new(
                MockAgent::new(Capability::MarketData).with_health(AgentHealth::Offline),
            ))
            .with(Arc::new(MockAgent::new(Capability::Retrieval)))
    }

    #[tokio::test]
    async fn test_initial_states() {
        let tracker = HealthTracker::new(&registry());
        assert_eq!(tracker.get(Capability::Retrieval).await, AgentHealth::Unknown);
        assert_eq!(tracker.get(Capability::Speech).await, AgentHealth::Disabled);

        let overall = tracker.overall().await;
        assert_eq!(overall.status, "degraded");
        assert!(overall.detail.contains("narration disabled"));
    }

    #[tokio::test]
    async fn test_results_update_health() {
        let tracker = HealthTracker::new(&registry());
        let request = AgentRequest::new(
            Uuid::new_v4(),
            AgentParameters::Retrieval {
                query: "q".into(),
                top_k: 3,
                filter_type: None,
            },
        );

        tracker
            .record(&AgentResult::failed(&request, &AgentError::Timeout(10), 10))
            .await;
        assert_eq!(tracker.get(Capability::Retrieval).await, AgentHealth::Degraded);

        tracker
            .record(&AgentResult::failed(
                &request,
                &AgentError::Malformed("bad".into()),
                10,
            ))
            .await;
        assert_eq!(tracker.get(Capability::Retrieval).await, AgentHealth::Failing);
    }

    #[tokio::test]
    async fn test_disabled_capabilities_stay_disabled() {
        let tracker = HealthTracker::new(&registry());
        tracker.set(Capability::Narration, AgentHealth::Ok).await;
        assert_eq!(tracker.get(Capability::Narration).await, AgentHealth::Disabled);
    }

    #[tokio::test]
    async fn test_probe_all() {
        let registry = registry();
        let tracker = HealthTracker::new(&registry);
        tracker.probe_all(&registry).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot[&Capability::MarketData], AgentHealth::Offline);
        assert_eq!(snapshot[&Capability::Retrieval], AgentHealth::Ok);
    }

    #[tokio::test]
    async fn test_all_registered_and_healthy_is_ok() {
        let registry = Capability::ALL
            .iter()
            .fold(AgentRegistry::new(), |r, cap| r.with(Arc::new(MockAgent::new(*cap))));
        let tracker = HealthTracker::new(&registry);
        tracker.probe_all(&registry).await;
        assert_eq!(tracker.overall().await.status, "ok");
    }
}
