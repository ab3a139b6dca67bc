//! Agent client trait and registry
//!
//! Each agent client wraps one external capability behind a typed request
//! and a typed payload. Clients hold their own connection pools and carry no
//! per-query state, so one instance serves concurrent queries.

use crate::config::AppConfig;
use crate::error::AgentError;
use crate::models::{AgentHealth, AgentPayload, AgentRequest, AgentResult, Capability};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod http;
pub mod market_data;
pub mod mock;
pub mod narration;
pub mod retrieval;
pub mod speech;

pub use market_data::HttpMarketDataAgent;
pub use mock::MockAgent;
pub use narration::GeminiNarrator;
pub use retrieval::HttpRetrievalAgent;
pub use speech::HttpSpeechAgent;

/// Trait for a single capability client
#[async_trait::async_trait]
pub trait AgentClient: Send + Sync {
    fn capability(&self) -> Capability;

    fn name(&self) -> &str;

    /// Perform the external call.
    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError>;

    /// Probe the upstream service.
    async fn health(&self) -> AgentHealth;

    /// Call with a bounded timeout. Expected failures come back as a
    /// failed `AgentResult`, never as an error.
    async fn invoke(&self, request: &AgentRequest, timeout: Duration) -> AgentResult {
        let start = Instant::now();

        let outcome = match tokio::time::timeout(timeout, self.call(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::Timeout(timeout.as_millis() as u64)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                debug!(
                    agent = %self.name(),
                    capability = %request.capability,
                    latency_ms,
                    "Agent call succeeded"
                );
                AgentResult::ok(request, payload, latency_ms)
            }
            Err(e) => {
                warn!(
                    agent = %self.name(),
                    capability = %request.capability,
                    error = %e,
                    latency_ms,
                    "Agent call failed"
                );
                AgentResult::failed(request, &e, latency_ms)
            }
        }
    }
}

/// Registry of the capabilities available to the router
pub struct AgentRegistry {
    agents: BTreeMap<Capability, Arc<dyn AgentClient>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, agent: Arc<dyn AgentClient>) {
        self.agents.insert(agent.capability(), agent);
    }

    pub fn with(mut self, agent: Arc<dyn AgentClient>) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, capability: Capability) -> Option<Arc<dyn AgentClient>> {
        self.agents.get(&capability).cloned()
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.agents.contains_key(&capability)
    }

    pub fn list(&self) -> Vec<Capability> {
        self.agents.keys().copied().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry holding every capability the configuration enables.
pub fn build_registry(config: &AppConfig) -> Result<AgentRegistry, AgentError> {
    let mut registry = AgentRegistry::new();
    let timeout = config.router.agent_timeout;

    if config.market_data.enabled {
        registry.register(Arc::new(HttpMarketDataAgent::new(
            &config.market_data,
            timeout,
        )?));
    } else {
        warn!("Market data capability disabled by configuration");
    }

    if config.retrieval.is_usable() {
        registry.register(Arc::new(HttpRetrievalAgent::new(&config.retrieval, timeout)?));
    } else {
        warn!(
            backend = %config.retrieval.backend,
            "Retrieval capability disabled: vector store credentials missing"
        );
    }

    match config.narration.api_key.as_deref() {
        Some(_) => {
            registry.register(Arc::new(GeminiNarrator::new(&config.narration, timeout)?));
        }
        None => warn!("GEMINI_API_KEY not set; narration capability disabled"),
    }

    if config.speech.enabled {
        registry.register(Arc::new(HttpSpeechAgent::new(&config.speech, timeout)?));
    } else {
        warn!("Speech capability disabled by configuration");
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentParameters, AgentStatus};
    use crate::error::FailureClass;
    use uuid::Uuid;

    fn retrieval_request() -> AgentRequest {
        AgentRequest::new(
            Uuid::new_v4(),
            AgentParameters::Retrieval {
                query: "asia tech earnings".into(),
                top_k: 5,
                filter_type: None,
            },
        )
    }

    #[tokio::test]
    async fn test_invoke_times_out_as_transient_failure() {
        let agent = MockAgent::new(Capability::Retrieval)
            .with_delay(Duration::from_millis(200))
            .always(Ok(AgentPayload::Documents(vec![])));

        let result = agent
            .invoke(&retrieval_request(), Duration::from_millis(20))
            .await;

        assert!(!result.is_ok());
        assert_eq!(result.failure_class(), Some(FailureClass::TransientUpstream));
        assert!(result.failure_reason().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_invoke_wraps_payload() {
        let agent = MockAgent::new(Capability::Retrieval)
            .always(Ok(AgentPayload::Documents(vec![])));

        let request = retrieval_request();
        let result = agent.invoke(&request, Duration::from_secs(1)).await;

        assert_eq!(result.status, AgentStatus::Ok);
        assert_eq!(result.request_id, request.request_id);
        assert_eq!(result.payload, Some(AgentPayload::Documents(vec![])));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AgentRegistry::new()
            .with(Arc::new(MockAgent::new(Capability::Retrieval)))
            .with(Arc::new(MockAgent::new(Capability::Speech)));

        assert!(registry.is_enabled(Capability::Retrieval));
        assert!(!registry.is_enabled(Capability::Narration));
        assert_eq!(registry.list(), vec![Capability::Retrieval, Capability::Speech]);
    }

    #[test]
    fn test_build_registry_respects_configuration() {
        let mut config = AppConfig::default();
        let registry = build_registry(&config).unwrap();
        assert!(registry.is_enabled(Capability::MarketData));
        assert!(registry.is_enabled(Capability::Retrieval));
        assert!(registry.is_enabled(Capability::Speech));
        assert!(!registry.is_enabled(Capability::Narration));

        config.narration.api_key = Some("key".into());
        config.speech.enabled = false;
        config.retrieval.backend = "pinecone".into();
        let registry = build_registry(&config).unwrap();
        assert!(registry.is_enabled(Capability::Narration));
        assert!(!registry.is_enabled(Capability::Speech));
        assert!(!registry.is_enabled(Capability::Retrieval));
    }
}
