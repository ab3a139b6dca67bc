//! Dispatcher for agent requests
//!
//! Issues every request of a query concurrently and waits for all of them
//! (join-all, not first-completed). Each request gets its own per-attempt
//! timeout and retry budget; only transient failures are retried.

use crate::agents::AgentClient;
use crate::config::RouterConfig;
use crate::models::{AgentRequest, AgentResult};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy applied to every dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: config.backoff_base,
            attempt_timeout: config.agent_timeout,
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Dispatches agent requests with retry
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke one request until it succeeds, fails permanently, or the retry
    /// budget is spent. The returned result records the attempt count.
    pub async fn invoke_with_retry(
        &self,
        client: &dyn AgentClient,
        request: &AgentRequest,
    ) -> AgentResult {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = client.invoke(request, self.policy.attempt_timeout).await;

            let retryable = result
                .failure_class()
                .map(|class| class.is_retryable())
                .unwrap_or(false);

            if !retryable || attempt > self.policy.max_retries {
                if retryable {
                    warn!(
                        capability = %request.capability,
                        attempts = attempt,
                        "Retry budget exhausted"
                    );
                }
                return result.with_attempts(attempt);
            }

            let backoff = self.policy.backoff_for(attempt);
            debug!(
                capability = %request.capability,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                reason = result.failure_reason().unwrap_or_default(),
                "Transient failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Run every request concurrently. Results come back in request order.
    pub async fn dispatch_all(
        &self,
        requests: Vec<(Arc<dyn AgentClient>, AgentRequest)>,
    ) -> Vec<AgentResult> {
        let calls = requests.iter().map(|(client, request)| async move {
            self.invoke_with_retry(client.as_ref(), request).await
        });

        join_all(calls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::MockAgent;
    use crate::error::{AgentError, FailureClass};
    use crate::models::{AgentParameters, AgentPayload, Capability};
    use std::time::Instant;
    use uuid::Uuid;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    fn retrieval_request() -> AgentRequest {
        AgentRequest::new(
            Uuid::new_v4(),
            AgentParameters::Retrieval {
                query: "asia tech".into(),
                top_k: 5,
                filter_type: None,
            },
        )
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(10));
        assert_eq!(policy.base_backoff, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let agent = MockAgent::new(Capability::Retrieval)
            .then(Err(AgentError::Timeout(100)))
            .then(Err(AgentError::Upstream {
                status: 503,
                body: "busy".into(),
            }))
            .always(Ok(AgentPayload::Documents(vec![])));

        let result = Dispatcher::new(policy(2))
            .invoke_with_retry(&agent, &retrieval_request())
            .await;

        assert!(result.is_ok());
        assert_eq!(result.attempts, 3);
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_capped() {
        let agent = MockAgent::new(Capability::MarketData).always(Err(AgentError::Timeout(100)));

        let result = Dispatcher::new(policy(2))
            .invoke_with_retry(&agent, &retrieval_request())
            .await;

        assert_eq!(result.failure_class(), Some(FailureClass::TransientUpstream));
        assert_eq!(result.attempts, 3);
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let agent = MockAgent::new(Capability::Retrieval).always(Err(AgentError::Upstream {
            status: 401,
            body: "bad key".into(),
        }));

        let result = Dispatcher::new(policy(2))
            .invoke_with_retry(&agent, &retrieval_request())
            .await;

        assert_eq!(result.failure_class(), Some(FailureClass::PermanentUpstream));
        assert_eq!(result.attempts, 1);
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_all_runs_concurrently() {
        let slow = Duration::from_millis(80);
        let a: Arc<dyn AgentClient> = Arc::new(
            MockAgent::new(Capability::MarketData)
                .with_delay(slow)
                .always(Ok(AgentPayload::MarketData(Default::default()))),
        );
        let b: Arc<dyn AgentClient> = Arc::new(
            MockAgent::new(Capability::Retrieval)
                .with_delay(slow)
                .always(Ok(AgentPayload::Documents(vec![]))),
        );

        let query_id = Uuid::new_v4();
        let requests = vec![
            (
                a,
                AgentRequest::new(
                    query_id,
                    AgentParameters::MarketData {
                        symbols: vec!["TSM".into()],
                        sections: vec![],
                        period: "1d".into(),
                        sector_name: "Asia Tech".into(),
                    },
                ),
            ),
            (b, retrieval_request()),
        ];

        let start = Instant::now();
        let results = Dispatcher::new(policy(0)).dispatch_all(requests).await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].capability, Capability::MarketData);
        assert_eq!(results[1].capability, Capability::Retrieval);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(elapsed < slow * 2, "calls ran sequentially: {:?}", elapsed);
    }
}
