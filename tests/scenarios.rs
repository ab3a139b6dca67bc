//! End-to-end routing scenarios against scripted agents.

use finance_brief_router::agents::MockAgent;
use finance_brief_router::error::{AgentError, FailureKind};
use finance_brief_router::{
    AgentParameters, AgentPayload, AgentRegistry, AudioClip, BriefStatus, Capability, Intent,
    MarketSnapshot, Modality, Orchestrator, Query, RetrievedChunk, RouterConfig,
};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BRIEF_QUESTION: &str =
    "What's our risk exposure in Asia tech stocks today, and highlight any earnings surprises?";

fn config() -> RouterConfig {
    RouterConfig {
        agent_timeout: Duration::from_millis(250),
        backoff_base: Duration::from_millis(2),
        query_deadline: Duration::from_secs(5),
        ..RouterConfig::default()
    }
}

fn docs(scores: &[f64]) -> AgentPayload {
    AgentPayload::Documents(
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| RetrievedChunk::new(format!("filing excerpt {}", i), format!("doc-{}", i), *s))
            .collect(),
    )
}

fn market_ok() -> MockAgent {
    MockAgent::new(Capability::MarketData).always(Ok(AgentPayload::MarketData(MarketSnapshot::default())))
}

fn retrieval(scores: &[f64]) -> MockAgent {
    MockAgent::new(Capability::Retrieval).always(Ok(docs(scores)))
}

fn narrator(text: &str) -> MockAgent {
    MockAgent::new(Capability::Narration).always(Ok(AgentPayload::Narration(text.to_string())))
}

#[tokio::test]
async fn scenario_strong_context_is_narrated() {
    let narrator = Arc::new(narrator("Asia tech is 22% of AUM, up from 18%."));
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(retrieval(&[0.9, 0.85, 0.2])))
        .with(narrator.clone());
    let orchestrator = Orchestrator::new(
        registry,
        RouterConfig {
            confidence_threshold: 0.75,
            min_chunks: 2,
            ..config()
        },
    );

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::Ok);
    assert_eq!(response.intent, Some(Intent::MarketBrief));
    let expected = (0.9 + 0.85 / 2.0) / 1.5;
    assert!((response.confidence.unwrap() - expected).abs() < 1e-9);
    // The 0.2 chunk falls outside the top two and is not cited.
    assert_eq!(response.sources, vec!["doc-0", "doc-1"]);
    assert_eq!(narrator.calls(), 1);
}

#[tokio::test]
async fn scenario_no_context_asks_for_clarification() {
    let narrator = Arc::new(narrator("unused"));
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(retrieval(&[])))
        .with(narrator.clone());
    let orchestrator = Orchestrator::new(registry, config());

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::NeedsClarification);
    assert_eq!(response.reason.as_deref(), Some("no context retrieved"));
    assert!(!response.text.is_empty());
    assert!(response.failure.is_none());
    assert_eq!(narrator.calls(), 0, "clarification must not call narration");
}

#[tokio::test]
async fn scenario_required_market_data_times_out() {
    let market = Arc::new(
        MockAgent::new(Capability::MarketData)
            .with_delay(Duration::from_millis(500))
            .always(Ok(AgentPayload::MarketData(MarketSnapshot::default()))),
    );
    let narrator = Arc::new(narrator("unused"));
    let registry = AgentRegistry::new()
        .with(market.clone())
        .with(Arc::new(retrieval(&[0.9, 0.9, 0.9])))
        .with(narrator.clone());
    let orchestrator = Orchestrator::new(
        registry,
        RouterConfig {
            agent_timeout: Duration::from_millis(30),
            max_retries: 1,
            ..config()
        },
    );

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::Error);
    assert_eq!(response.failure, Some(FailureKind::CapabilityFailed));
    let reason = response.reason.unwrap();
    assert!(reason.contains("market-data"), "{}", reason);
    assert_eq!(market.calls(), 2);
    assert_eq!(narrator.calls(), 0);
    assert!(response.reasoning_trace.last().unwrap().starts_with("FAILED"));
}

#[tokio::test]
async fn scenario_voice_answer_survives_speech_failure() {
    let speech = MockAgent::new(Capability::Speech)
        .then(Ok(AgentPayload::Transcript(BRIEF_QUESTION.to_string())))
        .always(Err(AgentError::Upstream {
            status: 500,
            body: "tts engine crashed".into(),
        }));
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(retrieval(&[0.95, 0.9, 0.85])))
        .with(Arc::new(narrator("Here is your morning brief.")))
        .with(Arc::new(speech));
    let orchestrator = Orchestrator::new(registry, RouterConfig { max_retries: 0, ..config() });

    let response = orchestrator.handle_voice("UklGRiQAAABXQVZF").await;

    assert_eq!(response.status, BriefStatus::Ok);
    assert_eq!(response.text, "Here is your morning brief.");
    assert!(response.audio.is_none());
    assert_eq!(response.transcription.as_deref(), Some(BRIEF_QUESTION));
    assert!(response.warnings.iter().any(|w| w.contains("audio unavailable")));
}

#[tokio::test]
async fn voice_flag_attaches_audio() {
    let clip = AudioClip {
        format: "mp3".into(),
        data_base64: "SUQz".into(),
    };
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(retrieval(&[0.95, 0.9, 0.85])))
        .with(Arc::new(narrator("Brief.")))
        .with(Arc::new(
            MockAgent::new(Capability::Speech).always(Ok(AgentPayload::Audio(clip.clone()))),
        ));
    let orchestrator = Orchestrator::new(registry, config());

    let response = orchestrator
        .handle(Query::new(BRIEF_QUESTION, Modality::Voice, None))
        .await;

    assert_eq!(response.status, BriefStatus::Ok);
    assert_eq!(response.audio, Some(clip));
}

#[tokio::test]
async fn transient_failures_are_retried_before_succeeding() {
    let market = Arc::new(
        MockAgent::new(Capability::MarketData)
            .then(Err(AgentError::Upstream {
                status: 503,
                body: "rate limited upstream".into(),
            }))
            .then(Err(AgentError::Timeout(250)))
            .always(Ok(AgentPayload::MarketData(MarketSnapshot::default()))),
    );
    let registry = AgentRegistry::new()
        .with(market.clone())
        .with(Arc::new(retrieval(&[0.9, 0.9, 0.9])))
        .with(Arc::new(narrator("ok")));
    let orchestrator = Orchestrator::new(registry, config());

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::Ok);
    assert_eq!(market.calls(), 3);

    let record = orchestrator.audit_log().get(response.query_id).await.unwrap();
    let market_result = record
        .agent_results
        .iter()
        .find(|r| r.capability == Capability::MarketData)
        .unwrap();
    assert_eq!(market_result.attempts, 3);
}

#[tokio::test]
async fn permanent_failure_of_required_capability_is_not_retried() {
    let retriever = Arc::new(MockAgent::new(Capability::Retrieval).always(Err(
        AgentError::Upstream {
            status: 401,
            body: "invalid api key".into(),
        },
    )));
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(retriever.clone())
        .with(Arc::new(narrator("unused")));
    let orchestrator = Orchestrator::new(registry, config());

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::Error);
    assert!(response.reason.unwrap().contains("retrieval"));
    assert_eq!(retriever.calls(), 1);
}

#[tokio::test]
async fn optional_capability_failure_still_completes() {
    let registry = AgentRegistry::new()
        .with(Arc::new(
            MockAgent::new(Capability::MarketData).always(Err(AgentError::Timeout(250))),
        ))
        .with(Arc::new(retrieval(&[0.92, 0.88, 0.8])))
        .with(Arc::new(narrator("TSMC manufactures semiconductors.")));
    let orchestrator = Orchestrator::new(registry, RouterConfig { max_retries: 1, ..config() });

    let response = orchestrator.handle(Query::text("What does TSMC make?")).await;

    assert_eq!(response.status, BriefStatus::Ok);
    assert_eq!(response.intent, Some(Intent::General));
    assert!(response.audio.is_none());
    assert_eq!(response.warnings.len(), 1);
    assert!(!response.sources.contains(&"market-data".to_string()));
}

#[tokio::test]
async fn deadline_cancels_in_flight_calls() {
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(
            MockAgent::new(Capability::Retrieval)
                .with_delay(Duration::from_secs(2))
                .always(Ok(docs(&[0.9]))),
        ))
        .with(Arc::new(narrator("unused")));
    let orchestrator = Orchestrator::new(
        registry,
        RouterConfig {
            agent_timeout: Duration::from_secs(5),
            query_deadline: Duration::from_millis(100),
            ..config()
        },
    );

    let start = Instant::now();
    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(response.status, BriefStatus::Error);
    assert_eq!(response.failure, Some(FailureKind::DeadlineExceeded));
    assert!(response.reason.unwrap().contains("deadline exceeded"));
}

#[tokio::test]
async fn narration_failure_downgrades_to_clarification() {
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(Arc::new(retrieval(&[0.9, 0.9, 0.9])))
        .with(Arc::new(
            MockAgent::new(Capability::Narration)
                .always(Err(AgentError::Malformed("Empty response from Gemini".into()))),
        ));
    let orchestrator = Orchestrator::new(registry, config());

    let response = orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    assert_eq!(response.status, BriefStatus::NeedsClarification);
    assert!(response.reason.unwrap().starts_with("narration unavailable"));
    assert!(response
        .reasoning_trace
        .iter()
        .any(|t| t.starts_with("CLARIFY")));
}

#[tokio::test]
async fn retrieval_request_follows_intent() {
    let retriever = Arc::new(retrieval(&[0.9, 0.9, 0.9]));
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok()))
        .with(retriever.clone())
        .with(Arc::new(narrator("ok")));
    let orchestrator = Orchestrator::new(registry, config());

    orchestrator.handle(Query::text("What does TSMC make?")).await;
    orchestrator.handle(Query::text(BRIEF_QUESTION)).await;

    let top_ks: Vec<usize> = retriever
        .requests()
        .iter()
        .filter_map(|r| match &r.parameters {
            AgentParameters::Retrieval { top_k, .. } => Some(*top_k),
            _ => None,
        })
        .collect();
    assert_eq!(top_ks, vec![10, 5]);
}

#[tokio::test]
async fn each_query_gets_exactly_one_response() {
    let registry = AgentRegistry::new()
        .with(Arc::new(market_ok().with_delay(Duration::from_millis(10))))
        .with(Arc::new(retrieval(&[0.9, 0.8, 0.3])))
        .with(Arc::new(narrator("ok")));
    let orchestrator = Arc::new(Orchestrator::new(registry, config()));

    let queries: Vec<Query> = (0..12)
        .map(|i| Query::text(format!("morning brief #{}", i)))
        .collect();
    let ids: HashSet<_> = queries.iter().map(|q| q.id).collect();

    let responses = join_all(queries.into_iter().map(|q| {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.handle(q).await }
    }))
    .await;

    let answered: HashSet<_> = responses.iter().map(|r| r.query_id).collect();
    assert_eq!(responses.len(), 12);
    assert_eq!(answered, ids);
    assert_eq!(orchestrator.audit_log().len().await, 12);
}
