//! Main orchestrator - implements the per-query routing loop
//!
//! RECEIVED → CLASSIFY → DISPATCH → AWAIT → EVALUATE → SYNTHESIZE | CLARIFY → COMPLETE
//!
//! Every query ends in exactly one `BriefResponse`, whether it completes,
//! asks for clarification or fails.

use crate::agents::{AgentClient, AgentRegistry};
use crate::audit::{compute_context_hash, AuditLog, QueryRecord};
use crate::classifier::{IntentClassifier, IntentPlan};
use crate::config::RouterConfig;
use crate::confidence::ConfidenceEvaluator;
use crate::error::{FailureKind, OrchestrationError};
use crate::execution::{Dispatcher, RetryPolicy};
use crate::health::HealthTracker;
use crate::models::{
    AgentParameters, AgentPayload, AgentRequest, AgentResult, AudioClip, BriefResponse,
    BriefStatus, Capability, ConfidenceVerdict, Decision, Intent, MarketSection, MarketSnapshot,
    Modality, Query, RetrievedChunk,
};
use crate::state::{QueryRun, RouterState};
use crate::synthesis::{clarifying_question, ResponseSynthesizer, SynthesisInput, SynthesisOutcome};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

const MARKET_PERIOD: &str = "1d";

/// Mutable bookkeeping for one query
struct RunContext {
    run: QueryRun,
    intent: Option<Intent>,
    results: Vec<AgentResult>,
    verdict: Option<ConfidenceVerdict>,
    transcription: Option<String>,
}

impl RunContext {
    fn new(query_id: Uuid) -> Self {
        Self {
            run: QueryRun::new(query_id),
            intent: None,
            results: Vec::new(),
            verdict: None,
            transcription: None,
        }
    }
}

/// What the run produced, before trace and audit are attached
struct Answer {
    status: BriefStatus,
    text: String,
    audio: Option<AudioClip>,
    sources: Vec<String>,
    confidence: Option<f64>,
    reason: Option<String>,
    failure: Option<FailureKind>,
    warnings: Vec<String>,
}

impl Answer {
    fn failed(error: &OrchestrationError) -> Self {
        let reason = error.to_string();
        Self {
            status: BriefStatus::Error,
            text: format!("Unable to answer this query: {}", reason),
            audio: None,
            sources: Vec::new(),
            confidence: None,
            reason: Some(reason),
            failure: Some(error.failure_kind()),
            warnings: Vec::new(),
        }
    }
}

/// Main orchestrator that coordinates the whole query flow
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    config: RouterConfig,
    dispatcher: Dispatcher,
    evaluator: ConfidenceEvaluator,
    synthesizer: ResponseSynthesizer,
    health: HealthTracker,
    audit_log: AuditLog,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry, config: RouterConfig) -> Self {
        Self::with_audit_log(registry, config, AuditLog::new())
    }

    pub fn with_audit_log(registry: AgentRegistry, config: RouterConfig, audit_log: AuditLog) -> Self {
        let registry = Arc::new(registry);
        let dispatcher = Dispatcher::new(RetryPolicy::from_config(&config));
        let evaluator = ConfidenceEvaluator::new(config.confidence_threshold, config.min_chunks);
        let synthesizer = ResponseSynthesizer::new(
            registry.clone(),
            dispatcher.clone(),
            config.tts_language.clone(),
        );
        let health = HealthTracker::new(&registry);

        Self {
            registry,
            config,
            dispatcher,
            evaluator,
            synthesizer,
            health,
            audit_log,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Handle a text (or text-with-audio) query.
    pub async fn handle(&self, query: Query) -> BriefResponse {
        let ctx = RunContext::new(query.id);
        self.execute(query, ctx, self.config.query_deadline).await
    }

    /// Handle a spoken query: transcribe first, then route the transcript.
    pub async fn handle_voice(&self, audio_base64: &str) -> BriefResponse {
        let started = Instant::now();
        let deadline = self.config.query_deadline;
        let pending = Query::new(String::new(), Modality::Voice, None);
        let mut ctx = RunContext::new(pending.id);

        let transcribed =
            match tokio::time::timeout(deadline, self.transcribe(&pending, audio_base64, &mut ctx))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(OrchestrationError::DeadlineExceeded(deadline.as_millis() as u64)),
            };

        match transcribed {
            Ok(text) => {
                let query = Query {
                    text: text.clone(),
                    ..pending
                };
                ctx.transcription = Some(text);
                let remaining = deadline.saturating_sub(started.elapsed());
                self.execute(query, ctx, remaining).await
            }
            Err(e) => self.finish(pending, ctx, Err(e)).await,
        }
    }

    async fn transcribe(
        &self,
        query: &Query,
        audio_base64: &str,
        ctx: &mut RunContext,
    ) -> Result<String> {
        let speech = self
            .registry
            .get(Capability::Speech)
            .ok_or(OrchestrationError::CapabilityUnavailable(Capability::Speech))?;

        let request = AgentRequest::new(
            query.id,
            AgentParameters::SpeechToText {
                audio_base64: audio_base64.to_string(),
            },
        );
        let result = self.dispatcher.invoke_with_retry(speech.as_ref(), &request).await;
        self.health.record(&result).await;

        let outcome = match &result.payload {
            Some(AgentPayload::Transcript(text)) => Ok(text.clone()),
            Some(_) => Err(OrchestrationError::Transcription(
                "speech service returned no transcript".to_string(),
            )),
            None => Err(OrchestrationError::Transcription(
                result
                    .failure_reason()
                    .unwrap_or("speech-to-text failed")
                    .to_string(),
            )),
        };
        ctx.results.push(result);

        let text = outcome?;
        ctx.run.note(format!("Transcribed {} chars", text.len()));
        Ok(text)
    }

    /// Run the state machine under the global deadline and record the outcome.
    async fn execute(&self, query: Query, mut ctx: RunContext, budget: Duration) -> BriefResponse {
        info!(
            query_id = %query.id,
            modality = ?query.modality,
            "Orchestrator: handling query"
        );

        let outcome = match tokio::time::timeout(budget, self.run(&query, &mut ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(query_id = %query.id, budget_ms = budget.as_millis() as u64, "Query deadline exceeded, in-flight calls cancelled");
                Err(OrchestrationError::DeadlineExceeded(
                    self.config.query_deadline.as_millis() as u64,
                ))
            }
        };

        self.finish(query, ctx, outcome).await
    }

    async fn run(&self, query: &Query, ctx: &mut RunContext) -> Result<Answer> {
        // === CLASSIFY ===
        ctx.run.advance(RouterState::Classifying, "Inferring intent")?;
        let intent = IntentClassifier::classify(query)?;
        ctx.intent = Some(intent);
        ctx.run.note(format!("Intent {}", intent));

        let plan = IntentPlan::for_intent(intent);
        if let Some(missing) = plan
            .required
            .iter()
            .find(|cap| !self.registry.is_enabled(**cap))
        {
            return Err(OrchestrationError::CapabilityUnavailable(*missing));
        }

        // === DISPATCH ===
        let requests = self.build_requests(query, &plan);
        let targets: Vec<String> = requests
            .iter()
            .map(|(_, r)| r.capability.to_string())
            .collect();
        ctx.run.advance(
            RouterState::Dispatching,
            format!("{} agent request(s): {}", requests.len(), targets.join(", ")),
        )?;

        // === AWAIT ===
        ctx.run
            .advance(RouterState::Awaiting, "Waiting for all agent results")?;
        let results = self.dispatcher.dispatch_all(requests).await;

        let mut warnings = Vec::new();
        let mut market = None;
        let mut chunks = Vec::new();
        let mut required_failure = None;

        for result in &results {
            self.health.record(result).await;

            match (&result.payload, result.failure_reason()) {
                (Some(payload), _) => {
                    ctx.run.note(format!(
                        "{} ok in {} ms ({} attempt(s))",
                        result.capability, result.latency_ms, result.attempts
                    ));
                    match payload {
                        AgentPayload::MarketData(snapshot) => market = Some(snapshot.clone()),
                        AgentPayload::Documents(docs) => chunks.extend(docs.iter().cloned()),
                        _ => {}
                    }
                }
                (None, reason) => {
                    let reason = reason.unwrap_or("unknown failure").to_string();
                    ctx.run.note(format!(
                        "{} failed after {} attempt(s): {}",
                        result.capability, result.attempts, reason
                    ));
                    if plan.is_required(result.capability) {
                        required_failure.get_or_insert((result.capability, reason));
                    } else {
                        warnings.push(format!("{} unavailable: {}", result.capability, reason));
                    }
                }
            }
        }
        ctx.results.extend(results);

        if let Some((capability, reason)) = required_failure {
            return Err(OrchestrationError::RequiredCapabilityFailed { capability, reason });
        }

        // === EVALUATE ===
        ctx.run.advance(
            RouterState::Evaluating,
            format!("Scoring {} retrieved chunk(s)", chunks.len()),
        )?;
        let verdict = self.evaluator.evaluate(&chunks);
        ctx.verdict = Some(verdict.clone());
        ctx.run.note(verdict.rationale.clone());

        if verdict.decision == Decision::Clarify {
            ctx.run
                .advance(RouterState::Clarifying, "Context insufficient")?;
            return self.clarify(query, intent, &verdict, verdict.rationale.clone(), warnings, ctx);
        }

        // === SYNTHESIZE ===
        ctx.run
            .advance(RouterState::Synthesizing, "Requesting narration")?;
        // Only the chunks the verdict scored reach narration and sources.
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        chunks.truncate(verdict.considered);
        let sources = collect_sources(&chunks, market.as_ref());

        let before = ctx.results.len();
        let outcome = self
            .synthesizer
            .synthesize(
                SynthesisInput {
                    query,
                    intent,
                    market,
                    chunks,
                    with_audio: query.modality == Modality::Voice,
                },
                &mut ctx.results,
            )
            .await;
        for result in &ctx.results[before..] {
            self.health.record(result).await;
        }

        match outcome {
            SynthesisOutcome::Narrated {
                text,
                audio,
                warnings: synthesis_warnings,
            } => {
                warnings.extend(synthesis_warnings);
                ctx.run.advance(
                    RouterState::Completed,
                    format!("Brief ready ({} chars, audio: {})", text.len(), audio.is_some()),
                )?;

                Ok(Answer {
                    status: BriefStatus::Ok,
                    text,
                    audio,
                    sources,
                    confidence: Some(verdict.aggregate),
                    reason: None,
                    failure: None,
                    warnings,
                })
            }
            SynthesisOutcome::Downgraded { reason } => {
                ctx.run.advance(
                    RouterState::Clarifying,
                    format!("Narration unavailable: {}", reason),
                )?;
                let reason = format!("narration unavailable: {}", reason);
                self.clarify(query, intent, &verdict, reason, warnings, ctx)
            }
        }
    }

    fn clarify(
        &self,
        query: &Query,
        intent: Intent,
        verdict: &ConfidenceVerdict,
        reason: String,
        warnings: Vec<String>,
        ctx: &mut RunContext,
    ) -> Result<Answer> {
        let question = clarifying_question(query, intent, verdict);
        ctx.run
            .advance(RouterState::Completed, "Clarification requested")?;

        Ok(Answer {
            status: BriefStatus::NeedsClarification,
            text: question,
            audio: None,
            sources: Vec::new(),
            confidence: Some(verdict.aggregate),
            reason: Some(reason),
            failure: None,
            warnings,
        })
    }

    /// One request per required capability plus every enabled optional one.
    fn build_requests(
        &self,
        query: &Query,
        plan: &IntentPlan,
    ) -> Vec<(Arc<dyn AgentClient>, AgentRequest)> {
        plan.required
            .iter()
            .chain(plan.optional.iter())
            .filter_map(|cap| {
                let client = self.registry.get(*cap)?;
                let parameters = self.parameters_for(*cap, query, plan.intent)?;
                Some((client, AgentRequest::new(query.id, parameters)))
            })
            .collect()
    }

    fn parameters_for(
        &self,
        capability: Capability,
        query: &Query,
        intent: Intent,
    ) -> Option<AgentParameters> {
        match capability {
            Capability::MarketData => Some(AgentParameters::MarketData {
                symbols: self.config.portfolio_symbols.clone(),
                sections: market_sections(intent),
                period: MARKET_PERIOD.to_string(),
                sector_name: self.config.sector_name.clone(),
            }),
            Capability::Retrieval => Some(AgentParameters::Retrieval {
                query: query.text.clone(),
                top_k: match intent {
                    Intent::General => self.config.general_top_k,
                    _ => self.config.brief_top_k,
                },
                filter_type: None,
            }),
            // Narration and speech are driven by the synthesizer.
            Capability::Narration | Capability::Speech => None,
        }
    }

    async fn finish(
        &self,
        query: Query,
        mut ctx: RunContext,
        outcome: Result<Answer>,
    ) -> BriefResponse {
        let answer = match outcome {
            Ok(answer) => answer,
            Err(e) => {
                warn!(query_id = %query.id, error = %e, "Query failed");
                ctx.run.fail(&e.to_string());
                Answer::failed(&e)
            }
        };

        let execution_time_ms = ctx.run.elapsed_ms();
        let response = BriefResponse {
            query_id: query.id,
            status: answer.status,
            text: answer.text,
            audio: answer.audio,
            sources: answer.sources,
            intent: ctx.intent,
            confidence: answer.confidence,
            transcription: ctx.transcription.clone(),
            reason: answer.reason,
            failure: answer.failure,
            warnings: answer.warnings,
            reasoning_trace: ctx.run.trace().to_vec(),
            completed_at: Utc::now(),
        };

        info!(
            query_id = %query.id,
            status = ?response.status,
            elapsed_ms = execution_time_ms,
            "Orchestrator: query finished"
        );

        let record = QueryRecord {
            context_hash: compute_context_hash(&query, &ctx.results),
            query: Arc::new(query),
            intent: ctx.intent,
            agent_results: Arc::new(ctx.results),
            verdict: ctx.verdict,
            response: Arc::new(response.clone()),
            reasoning_trace: Arc::new(ctx.run.into_trace()),
            execution_time_ms,
            created_at: Utc::now(),
        };
        self.audit_log.record(record).await;

        response
    }
}

fn market_sections(intent: Intent) -> Vec<MarketSection> {
    match intent {
        Intent::MarketBrief => vec![
            MarketSection::Portfolio,
            MarketSection::Earnings,
            MarketSection::Indices,
            MarketSection::Sector,
        ],
        Intent::PortfolioAnalysis => vec![MarketSection::Portfolio, MarketSection::Sector],
        Intent::General => vec![MarketSection::Indices],
    }
}

/// Source ids in rank order without duplicates, market data last.
fn collect_sources(ranked: &[RetrievedChunk], market: Option<&MarketSnapshot>) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in ranked {
        if !sources.contains(&chunk.source_id) {
            sources.push(chunk.source_id.clone());
        }
    }
    if market.is_some_and(|m| !m.is_empty()) {
        sources.push(Capability::MarketData.to_string());
    }
    sources
}
