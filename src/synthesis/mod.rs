//! Response synthesis
//!
//! Hands verdict-approved context to the narration capability and, for voice
//! queries, the narrated text to the speech capability. Narration failure is
//! reported back as a downgrade; speech failure only costs the audio.

use crate::agents::AgentRegistry;
use crate::execution::Dispatcher;
use crate::models::{
    AgentParameters, AgentPayload, AgentRequest, AgentResult, AudioClip, Capability,
    ConfidenceVerdict, Intent, MarketSnapshot, Query, RetrievedChunk,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the synthesizer needs for one query
#[derive(Debug, Clone)]
pub struct SynthesisInput<'a> {
    pub query: &'a Query,
    pub intent: Intent,
    pub market: Option<MarketSnapshot>,
    pub chunks: Vec<RetrievedChunk>,
    pub with_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Narrated {
        text: String,
        audio: Option<AudioClip>,
        warnings: Vec<String>,
    },
    /// Narration was unavailable or failed; the caller should clarify instead.
    Downgraded { reason: String },
}

pub struct ResponseSynthesizer {
    registry: Arc<AgentRegistry>,
    dispatcher: Dispatcher,
    tts_language: String,
}

impl ResponseSynthesizer {
    pub fn new(registry: Arc<AgentRegistry>, dispatcher: Dispatcher, tts_language: String) -> Self {
        Self {
            registry,
            dispatcher,
            tts_language,
        }
    }

    /// Narrate the context. Every agent result produced along the way is
    /// appended to `results`.
    pub async fn synthesize(
        &self,
        input: SynthesisInput<'_>,
        results: &mut Vec<AgentResult>,
    ) -> SynthesisOutcome {
        let Some(narrator) = self.registry.get(Capability::Narration) else {
            warn!(query_id = %input.query.id, "Narration capability not configured");
            return SynthesisOutcome::Downgraded {
                reason: "narration capability is not configured".to_string(),
            };
        };

        let request = AgentRequest::new(
            input.query.id,
            AgentParameters::Narration {
                query: input.query.text.clone(),
                intent: input.intent,
                market: input.market,
                chunks: input.chunks,
            },
        );

        let result = self
            .dispatcher
            .invoke_with_retry(narrator.as_ref(), &request)
            .await;
        let narration = match &result.payload {
            Some(AgentPayload::Narration(text)) if !text.trim().is_empty() => Ok(text.clone()),
            Some(_) => Err("narration returned no text".to_string()),
            None => Err(result
                .failure_reason()
                .unwrap_or("narration failed")
                .to_string()),
        };
        results.push(result);

        let text = match narration {
            Ok(text) => text,
            Err(reason) => {
                warn!(query_id = %input.query.id, %reason, "Narration failed, downgrading");
                return SynthesisOutcome::Downgraded { reason };
            }
        };

        let mut warnings = Vec::new();
        let audio = if input.with_audio {
            match self.speak(input.query, &text, results).await {
                Ok(clip) => Some(clip),
                Err(reason) => {
                    warn!(query_id = %input.query.id, %reason, "Speech synthesis failed, returning text only");
                    warnings.push(format!("audio unavailable: {}", reason));
                    None
                }
            }
        } else {
            None
        };

        info!(
            query_id = %input.query.id,
            chars = text.len(),
            audio = audio.is_some(),
            "Response synthesized"
        );

        SynthesisOutcome::Narrated {
            text,
            audio,
            warnings,
        }
    }

    async fn speak(
        &self,
        query: &Query,
        text: &str,
        results: &mut Vec<AgentResult>,
    ) -> Result<AudioClip, String> {
        let speech = self
            .registry
            .get(Capability::Speech)
            .ok_or_else(|| "speech capability is not configured".to_string())?;

        let request = AgentRequest::new(
            query.id,
            AgentParameters::TextToSpeech {
                text: text.to_string(),
                language: self.tts_language.clone(),
            },
        );

        let result = self
            .dispatcher
            .invoke_with_retry(speech.as_ref(), &request)
            .await;
        let outcome = match &result.payload {
            Some(AgentPayload::Audio(clip)) => Ok(clip.clone()),
            Some(_) => Err("speech returned no audio".to_string()),
            None => Err(result
                .failure_reason()
                .unwrap_or("speech synthesis failed")
                .to_string()),
        };
        results.push(result);
        outcome
    }
}

/// Question put back to the caller when context is not good enough.
pub fn clarifying_question(query: &Query, intent: Intent, verdict: &ConfidenceVerdict) -> String {
    let ask = match intent {
        Intent::MarketBrief => {
            "Which markets, companies or time window should the brief cover?"
        }
        Intent::PortfolioAnalysis => {
            "Which holdings or which part of the portfolio should I look at?"
        }
        Intent::General => {
            "Could you name the specific company, ticker or filing you are asking about?"
        }
    };

    format!(
        "I couldn't find reliable enough information to answer \"{}\" ({}). {}",
        query.text.trim(),
        verdict.rationale,
        ask
    )
}
