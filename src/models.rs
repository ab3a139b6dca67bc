//! Core data models for the brief router

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{AgentError, FailureClass, FailureKind};

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Text,
    Voice,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    MarketBrief,
    PortfolioAnalysis,
    General,
}

/// An external data or model service reachable through an agent client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    MarketData,
    Retrieval,
    Narration,
    Speech,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::MarketData,
        Capability::Retrieval,
        Capability::Narration,
        Capability::Speech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MarketData => "market-data",
            Capability::Retrieval => "retrieval",
            Capability::Narration => "narration",
            Capability::Speech => "speech",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::MarketBrief => "market-brief",
            Intent::PortfolioAnalysis => "portfolio-analysis",
            Intent::General => "general",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Query =================
//

/// A caller's question. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    pub modality: Modality,
    /// Raw `query_type` supplied by the caller, if any.
    pub declared_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, modality: Modality, declared_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            modality,
            declared_type,
            received_at: Utc::now(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, Modality::Text, None)
    }
}

//
// ================= Agent I/O =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarketSection {
    Portfolio,
    Earnings,
    Indices,
    Sector,
}

/// Typed parameters for one agent call, discriminated by capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentParameters {
    MarketData {
        symbols: Vec<String>,
        sections: Vec<MarketSection>,
        period: String,
        sector_name: String,
    },
    Retrieval {
        query: String,
        top_k: usize,
        filter_type: Option<String>,
    },
    Narration {
        query: String,
        intent: Intent,
        market: Option<MarketSnapshot>,
        chunks: Vec<RetrievedChunk>,
    },
    SpeechToText {
        audio_base64: String,
    },
    TextToSpeech {
        text: String,
        language: String,
    },
}

impl AgentParameters {
    pub fn capability(&self) -> Capability {
        match self {
            AgentParameters::MarketData { .. } => Capability::MarketData,
            AgentParameters::Retrieval { .. } => Capability::Retrieval,
            AgentParameters::Narration { .. } => Capability::Narration,
            AgentParameters::SpeechToText { .. } | AgentParameters::TextToSpeech { .. } => {
                Capability::Speech
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub request_id: Uuid,
    pub query_id: Uuid,
    pub capability: Capability,
    pub parameters: AgentParameters,
}

impl AgentRequest {
    pub fn new(query_id: Uuid, parameters: AgentParameters) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            query_id,
            capability: parameters.capability(),
            parameters,
        }
    }
}

/// Decoded agent output. Never untyped JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AgentPayload {
    MarketData(MarketSnapshot),
    Documents(Vec<RetrievedChunk>),
    Narration(String),
    Transcript(String),
    Audio(AudioClip),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentStatus {
    Ok,
    Failed { class: FailureClass, reason: String },
}

/// Outcome of one dispatched agent request. Not mutated after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub request_id: Uuid,
    pub capability: Capability,
    pub payload: Option<AgentPayload>,
    pub status: AgentStatus,
    pub latency_ms: u64,
    pub attempts: u32,
}

impl AgentResult {
    pub fn ok(request: &AgentRequest, payload: AgentPayload, latency_ms: u64) -> Self {
        Self {
            request_id: request.request_id,
            capability: request.capability,
            payload: Some(payload),
            status: AgentStatus::Ok,
            latency_ms,
            attempts: 1,
        }
    }

    pub fn failed(request: &AgentRequest, error: &AgentError, latency_ms: u64) -> Self {
        Self {
            request_id: request.request_id,
            capability: request.capability,
            payload: None,
            status: AgentStatus::Failed {
                class: error.class(),
                reason: error.to_string(),
            },
            latency_ms,
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, AgentStatus::Ok)
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        match &self.status {
            AgentStatus::Ok => None,
            AgentStatus::Failed { class, .. } => Some(*class),
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            AgentStatus::Ok => None,
            AgentStatus::Failed { reason, .. } => Some(reason),
        }
    }
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StockQuote {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub change_percent: Option<f64>,
    pub exposure_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PortfolioExposure {
    pub holdings: Vec<StockQuote>,
    pub total_value: f64,
    pub asia_tech_exposure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsSurprise {
    pub symbol: String,
    pub eps_estimate: Option<f64>,
    pub eps_actual: Option<f64>,
    pub surprise_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexQuote {
    pub name: String,
    pub current_price: Option<f64>,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectorPerformance {
    pub name: String,
    pub average_change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarketSnapshot {
    pub portfolio: Option<PortfolioExposure>,
    pub earnings: Vec<EarningsSurprise>,
    pub indices: Vec<IndexQuote>,
    pub sector: Option<SectorPerformance>,
}

impl MarketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.portfolio.is_none()
            && self.earnings.is_empty()
            && self.indices.is_empty()
            && self.sector.is_none()
    }
}

//
// ================= Retrieval =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_id: String,
    /// Similarity in [0, 1].
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            score: clamp_score(score),
            metadata: BTreeMap::new(),
        }
    }
}

/// Clamp a similarity score into [0, 1]; non-finite values become 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

//
// ================= Confidence =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Proceed,
    Clarify,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceVerdict {
    pub aggregate: f64,
    pub decision: Decision,
    pub rationale: String,
    /// Number of chunks that contributed to the aggregate.
    pub considered: usize,
}

//
// ================= Speech =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    pub format: String,
    pub data_base64: String,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BriefStatus {
    Ok,
    NeedsClarification,
    Error,
}

/// The single terminal artifact returned for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefResponse {
    pub query_id: Uuid,
    pub status: BriefStatus,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioClip>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub reasoning_trace: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

//
// ================= Health =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentHealth {
    Ok,
    Degraded,
    Failing,
    Offline,
    Unknown,
    Disabled,
}
