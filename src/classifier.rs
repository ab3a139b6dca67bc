//! Intent Classifier
//!
//! Maps a query to one of:
//! - MarketBrief: morning brief style questions (e.g. "what's our risk exposure in Asia tech today?")
//! - PortfolioAnalysis: holdings, allocation and risk questions
//! - General: anything else, answered from retrieved documents
//!
//! Pure keyword mapping; no model is consulted at this layer.

use crate::error::OrchestrationError;
use crate::models::{Capability, Intent, Query};
use crate::Result;

/// Phrases that always mean a market brief
const BRIEF_PHRASES: &[&str] = &["risk exposure", "morning brief", "market brief"];

const BRIEF_KEYWORDS: &[&str] = &[
    "brief", "morning", "today", "update", "news",
    "earnings", "surprise", "beat", "miss",
    "market", "indices", "index", "nikkei", "hang seng", "nasdaq",
];

const PORTFOLIO_KEYWORDS: &[&str] = &[
    "portfolio", "exposure", "allocation", "allocate", "holdings",
    "position", "rebalance", "diversif", "concentration", "risk",
    "weight",
];

/// Which capabilities an intent needs, and which it can do without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentPlan {
    pub intent: Intent,
    pub required: Vec<Capability>,
    pub optional: Vec<Capability>,
}

impl IntentPlan {
    pub fn for_intent(intent: Intent) -> Self {
        let (required, optional) = match intent {
            Intent::MarketBrief | Intent::PortfolioAnalysis => {
                (vec![Capability::MarketData, Capability::Retrieval], vec![])
            }
            Intent::General => (vec![Capability::Retrieval], vec![Capability::MarketData]),
        };
        Self {
            intent,
            required,
            optional,
        }
    }

    pub fn is_required(&self, capability: Capability) -> bool {
        self.required.contains(&capability)
    }
}

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a query. A declared query type takes precedence over the text.
    pub fn classify(query: &Query) -> Result<Intent> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(OrchestrationError::Classification(
                "query text is empty".to_string(),
            ));
        }

        if let Some(declared) = query.declared_type.as_deref() {
            let declared = declared.trim();
            if !declared.is_empty() {
                return parse_declared(declared);
            }
        }

        Ok(Self::infer(text))
    }

    /// Infer an intent from free text.
    pub fn infer(text: &str) -> Intent {
        let text = text.to_lowercase();

        if BRIEF_PHRASES.iter().any(|p| text.contains(p)) {
            return Intent::MarketBrief;
        }

        let brief_score = BRIEF_KEYWORDS
            .iter()
            .filter(|kw| text.contains(**kw))
            .count();

        let portfolio_score = PORTFOLIO_KEYWORDS
            .iter()
            .filter(|kw| text.contains(**kw))
            .count();

        if brief_score == 0 && portfolio_score == 0 {
            Intent::General
        } else if brief_score >= portfolio_score {
            Intent::MarketBrief
        } else {
            Intent::PortfolioAnalysis
        }
    }
}

fn parse_declared(declared: &str) -> Result<Intent> {
    match declared.to_lowercase().as_str() {
        "morning_brief" | "market_brief" | "market-brief" | "brief" => Ok(Intent::MarketBrief),
        "portfolio" | "portfolio_analysis" | "portfolio-analysis" | "risk_analysis" => {
            Ok(Intent::PortfolioAnalysis)
        }
        "general" | "general_query" => Ok(Intent::General),
        other => Err(OrchestrationError::Classification(format!(
            "unknown query_type '{}'",
            other
        ))),
    }
}
