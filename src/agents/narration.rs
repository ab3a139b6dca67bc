//! Narration agent
//!
//! Turns market data and retrieved context into prose through Gemini. Only
//! this module knows about prompts; the router hands over typed inputs.

use super::AgentClient;
use crate::config::NarrationConfig;
use crate::error::AgentError;
use crate::gemini::GeminiClient;
use crate::models::{
    AgentHealth, AgentParameters, AgentPayload, AgentRequest, Capability, Intent,
    MarketSnapshot, RetrievedChunk,
};
use std::fmt::Write;
use std::time::Duration;

const BASE_PROMPT: &str = r#"You are a professional financial analyst covering Asian technology markets.

Guidelines:
- Use only the market data and documents provided
- Quote figures exactly as given; do not invent numbers
- Be structured and concise
- Use professional financial language"#;

pub struct GeminiNarrator {
    client: GeminiClient,
}

impl GeminiNarrator {
    pub fn new(config: &NarrationConfig, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            client: GeminiClient::new(config, timeout)?,
        })
    }

    pub fn from_client(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AgentClient for GeminiNarrator {
    fn capability(&self) -> Capability {
        Capability::Narration
    }

    fn name(&self) -> &str {
        "language"
    }

    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError> {
        let AgentParameters::Narration {
            query,
            intent,
            market,
            chunks,
        } = &request.parameters
        else {
            return Err(AgentError::InvalidRequest(
                "narrator expects narration parameters".to_string(),
            ));
        };

        let system = system_prompt(*intent);
        let prompt = render_prompt(query, market.as_ref(), chunks);
        let text = self.client.generate(&system, &prompt).await?;

        Ok(AgentPayload::Narration(text))
    }

    /// Configured means reachable as far as the router is concerned.
    async fn health(&self) -> AgentHealth {
        AgentHealth::Ok
    }
}

pub fn system_prompt(intent: Intent) -> String {
    let task = match intent {
        Intent::MarketBrief => {
            "Format the response as a spoken morning market brief that answers the question \
             about Asia tech risk exposure and highlights any earnings surprises. \
             Keep it conversational and under 200 words."
        }
        Intent::PortfolioAnalysis => {
            "Assess the portfolio's allocation, concentration and recent change in exposure. \
             Keep it under 250 words."
        }
        Intent::General => "Answer the question directly from the documents provided.",
    };

    format!("{}\n\n{}", BASE_PROMPT, task)
}

/// Render the question, market data and documents as the user prompt.
pub fn render_prompt(
    query: &str,
    market: Option<&MarketSnapshot>,
    chunks: &[RetrievedChunk],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question: {}", query.trim());

    if let Some(market) = market.filter(|m| !m.is_empty()) {
        out.push_str("\nMarket data:\n");
        render_market(&mut out, market);
    }

    if !chunks.is_empty() {
        out.push_str("\nDocuments:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{}] ({}, relevance {:.2}) {}",
                i + 1,
                chunk.source_id,
                chunk.score,
                chunk.text.trim()
            );
        }
    }

    out
}

fn render_market(out: &mut String, market: &MarketSnapshot) {
    if let Some(portfolio) = &market.portfolio {
        let _ = writeln!(
            out,
            "- Portfolio: total value {:.2}, Asia tech exposure {:.1}%",
            portfolio.total_value, portfolio.asia_tech_exposure
        );
        for h in &portfolio.holdings {
            let _ = writeln!(
                out,
                "  - {}: price {}, change {}, weight {}",
                h.symbol,
                fmt_opt(h.current_price, ""),
                fmt_opt(h.change_percent, "%"),
                fmt_opt(h.exposure_percent, "%"),
            );
        }
    }

    if !market.earnings.is_empty() {
        out.push_str("- Earnings surprises:\n");
        for e in &market.earnings {
            let _ = writeln!(
                out,
                "  - {}: estimate {}, actual {}, surprise {:+.1}%",
                e.symbol,
                fmt_opt(e.eps_estimate, ""),
                fmt_opt(e.eps_actual, ""),
                e.surprise_percent
            );
        }
    }

    if !market.indices.is_empty() {
        out.push_str("- Indices:\n");
        for idx in &market.indices {
            let _ = writeln!(
                out,
                "  - {}: {} ({})",
                idx.name,
                fmt_opt(idx.current_price, ""),
                fmt_opt(idx.change_percent, "%")
            );
        }
    }

    if let Some(sector) = &market.sector {
        let _ = writeln!(
            out,
            "- Sector {}: average change {:+.2}%",
            sector.name, sector.average_change_percent
        );
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, suffix),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EarningsSurprise, PortfolioExposure, SectorPerformance};

    #[test]
    fn test_brief_prompt_is_spoken_and_short() {
        let prompt = system_prompt(Intent::MarketBrief);
        assert!(prompt.contains("under 200 words"));
        assert!(prompt.contains("earnings surprises"));
        assert!(!system_prompt(Intent::General).contains("200 words"));
    }

    #[test]
    fn test_render_prompt_includes_data_and_documents() {
        let market = MarketSnapshot {
            portfolio: Some(PortfolioExposure {
                holdings: vec![],
                total_value: 1_000_000.0,
                asia_tech_exposure: 22.0,
            }),
            earnings: vec![EarningsSurprise {
                symbol: "TSM".into(),
                eps_estimate: Some(1.2),
                eps_actual: Some(1.25),
                surprise_percent: 4.0,
            }],
            indices: vec![],
            sector: Some(SectorPerformance {
                name: "Asia Tech".into(),
                average_change_percent: -0.5,
            }),
        };
        let chunks = vec![RetrievedChunk::new("Samsung missed by 2%", "doc-7", 0.81)];

        let prompt = render_prompt("what's our exposure?", Some(&market), &chunks);
        assert!(prompt.starts_with("Question: what's our exposure?"));
        assert!(prompt.contains("Asia tech exposure 22.0%"));
        assert!(prompt.contains("TSM: estimate 1.20, actual 1.25, surprise +4.0%"));
        assert!(prompt.contains("Sector Asia Tech: average change -0.50%"));
        assert!(prompt.contains("[1] (doc-7, relevance 0.81) Samsung missed by 2%"));
    }

    #[test]
    fn test_empty_market_is_omitted() {
        let prompt = render_prompt("q", Some(&MarketSnapshot::default()), &[]);
        assert!(!prompt.contains("Market data"));
        assert!(!prompt.contains("Documents"));
    }
}
