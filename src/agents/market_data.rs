//! Market data agent
//!
//! Talks to the market-data service (quotes, earnings, indices, sector
//! averages) and decodes each section into the fixed `MarketSnapshot` schema.

use super::http::AgentHttpClient;
use super::AgentClient;
use crate::config::MarketDataConfig;
use crate::error::AgentError;
use crate::models::{
    AgentHealth, AgentParameters, AgentPayload, AgentRequest, Capability, EarningsSurprise,
    IndexQuote, MarketSection, MarketSnapshot, PortfolioExposure, SectorPerformance, StockQuote,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct HttpMarketDataAgent {
    http: AgentHttpClient,
}

impl HttpMarketDataAgent {
    pub fn new(config: &MarketDataConfig, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            http: AgentHttpClient::new(&config.base_url, config.api_key.clone(), timeout)?,
        })
    }

    async fn fetch_section(
        &self,
        section: MarketSection,
        symbols: &[String],
        period: &str,
        sector_name: &str,
        snapshot: &mut MarketSnapshot,
    ) -> Result<(), AgentError> {
        match section {
            MarketSection::Portfolio => {
                let wire: PortfolioWire = self
                    .http
                    .post_json(
                        "/portfolio-exposure",
                        &json!({ "symbols": symbols, "period": period }),
                    )
                    .await?;
                snapshot.portfolio = Some(wire.into());
            }
            MarketSection::Earnings => {
                let wire: EarningsWire = self
                    .http
                    .post_json("/earnings-data", &json!({ "symbols": symbols }))
                    .await?;
                snapshot.earnings = wire.into_surprises();
            }
            MarketSection::Indices => {
                let wire: IndicesWire = self.http.get_json("/market-indices").await?;
                snapshot.indices = wire.into_quotes();
            }
            MarketSection::Sector => {
                let wire: SectorWire = self
                    .http
                    .post_json(
                        "/sector-performance",
                        &json!({ "sector_name": sector_name, "symbols": symbols }),
                    )
                    .await?;
                snapshot.sector = wire.into_performance(sector_name);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentClient for HttpMarketDataAgent {
    fn capability(&self) -> Capability {
        Capability::MarketData
    }

    fn name(&self) -> &str {
        "market_data"
    }

    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError> {
        let AgentParameters::MarketData {
            symbols,
            sections,
            period,
            sector_name,
        } = &request.parameters
        else {
            return Err(AgentError::InvalidRequest(
                "market data agent expects market data parameters".to_string(),
            ));
        };

        if sections.is_empty() {
            return Err(AgentError::InvalidRequest(
                "no market data sections requested".to_string(),
            ));
        }

        let mut snapshot = MarketSnapshot::default();
        for section in sections {
            self.fetch_section(*section, symbols, period, sector_name, &mut snapshot)
                .await?;
        }

        Ok(AgentPayload::MarketData(snapshot))
    }

    async fn health(&self) -> AgentHealth {
        self.http.probe().await
    }
}

//
// ================= Wire formats =================
//

#[derive(Debug, Deserialize)]
struct QuoteWire {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    change_percent: Option<f64>,
    #[serde(default)]
    exposure_percent: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortfolioWire {
    #[serde(default)]
    portfolio_data: Vec<QuoteWire>,
    #[serde(default)]
    total_value: f64,
    #[serde(default)]
    asia_tech_exposure: f64,
}

impl From<PortfolioWire> for PortfolioExposure {
    fn from(wire: PortfolioWire) -> Self {
        let holdings = wire
            .portfolio_data
            .into_iter()
            .filter(|q| q.error.is_none())
            .filter_map(|q| {
                Some(StockQuote {
                    symbol: q.symbol?,
                    current_price: q.current_price,
                    change_percent: q.change_percent,
                    exposure_percent: q.exposure_percent,
                })
            })
            .collect();

        PortfolioExposure {
            holdings,
            total_value: wire.total_value,
            asia_tech_exposure: wire.asia_tech_exposure,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EarningsRowWire {
    symbol: String,
    #[serde(default)]
    eps_estimate: Option<f64>,
    #[serde(default)]
    eps_actual: Option<f64>,
    #[serde(default)]
    surprise_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EarningsWire {
    #[serde(default)]
    earnings: Vec<EarningsRowWire>,
}

impl EarningsWire {
    /// Rows without a surprise figure carry no signal and are dropped.
    fn into_surprises(self) -> Vec<EarningsSurprise> {
        self.earnings
            .into_iter()
            .filter_map(|row| {
                Some(EarningsSurprise {
                    surprise_percent: row.surprise_percent.filter(|v| v.is_finite())?,
                    symbol: row.symbol,
                    eps_estimate: row.eps_estimate,
                    eps_actual: row.eps_actual,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct IndicesWire {
    #[serde(default)]
    indices: BTreeMap<String, QuoteWire>,
}

impl IndicesWire {
    fn into_quotes(self) -> Vec<IndexQuote> {
        self.indices
            .into_iter()
            .filter(|(_, q)| q.error.is_none())
            .map(|(name, q)| IndexQuote {
                name,
                current_price: q.current_price,
                change_percent: q.change_percent,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SectorWire {
    #[serde(default)]
    sector_performance: Option<f64>,
}

impl SectorWire {
    fn into_performance(self, sector_name: &str) -> Option<SectorPerformance> {
        self.sector_performance
            .filter(|v| v.is_finite())
            .map(|average_change_percent| SectorPerformance {
                name: sector_name.to_string(),
                average_change_percent,
            })
    }
}
