//! Environment-driven configuration
//!
//! Values are read once at startup. Credentials and backend selectors are
//! opaque strings handed to the agent clients; the router only cares whether
//! they are present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::Result;

pub const ASIA_TECH_BASKET: &[&str] = &[
    "TSM",
    "ASML",
    "005930.KS",
    "6758.T",
    "9984.T",
    "BABA",
    "TCEHY",
    "JD",
];

/// Policy knobs for the router, confidence gate and dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub confidence_threshold: f64,
    pub min_chunks: usize,
    pub agent_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub query_deadline: Duration,
    pub brief_top_k: usize,
    pub general_top_k: usize,
    pub portfolio_symbols: Vec<String>,
    pub sector_name: String,
    pub tts_language: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            min_chunks: 3,
            agent_timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            query_deadline: Duration::from_secs(30),
            brief_top_k: 5,
            general_top_k: 10,
            portfolio_symbols: ASIA_TECH_BASKET.iter().map(|s| s.to_string()).collect(),
            sector_name: "Asia Tech".to_string(),
            tts_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub base_url: String,
    /// `faiss` (local index) or `pinecone` (managed service).
    pub backend: String,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index: Option<String>,
}

impl RetrievalConfig {
    pub fn is_usable(&self) -> bool {
        match self.backend.as_str() {
            "pinecone" => self.pinecone_api_key.is_some(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub router: RouterConfig,
    pub market_data: MarketDataConfig,
    pub retrieval: RetrievalConfig,
    pub narration: NarrationConfig,
    pub speech: SpeechConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            router: RouterConfig::default(),
            market_data: MarketDataConfig {
                enabled: true,
                base_url: "http://localhost:8001".to_string(),
                api_key: None,
            },
            retrieval: RetrievalConfig {
                base_url: "http://localhost:8003".to_string(),
                backend: "faiss".to_string(),
                pinecone_api_key: None,
                pinecone_index: None,
            },
            narration: NarrationConfig {
                api_key: None,
                model: "gemini-2.0-flash".to_string(),
                max_tokens: 2000,
                temperature: 0.3,
            },
            speech: SpeechConfig {
                enabled: true,
                base_url: "http://localhost:8006".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = AppConfig::default();
        let router_defaults = defaults.router.clone();

        let port = match get("ORCHESTRATOR_PORT").or_else(|| get("PORT")) {
            Some(v) => parse_value("ORCHESTRATOR_PORT", &v)?,
            None => defaults.port,
        };

        let confidence_threshold: f64 = parse_or(
            &get,
            "RAG_CONFIDENCE_THRESHOLD",
            router_defaults.confidence_threshold,
        )?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(OrchestrationError::Config(format!(
                "RAG_CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                confidence_threshold
            )));
        }

        let min_chunks: usize = parse_or(&get, "RAG_MIN_CHUNKS", router_defaults.min_chunks)?;
        if min_chunks == 0 {
            return Err(OrchestrationError::Config(
                "RAG_MIN_CHUNKS must be at least 1".to_string(),
            ));
        }

        let portfolio_symbols = get("PORTFOLIO_SYMBOLS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|symbols| !symbols.is_empty())
            .unwrap_or(router_defaults.portfolio_symbols);

        let router = RouterConfig {
            confidence_threshold,
            min_chunks,
            agent_timeout: Duration::from_millis(parse_or(
                &get,
                "AGENT_TIMEOUT_MS",
                router_defaults.agent_timeout.as_millis() as u64,
            )?),
            max_retries: parse_or(&get, "AGENT_MAX_RETRIES", router_defaults.max_retries)?,
            backoff_base: Duration::from_millis(parse_or(
                &get,
                "AGENT_BACKOFF_BASE_MS",
                router_defaults.backoff_base.as_millis() as u64,
            )?),
            query_deadline: Duration::from_millis(parse_or(
                &get,
                "QUERY_DEADLINE_MS",
                router_defaults.query_deadline.as_millis() as u64,
            )?),
            brief_top_k: parse_or(&get, "BRIEF_TOP_K", router_defaults.brief_top_k)?,
            general_top_k: parse_or(&get, "GENERAL_TOP_K", router_defaults.general_top_k)?,
            portfolio_symbols,
            sector_name: get("SECTOR_NAME").unwrap_or(router_defaults.sector_name),
            tts_language: get("TTS_LANGUAGE").unwrap_or(router_defaults.tts_language),
        };

        let market_data = MarketDataConfig {
            enabled: parse_or(&get, "MARKET_DATA_ENABLED", true)?,
            base_url: agent_url(&get, "API_AGENT_URL", "API_AGENT_PORT", 8001)?,
            api_key: get("ALPHA_VANTAGE_API_KEY"),
        };

        let retrieval = RetrievalConfig {
            base_url: agent_url(&get, "RETRIEVER_AGENT_URL", "RETRIEVER_AGENT_PORT", 8003)?,
            backend: get("VECTOR_STORE_TYPE")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.retrieval.backend),
            pinecone_api_key: get("PINECONE_API_KEY"),
            pinecone_index: get("PINECONE_INDEX_NAME"),
        };

        let narration = NarrationConfig {
            api_key: get("GEMINI_API_KEY"),
            model: get("LLM_MODEL").unwrap_or(defaults.narration.model),
            max_tokens: parse_or(&get, "MAX_TOKENS", defaults.narration.max_tokens)?,
            temperature: parse_or(&get, "TEMPERATURE", defaults.narration.temperature)?,
        };

        let speech = SpeechConfig {
            enabled: parse_or(&get, "SPEECH_ENABLED", true)?,
            base_url: agent_url(&get, "VOICE_AGENT_URL", "VOICE_AGENT_PORT", 8006)?,
        };

        Ok(Self {
            port,
            router,
            market_data,
            retrieval,
            narration,
            speech,
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        OrchestrationError::Config(format!("{} has an invalid value: {:?}", key, raw))
    })
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn agent_url<G>(get: &G, url_key: &str, port_key: &str, default_port: u16) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(url) = get(url_key) {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let port: u16 = parse_or(get, port_key, default_port)?;
    Ok(format!("http://localhost:{}", port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.router.portfolio_symbols.len(), 8);
        assert!(config.narration.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "9100"),
            ("RAG_CONFIDENCE_THRESHOLD", "0.6"),
            ("RAG_MIN_CHUNKS", "2"),
            ("AGENT_TIMEOUT_MS", "2500"),
            ("RETRIEVER_AGENT_URL", "http://retriever:9000/"),
            ("VOICE_AGENT_PORT", "7006"),
            ("PORTFOLIO_SYMBOLS", "TSM, ASML ,,"),
            ("GEMINI_API_KEY", "  secret "),
            ("VECTOR_STORE_TYPE", "Pinecone"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.router.confidence_threshold, 0.6);
        assert_eq!(config.router.min_chunks, 2);
        assert_eq!(config.router.agent_timeout, Duration::from_millis(2500));
        assert_eq!(config.retrieval.base_url, "http://retriever:9000");
        assert_eq!(config.speech.base_url, "http://localhost:7006");
        assert_eq!(config.router.portfolio_symbols, vec!["TSM", "ASML"]);
        assert_eq!(config.narration.api_key.as_deref(), Some("secret"));
        assert_eq!(config.retrieval.backend, "pinecone");
        assert!(!config.retrieval.is_usable());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("AGENT_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("AGENT_MAX_RETRIES"));

        assert!(AppConfig::from_lookup(lookup(&[("RAG_CONFIDENCE_THRESHOLD", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("RAG_MIN_CHUNKS", "0")])).is_err());
    }
}
