//! Retrieval agent
//!
//! Nearest-neighbour search against the document index. The vector backend
//! is opaque here: the backend name is forwarded and whatever comes back is
//! normalized into `RetrievedChunk`s.

use super::http::AgentHttpClient;
use super::AgentClient;
use crate::config::RetrievalConfig;
use crate::error::AgentError;
use crate::models::{
    clamp_score, AgentHealth, AgentParameters, AgentPayload, AgentRequest, Capability,
    RetrievedChunk,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub struct HttpRetrievalAgent {
    http: AgentHttpClient,
    backend: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_type: Option<&'a str>,
    backend: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Map<String, Value>>,
}

impl HttpRetrievalAgent {
    pub fn new(config: &RetrievalConfig, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            http: AgentHttpClient::new(&config.base_url, config.pinecone_api_key.clone(), timeout)?,
            backend: config.backend.clone(),
        })
    }
}

#[async_trait::async_trait]
impl AgentClient for HttpRetrievalAgent {
    fn capability(&self) -> Capability {
        Capability::Retrieval
    }

    fn name(&self) -> &str {
        "retriever"
    }

    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError> {
        let AgentParameters::Retrieval {
            query,
            top_k,
            filter_type,
        } = &request.parameters
        else {
            return Err(AgentError::InvalidRequest(
                "retrieval agent expects retrieval parameters".to_string(),
            ));
        };

        let body = SearchRequest {
            query,
            top_k: *top_k,
            filter_type: filter_type.as_deref(),
            backend: &self.backend,
        };
        let response: SearchResponse = self.http.post_json("/search", &body).await?;

        let chunks = response
            .results
            .into_iter()
            .enumerate()
            .filter_map(|(rank, doc)| to_chunk(rank, doc))
            .collect();

        Ok(AgentPayload::Documents(chunks))
    }

    async fn health(&self) -> AgentHealth {
        self.http.probe().await
    }
}

/// Normalize one search hit. Hits without any text are skipped.
fn to_chunk(rank: usize, mut doc: Map<String, Value>) -> Option<RetrievedChunk> {
    let text = ["content", "text"]
        .iter()
        .find_map(|key| doc.remove(*key))
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|t| !t.trim().is_empty())?;

    let score = doc
        .remove("similarity_score")
        .or_else(|| doc.remove("score"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let source_id = ["id", "source", "ticker"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("result-{}", rank + 1));

    let metadata: BTreeMap<String, String> = doc
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect();

    Some(RetrievedChunk {
        text,
        source_id,
        score: clamp_score(score),
        metadata,
    })
}
