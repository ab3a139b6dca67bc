//! Error types for the brief router

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Capability;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// How an upstream failure should be treated by the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Timeouts, dropped connections, 5xx and 429 responses. Retried with backoff.
    TransientUpstream,
    /// Bad requests, auth failures, malformed responses. Never retried.
    PermanentUpstream,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::TransientUpstream)
    }
}

/// Failure of a single agent call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("capability not configured: {0}")]
    NotConfigured(String),
}

impl AgentError {
    pub fn class(&self) -> FailureClass {
        match self {
            AgentError::Timeout(_) | AgentError::Transport(_) => FailureClass::TransientUpstream,
            AgentError::Upstream { status, .. } if *status >= 500 || *status == 429 => {
                FailureClass::TransientUpstream
            }
            _ => FailureClass::PermanentUpstream,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AgentError::Timeout(0)
        } else if e.is_decode() {
            AgentError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            AgentError::Upstream {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else if e.is_builder() {
            AgentError::InvalidRequest(e.to_string())
        } else {
            AgentError::Transport(e.to_string())
        }
    }
}

/// Coarse category of a failed query, carried on error responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Classification,
    CapabilityFailed,
    CapabilityUnavailable,
    DeadlineExceeded,
    Transcription,
    Internal,
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Required capability {capability} failed: {reason}")]
    RequiredCapabilityFailed {
        capability: Capability,
        reason: String,
    },

    #[error("{0} capability is not configured")]
    CapabilityUnavailable(Capability),

    #[error("deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            OrchestrationError::Classification(_) => FailureKind::Classification,
            OrchestrationError::RequiredCapabilityFailed { .. } => FailureKind::CapabilityFailed,
            OrchestrationError::CapabilityUnavailable(_) => FailureKind::CapabilityUnavailable,
            OrchestrationError::DeadlineExceeded(_) => FailureKind::DeadlineExceeded,
            OrchestrationError::Transcription(_) => FailureKind::Transcription,
            _ => FailureKind::Internal,
        }
    }
}
