//! Finance Brief Router
//!
//! Routes finance questions across a handful of external capabilities
//! (market data, document retrieval, narration, speech):
//! - Classifies each query into an intent with a fixed capability plan
//! - Fans out to the required agents concurrently, with bounded retries
//! - Gates synthesis on the quality of retrieved context
//! - Asks the caller to clarify instead of answering from weak context
//! - Records every query in a hash-verified audit trail
//!
//! ROUTING LOOP:
//! RECEIVED → CLASSIFY → DISPATCH → AWAIT → EVALUATE → SYNTHESIZE | CLARIFY → COMPLETE

pub mod agent;
pub mod agents;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod health;
pub mod models;
pub mod state;
pub mod synthesis;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use agents::{build_registry, AgentClient, AgentRegistry};
pub use classifier::{IntentClassifier, IntentPlan};
pub use confidence::ConfidenceEvaluator;
pub use config::{AppConfig, RouterConfig};
pub use models::*;
