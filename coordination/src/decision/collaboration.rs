//! Optional hook for multi-agent collaborative decisions
//!
//! The engine trusts whatever the collaborator reports about consensus.
//! Neither `consensus_confidence` nor `consensus_reached` is checked against
//! the underlying responses.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::DecisionContext;

/// Default confidence when the collaborator omits `consensus_confidence`
pub const DEFAULT_CONSENSUS_CONFIDENCE: f64 = 0.7;

/// Error type for collaboration operations
#[derive(Debug, thiserror::Error)]
pub enum CollaborationError {
    #[error("No agents available for collaboration")]
    NoAgents,

    #[error("Collaboration request failed: {0}")]
    RequestFailed(String),

    #[error("Collaboration timed out after {0}ms")]
    Timeout(u64),
}

/// Result type for collaboration operations
pub type CollaborationResult<T> = Result<T, CollaborationError>;

/// Queries several agents and folds their answers into one response map
#[async_trait]
pub trait CollaborationInterface: Send + Sync {
    /// Ask the given agents to weigh in on a decision
    async fn request_collaboration(
        &self,
        agent_ids: &[String],
        context: &DecisionContext,
    ) -> CollaborationResult<Map<String, Value>>;

    /// Combine individual agent responses
    async fn aggregate_responses(
        &self,
        responses: Vec<Map<String, Value>>,
    ) -> CollaborationResult<Map<String, Value>>;
}

/// Self-reported consensus confidence, defaulting when absent or non-numeric
pub fn reported_confidence(response: &Map<String, Value>) -> f64 {
    response
        .get("consensus_confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONSENSUS_CONFIDENCE)
}

/// Self-reported consensus flag, defaulting to `true` when absent
pub fn reported_consensus(response: &Map<String, Value>) -> bool {
    response
        .get("consensus_reached")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}
