//! Core types for the decision request lifecycle
//!
//! Requests go in, results come out. Nothing in this module carries logic
//! beyond constructors and small builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for decision requests
pub type RequestId = String;

/// Kind of decision being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Pick an agent for a task
    TaskAssignment,
    /// Split a set of needed resources against what is available
    ResourceAllocation,
    /// Order competing work items
    Prioritization,
    /// Place work on a timeline
    Scheduling,
    /// Settle disagreements between agents
    ConflictResolution,
    /// Decisions produced by a multi-agent coordination session
    Coordination,
}

impl DecisionType {
    /// All known decision types
    pub fn all() -> &'static [DecisionType] {
        &[
            DecisionType::TaskAssignment,
            DecisionType::ResourceAllocation,
            DecisionType::Prioritization,
            DecisionType::Scheduling,
            DecisionType::ConflictResolution,
            DecisionType::Coordination,
        ]
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionType::TaskAssignment => write!(f, "task_assignment"),
            DecisionType::ResourceAllocation => write!(f, "resource_allocation"),
            DecisionType::Prioritization => write!(f, "prioritization"),
            DecisionType::Scheduling => write!(f, "scheduling"),
            DecisionType::ConflictResolution => write!(f, "conflict_resolution"),
            DecisionType::Coordination => write!(f, "coordination"),
        }
    }
}

impl std::str::FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionType::all()
            .iter()
            .copied()
            .find(|t| t.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("unknown decision type: {}", s))
    }
}

/// Outcome status of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Decision fully made
    Completed,
    /// Decision could not be made
    Failed,
    /// Decision made for only part of what was asked
    Partial,
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionStatus::Completed => write!(f, "completed"),
            DecisionStatus::Failed => write!(f, "failed"),
            DecisionStatus::Partial => write!(f, "partial"),
        }
    }
}

/// Request priority, ordered lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A caller's ask for a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Unique request identifier
    pub id: RequestId,

    /// What kind of decision is wanted
    pub decision_type: DecisionType,

    /// Who asked
    pub requester: String,

    /// Algorithm input
    pub context: Map<String, Value>,

    /// Request priority
    pub priority: DecisionPriority,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Agents that should take part (collaborative decisions)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participating_agents: Vec<String>,

    /// Required agreement for collaborative decisions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_threshold: Option<f64>,
}

impl DecisionRequest {
    /// Create a new request with a fresh id
    pub fn new(
        decision_type: DecisionType,
        requester: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            decision_type,
            requester: requester.into(),
            context,
            priority: DecisionPriority::default(),
            created_at: Utc::now(),
            participating_agents: Vec::new(),
            consensus_threshold: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: DecisionPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set participating agents
    pub fn with_participants(mut self, agents: Vec<String>) -> Self {
        self.participating_agents = agents;
        self
    }

    /// Set the consensus threshold
    pub fn with_consensus_threshold(mut self, threshold: f64) -> Self {
        self.consensus_threshold = Some(threshold);
        self
    }
}

/// Input handed to a decision algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    pub request_id: RequestId,
    pub decision_type: DecisionType,
    pub decision_data: Map<String, Value>,
    pub requester: String,
    pub timestamp: DateTime<Utc>,
    pub participating_agents: Option<Vec<String>>,
    pub consensus_threshold: Option<f64>,
}

impl DecisionContext {
    /// Build the context for a request
    pub fn from_request(request: &DecisionRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            decision_type: request.decision_type,
            decision_data: request.context.clone(),
            requester: request.requester.clone(),
            timestamp: Utc::now(),
            participating_agents: if request.participating_agents.is_empty() {
                None
            } else {
                Some(request.participating_agents.clone())
            },
            consensus_threshold: request.consensus_threshold,
        }
    }

    /// Look up a string field in the decision data
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.decision_data.get(key).and_then(Value::as_str)
    }

    /// Look up an array of strings in the decision data
    ///
    /// Non-string entries are skipped.
    pub fn str_list(&self, key: &str) -> Option<Vec<String>> {
        self.decision_data.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

/// The answer to a decision request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub request_id: RequestId,
    pub decision_type: DecisionType,

    /// Algorithm output
    pub result: Value,

    /// Confidence in the result (0.0-1.0)
    pub confidence: f64,

    pub status: DecisionStatus,
    pub reasoning: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participating_agents: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_reached: Option<bool>,

    /// Set when the intended path could not run and a degraded one answered
    #[serde(default)]
    pub fallback_mode: bool,

    /// Set when not every invited participant contributed
    #[serde(default)]
    pub partial_input: bool,

    /// Wall time spent producing the result
    #[serde(default)]
    pub processing_time_ms: u64,

    pub created_at: DateTime<Utc>,
}

impl DecisionResult {
    /// Result with an explicit status
    pub fn new(
        request_id: &str,
        decision_type: DecisionType,
        result: Value,
        confidence: f64,
        status: DecisionStatus,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            decision_type,
            result,
            confidence: confidence.clamp(0.0, 1.0),
            status,
            reasoning: reasoning.into(),
            participating_agents: None,
            consensus_reached: None,
            fallback_mode: false,
            partial_input: false,
            processing_time_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// A fully made decision
    pub fn completed(
        request_id: &str,
        decision_type: DecisionType,
        result: Value,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::new(
            request_id,
            decision_type,
            result,
            confidence,
            DecisionStatus::Completed,
            reasoning,
        )
    }

    /// A decision covering only part of the request
    pub fn partial(
        request_id: &str,
        decision_type: DecisionType,
        result: Value,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::new(
            request_id,
            decision_type,
            result,
            confidence,
            DecisionStatus::Partial,
            reasoning,
        )
    }

    /// A decision that could not be made
    pub fn failed(
        request_id: &str,
        decision_type: DecisionType,
        result: Value,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::new(
            request_id,
            decision_type,
            result,
            confidence,
            DecisionStatus::Failed,
            reasoning,
        )
    }

    /// Low-confidence failed answer used whenever the engine cannot decide
    pub fn fallback(
        request_id: &str,
        decision_type: DecisionType,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        let mut result = Self::failed(request_id, decision_type, Value::Null, confidence, reasoning);
        result.fallback_mode = true;
        result
    }

    /// Attach participating agents
    pub fn with_participants(mut self, agents: Vec<String>) -> Self {
        self.participating_agents = Some(agents);
        self
    }

    /// Attach the consensus flag
    pub fn with_consensus(mut self, reached: bool) -> Self {
        self.consensus_reached = Some(reached);
        self
    }

    /// Whether the decision was (at least partly) made
    pub fn is_success(&self) -> bool {
        self.status != DecisionStatus::Failed
    }
}
