//! Pluggable decision algorithms
//!
//! Each decision type maps to one [`DecisionAlgorithm`]. The engine looks the
//! algorithm up per request, validates the context with it, then asks it for
//! a result.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{DecisionContext, DecisionResult, DecisionStatus, DecisionType};

/// Error type for algorithm execution
#[derive(Debug, thiserror::Error)]
pub enum AlgorithmError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("No agent available for assignment")]
    NoAgentAvailable,

    #[error("Algorithm failed: {0}")]
    Failed(String),
}

/// Result type for algorithm execution
pub type AlgorithmResult<T> = Result<T, AlgorithmError>;

/// Strategy that turns a decision context into a decision result
pub trait DecisionAlgorithm: Send + Sync {
    /// Name used in logs and reasoning strings
    fn name(&self) -> &str;

    /// Whether the context carries what this algorithm needs
    fn validate_context(&self, context: &DecisionContext) -> bool;

    /// Produce a decision
    fn make_decision(&self, context: &DecisionContext) -> AlgorithmResult<DecisionResult>;
}

/// Assigns a task to an agent
///
/// An explicit `agent_id` wins; otherwise the first of `available_agents`,
/// then the first participating agent.
#[derive(Debug, Default, Clone)]
pub struct TaskAssignmentAlgorithm;

impl TaskAssignmentAlgorithm {
    const EXPLICIT_CONFIDENCE: f64 = 0.9;
    const INFERRED_CONFIDENCE: f64 = 0.75;
}

impl DecisionAlgorithm for TaskAssignmentAlgorithm {
    fn name(&self) -> &str {
        "task_assignment"
    }

    fn validate_context(&self, context: &DecisionContext) -> bool {
        context.str_field("task_type").is_some()
    }

    fn make_decision(&self, context: &DecisionContext) -> AlgorithmResult<DecisionResult> {
        let task_type = context
            .str_field("task_type")
            .ok_or_else(|| AlgorithmError::MissingField("task_type".to_string()))?;

        let (agent, confidence, source) = if let Some(agent) = context.str_field("agent_id") {
            (agent.to_string(), Self::EXPLICIT_CONFIDENCE, "requested agent")
        } else if let Some(agent) = context
            .str_list("available_agents")
            .and_then(|agents| agents.into_iter().next())
        {
            (agent, Self::INFERRED_CONFIDENCE, "first available agent")
        } else if let Some(agent) = context
            .participating_agents
            .as_ref()
            .and_then(|agents| agents.first().cloned())
        {
            (agent, Self::INFERRED_CONFIDENCE, "first participating agent")
        } else {
            return Err(AlgorithmError::NoAgentAvailable);
        };

        debug!(
            request_id = %context.request_id,
            agent = %agent,
            task_type,
            "Task assigned"
        );

        let priority = context
            .decision_data
            .get("priority")
            .cloned()
            .unwrap_or(Value::Null);

        Ok(DecisionResult::completed(
            &context.request_id,
            context.decision_type,
            json!({
                "assigned_agent": agent,
                "task_type": task_type,
                "priority": priority,
                "assignment_time": Utc::now().to_rfc3339(),
            }),
            confidence,
            format!("Assigned {} task to {} ({})", task_type, agent, source),
        ))
    }
}

/// Allocates requested resources from what is available
///
/// Status follows the allocation ratio: all of it is `completed`, some of it
/// is `partial`, none of it is `failed`.
#[derive(Debug, Default, Clone)]
pub struct ResourceAllocationAlgorithm;

impl DecisionAlgorithm for ResourceAllocationAlgorithm {
    fn name(&self) -> &str {
        "resource_allocation"
    }

    fn validate_context(&self, context: &DecisionContext) -> bool {
        context
            .decision_data
            .get("resources_needed")
            .map(Value::is_array)
            .unwrap_or(false)
    }

    fn make_decision(&self, context: &DecisionContext) -> AlgorithmResult<DecisionResult> {
        let needed = context
            .str_list("resources_needed")
            .ok_or_else(|| AlgorithmError::MissingField("resources_needed".to_string()))?;
        let available = context.str_list("available_resources").unwrap_or_default();

        let (allocated, missing): (Vec<String>, Vec<String>) =
            needed.iter().cloned().partition(|r| available.contains(r));

        let ratio = if needed.is_empty() {
            1.0
        } else {
            allocated.len() as f64 / needed.len() as f64
        };

        let payload = json!({
            "allocated_resources": allocated,
            "missing_resources": missing,
            "allocation_ratio": ratio,
        });
        let reasoning = format!(
            "Allocated {} of {} requested resources",
            allocated.len(),
            needed.len()
        );

        let status = if ratio >= 1.0 {
            DecisionStatus::Completed
        } else if ratio > 0.0 {
            DecisionStatus::Partial
        } else {
            DecisionStatus::Failed
        };

        Ok(DecisionResult::new(
            &context.request_id,
            context.decision_type,
            payload,
            ratio,
            status,
            reasoning,
        ))
    }
}

/// Maps decision types to their algorithms
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<DecisionType, Arc<dyn DecisionAlgorithm>>,
}

impl AlgorithmRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in task assignment and resource allocation algorithms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DecisionType::TaskAssignment, Arc::new(TaskAssignmentAlgorithm));
        registry.register(
            DecisionType::ResourceAllocation,
            Arc::new(ResourceAllocationAlgorithm),
        );
        registry
    }

    /// Register or replace the algorithm for a decision type
    ///
    /// Returns the algorithm it replaced, if any.
    pub fn register(
        &mut self,
        decision_type: DecisionType,
        algorithm: Arc<dyn DecisionAlgorithm>,
    ) -> Option<Arc<dyn DecisionAlgorithm>> {
        self.algorithms.insert(decision_type, algorithm)
    }

    /// Algorithm for a decision type
    pub fn get(&self, decision_type: DecisionType) -> Option<Arc<dyn DecisionAlgorithm>> {
        self.algorithms.get(&decision_type).cloned()
    }

    /// Decision types with a registered algorithm
    pub fn registered_types(&self) -> Vec<DecisionType> {
        self.algorithms.keys().copied().collect()
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::DecisionRequest;
    use serde_json::Map;

    fn context(decision_type: DecisionType, data: Value) -> DecisionContext {
        let map: Map<String, Value> = data.as_object().cloned().unwrap_or_default();
        DecisionContext::from_request(&DecisionRequest::new(decision_type, "test", map))
    }

    #[test]
    fn test_task_assignment_explicit_agent() {
        let ctx = context(
            DecisionType::TaskAssignment,
            json!({"agent_id": "agent_7", "task_type": "refactor", "priority": "HIGH"}),
        );
        let algo = TaskAssignmentAlgorithm;
        assert!(algo.validate_context(&ctx));

        let result = algo.make_decision(&ctx).unwrap();
        assert_eq!(result.status, DecisionStatus::Completed);
        assert_eq!(result.result["assigned_agent"], "agent_7");
        assert_eq!(result.result["task_type"], "refactor");
        assert_eq!(result.result["priority"], "HIGH");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_task_assignment_falls_back_to_available_agents() {
        let ctx = context(
            DecisionType::TaskAssignment,
            json!({"task_type": "review", "available_agents": ["agent_2", "agent_3"]}),
        );
        let result = TaskAssignmentAlgorithm.make_decision(&ctx).unwrap();
        assert_eq!(result.result["assigned_agent"], "agent_2");
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn test_task_assignment_without_agents_errors() {
        let ctx = context(DecisionType::TaskAssignment, json!({"task_type": "review"}));
        assert!(matches!(
            TaskAssignmentAlgorithm.make_decision(&ctx),
            Err(AlgorithmError::NoAgentAvailable)
        ));
    }

    #[test]
    fn test_task_assignment_requires_task_type() {
        let ctx = context(DecisionType::TaskAssignment, json!({"agent_id": "a"}));
        assert!(!TaskAssignmentAlgorithm.validate_context(&ctx));
    }

    #[test]
    fn test_resource_allocation_partial() {
        let ctx = context(
            DecisionType::ResourceAllocation,
            json!({"resources_needed": ["gpu", "disk"], "available_resources": ["disk"]}),
        );
        let result = ResourceAllocationAlgorithm.make_decision(&ctx).unwrap();
        assert_eq!(result.status, DecisionStatus::Partial);
        assert_eq!(result.result["allocated_resources"], json!(["disk"]));
        assert_eq!(result.result["missing_resources"], json!(["gpu"]));
        assert_eq!(result.result["allocation_ratio"], 0.5);
    }

    #[test]
    fn test_resource_allocation_none_available() {
        let ctx = context(
            DecisionType::ResourceAllocation,
            json!({"resources_needed": ["gpu"]}),
        );
        let result = ResourceAllocationAlgorithm.make_decision(&ctx).unwrap();
        assert_eq!(result.status, DecisionStatus::Failed);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_resource_allocation_requires_array() {
        let ctx = context(
            DecisionType::ResourceAllocation,
            json!({"resources_needed": "gpu"}),
        );
        assert!(!ResourceAllocationAlgorithm.validate_context(&ctx));
    }

    #[test]
    fn test_registry_replace() {
        let mut registry = AlgorithmRegistry::with_defaults();
        assert!(registry.get(DecisionType::Scheduling).is_none());
        let previous = registry.register(
            DecisionType::TaskAssignment,
            Arc::new(ResourceAllocationAlgorithm),
        );
        assert_eq!(previous.unwrap().name(), "task_assignment");
        assert_eq!(
            registry.get(DecisionType::TaskAssignment).unwrap().name(),
            "resource_allocation"
        );
    }
}
