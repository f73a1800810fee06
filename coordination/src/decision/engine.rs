//! Decision engine - turns requests into results
//!
//! The engine never propagates a failure to its caller. An unregistered
//! decision type, a context the algorithm rejects, an algorithm error, and an
//! algorithm panic all come back as a `failed` result carrying the fallback
//! confidence.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::events::{CoordinationEvent, SharedEventBus};

use super::algorithms::{AlgorithmRegistry, DecisionAlgorithm};
use super::collaboration::{reported_confidence, reported_consensus, CollaborationInterface};
use super::metrics::{DecisionMetrics, DecisionRecord, MetricsRecorder};
use super::repository::DecisionRepository;
use super::types::{
    DecisionContext, DecisionRequest, DecisionResult, DecisionStatus, DecisionType, RequestId,
};

/// Shared reference to DecisionEngine
pub type SharedDecisionEngine = Arc<DecisionEngine>;

/// A request the engine is currently working on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecision {
    pub request_id: RequestId,
    pub decision_type: DecisionType,
    pub requester: String,
    pub submitted_at: DateTime<Utc>,
}

/// Completed results in insertion order, capped at a maximum size
#[derive(Debug, Default)]
struct CompletedDecisions {
    results: HashMap<RequestId, DecisionResult>,
    order: VecDeque<RequestId>,
}

impl CompletedDecisions {
    fn insert(&mut self, result: DecisionResult, max: usize) {
        let id = result.request_id.clone();
        if self.results.insert(id.clone(), result).is_some() {
            self.order.retain(|existing| existing != &id);
        }
        self.order.push_back(id);

        while self.order.len() > max {
            if let Some(oldest) = self.order.pop_front() {
                self.results.remove(&oldest);
            }
        }
    }

    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.results.len();
        self.results.retain(|_, r| r.created_at >= cutoff);
        let results = &self.results;
        self.order.retain(|id| results.contains_key(id));
        before - self.results.len()
    }
}

/// Orchestrates algorithm selection, execution, storage, and metrics
pub struct DecisionEngine {
    config: EngineConfig,
    algorithms: RwLock<AlgorithmRegistry>,
    pending_decisions: RwLock<HashMap<RequestId, PendingDecision>>,
    completed_decisions: RwLock<CompletedDecisions>,
    metrics: RwLock<MetricsRecorder>,
    repository: Option<Arc<dyn DecisionRepository>>,
    collaborator: Option<Arc<dyn CollaborationInterface>>,
    event_bus: Option<SharedEventBus>,
}

impl DecisionEngine {
    /// Create an engine with the built-in algorithms
    pub fn new(config: EngineConfig) -> Self {
        let metrics = MetricsRecorder::new(config.metrics_history_limit);
        Self {
            config,
            algorithms: RwLock::new(AlgorithmRegistry::with_defaults()),
            pending_decisions: RwLock::new(HashMap::new()),
            completed_decisions: RwLock::new(CompletedDecisions::default()),
            metrics: RwLock::new(metrics),
            repository: None,
            collaborator: None,
            event_bus: None,
        }
    }

    /// Replace the algorithm registry
    pub fn with_registry(mut self, registry: AlgorithmRegistry) -> Self {
        self.algorithms = RwLock::new(registry);
        self
    }

    /// Persist every result through a repository
    pub fn with_repository(mut self, repository: Arc<dyn DecisionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Route collaborative decisions through a collaborator
    pub fn with_collaborator(mut self, collaborator: Arc<dyn CollaborationInterface>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    /// Publish a `DecisionProcessed` event per result
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Create a shared reference to this engine
    pub fn shared(self) -> SharedDecisionEngine {
        Arc::new(self)
    }

    /// Process one request.
    ///
    /// Returns `None` only for a malformed request (empty id); every request
    /// that enters the engine gets a result.
    pub async fn process_decision_request(
        &self,
        request: DecisionRequest,
    ) -> Option<DecisionResult> {
        if request.id.trim().is_empty() {
            warn!(decision_type = %request.decision_type, "Rejecting request without an id");
            return None;
        }

        let started = Instant::now();
        self.mark_pending(&request.id, request.decision_type, &request.requester)
            .await;

        debug!(
            request_id = %request.id,
            decision_type = %request.decision_type,
            priority = ?request.priority,
            "Processing decision request"
        );

        let context = DecisionContext::from_request(&request);
        let algorithm = self.algorithms.read().await.get(request.decision_type);
        let result = self.execute(algorithm, &context);

        Some(self.complete(result, started, false).await)
    }

    /// Make a decision with input from several agents.
    ///
    /// Without a collaborator the single registered algorithm answers and the
    /// result is flagged `fallback_mode`. With one, the collaborator's
    /// self-reported confidence and consensus flag are taken as-is.
    pub async fn make_collaborative_decision(
        &self,
        decision_type: DecisionType,
        context: DecisionContext,
    ) -> Option<DecisionResult> {
        if context.request_id.trim().is_empty() {
            warn!(%decision_type, "Rejecting collaborative decision without a request id");
            return None;
        }

        let started = Instant::now();
        self.mark_pending(&context.request_id, decision_type, &context.requester)
            .await;

        let Some(collaborator) = self.collaborator.clone() else {
            info!(
                request_id = %context.request_id,
                %decision_type,
                "No collaborator configured, using single algorithm"
            );
            let algorithm = self.algorithms.read().await.get(decision_type);
            let mut result = self.execute(algorithm, &context);
            result.decision_type = decision_type;
            result.fallback_mode = true;
            if result.participating_agents.is_none() {
                result.participating_agents = context.participating_agents.clone();
            }
            return Some(self.complete(result, started, false).await);
        };

        let agents = context.participating_agents.clone().unwrap_or_default();
        let result = match collaborator.request_collaboration(&agents, &context).await {
            Ok(response) => {
                let reached = reported_consensus(&response);
                let confidence = reported_confidence(&response);
                let status = if reached {
                    DecisionStatus::Completed
                } else {
                    DecisionStatus::Partial
                };
                DecisionResult::new(
                    &context.request_id,
                    decision_type,
                    Value::Object(response),
                    confidence,
                    status,
                    format!("Collaborative decision from {} agents", agents.len()),
                )
                .with_participants(agents)
                .with_consensus(reached)
            }
            Err(e) => {
                warn!(request_id = %context.request_id, "Collaboration failed: {}", e);
                DecisionResult::fallback(
                    &context.request_id,
                    decision_type,
                    self.config.fallback_confidence,
                    format!("Collaboration failed: {}", e),
                )
                .with_participants(agents)
                .with_consensus(false)
            }
        };

        Some(self.complete(result, started, true).await)
    }

    /// Store a decision produced by a coordination session
    pub async fn finalize_coordinated_decision(&self, result: DecisionResult) -> DecisionResult {
        let started = Instant::now();
        info!(
            request_id = %result.request_id,
            confidence = result.confidence,
            partial_input = result.partial_input,
            "Finalizing coordinated decision"
        );
        self.complete(result, started, true).await
    }

    /// Register or replace the algorithm for a decision type.
    ///
    /// Requests already in flight keep the algorithm they started with.
    pub async fn add_decision_algorithm(
        &self,
        decision_type: DecisionType,
        algorithm: Arc<dyn DecisionAlgorithm>,
    ) {
        info!(%decision_type, algorithm = algorithm.name(), "Registering decision algorithm");
        self.algorithms.write().await.register(decision_type, algorithm);
    }

    /// Snapshot of the aggregate metrics
    pub async fn get_metrics(&self) -> DecisionMetrics {
        self.metrics.read().await.snapshot()
    }

    /// Recent decision records, newest first
    pub async fn recent_decisions(&self, n: usize) -> Vec<DecisionRecord> {
        self.metrics
            .read()
            .await
            .recent(n)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Look up a result in memory, then in the repository
    pub async fn get_decision(&self, request_id: &str) -> Option<DecisionResult> {
        if let Some(result) = self
            .completed_decisions
            .read()
            .await
            .results
            .get(request_id)
        {
            return Some(result.clone());
        }

        let repository = self.repository.as_ref()?;
        match repository.load_decision(request_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(request_id, "Repository lookup failed: {}", e);
                None
            }
        }
    }

    /// Whether a request is still being processed
    pub async fn is_pending(&self, request_id: &str) -> bool {
        self.pending_decisions.read().await.contains_key(request_id)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending_decisions.read().await.len()
    }

    pub async fn completed_count(&self) -> usize {
        self.completed_decisions.read().await.results.len()
    }

    /// Drop completed results created before `cutoff`
    pub async fn evict_completed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let evicted = self.completed_decisions.write().await.evict_before(cutoff);
        if evicted > 0 {
            debug!(evicted, "Evicted completed decisions");
        }
        evicted
    }

    /// Drop pending entries submitted before `cutoff`
    pub async fn evict_stale_pending(&self, cutoff: DateTime<Utc>) -> usize {
        let mut pending = self.pending_decisions.write().await;
        let before = pending.len();
        pending.retain(|_, p| p.submitted_at >= cutoff);
        let evicted = before - pending.len();
        if evicted > 0 {
            warn!(evicted, "Discarded stale pending decisions");
        }
        evicted
    }

    /// Drop decision history records older than `cutoff`
    pub async fn prune_metrics_history(&self, cutoff: DateTime<Utc>) -> usize {
        self.metrics.write().await.prune_history_before(cutoff)
    }

    async fn mark_pending(&self, request_id: &str, decision_type: DecisionType, requester: &str) {
        self.pending_decisions.write().await.insert(
            request_id.to_string(),
            PendingDecision {
                request_id: request_id.to_string(),
                decision_type,
                requester: requester.to_string(),
                submitted_at: Utc::now(),
            },
        );
    }

    /// Run the algorithm for a context, converting every failure into a fallback result
    fn execute(
        &self,
        algorithm: Option<Arc<dyn DecisionAlgorithm>>,
        context: &DecisionContext,
    ) -> DecisionResult {
        let request_id = &context.request_id;
        let decision_type = context.decision_type;

        let Some(algorithm) = algorithm else {
            warn!(%request_id, %decision_type, "No algorithm registered");
            return self.fallback(
                context,
                format!("No algorithm registered for decision type {}", decision_type),
            );
        };

        if !algorithm.validate_context(context) {
            warn!(%request_id, algorithm = algorithm.name(), "Invalid context");
            return self.fallback(
                context,
                format!("Invalid context for {} algorithm", algorithm.name()),
            );
        }

        match catch_unwind(AssertUnwindSafe(|| algorithm.make_decision(context))) {
            Ok(Ok(mut result)) => {
                if result.request_id != *request_id {
                    warn!(
                        %request_id,
                        returned = %result.request_id,
                        "Algorithm returned a foreign request id, correcting"
                    );
                    result.request_id = request_id.clone();
                }
                result
            }
            Ok(Err(e)) => {
                warn!(%request_id, algorithm = algorithm.name(), "Algorithm failed: {}", e);
                self.fallback(context, format!("Algorithm {} failed: {}", algorithm.name(), e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%request_id, algorithm = algorithm.name(), "Algorithm panicked: {}", message);
                self.fallback(
                    context,
                    format!("Algorithm {} panicked: {}", algorithm.name(), message),
                )
            }
        }
    }

    fn fallback(&self, context: &DecisionContext, reasoning: String) -> DecisionResult {
        DecisionResult::fallback(
            &context.request_id,
            context.decision_type,
            self.config.fallback_confidence,
            reasoning,
        )
    }

    /// Move a result from pending to completed, persist it, and record metrics
    async fn complete(
        &self,
        mut result: DecisionResult,
        started: Instant,
        collaborative: bool,
    ) -> DecisionResult {
        let elapsed = started.elapsed();
        result.processing_time_ms = elapsed.as_millis() as u64;

        {
            // Lock order: pending, then completed
            let mut pending = self.pending_decisions.write().await;
            let mut completed = self.completed_decisions.write().await;
            pending.remove(&result.request_id);
            completed.insert(result.clone(), self.config.max_completed_decisions.max(1));
        }

        if let Some(repository) = &self.repository {
            match repository.save_decision(&result).await {
                Ok(true) => {}
                Ok(false) => warn!(request_id = %result.request_id, "Repository declined decision"),
                Err(e) => warn!(request_id = %result.request_id, "Failed to persist decision: {}", e),
            }
        }

        self.metrics.write().await.record(DecisionRecord {
            request_id: result.request_id.clone(),
            decision_type: result.decision_type,
            success: result.is_success(),
            collaborative,
            fallback: result.fallback_mode,
            processing_time: elapsed.as_secs_f64(),
            recorded_at: Utc::now(),
        });

        if let Some(bus) = &self.event_bus {
            bus.publish(CoordinationEvent::DecisionProcessed {
                request_id: result.request_id.clone(),
                decision_type: result.decision_type,
                status: result.status,
                confidence: result.confidence,
                timestamp: Utc::now(),
            });
        }

        info!(
            request_id = %result.request_id,
            decision_type = %result.decision_type,
            status = %result.status,
            confidence = result.confidence,
            collaborative,
            "Decision completed"
        );

        result
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
