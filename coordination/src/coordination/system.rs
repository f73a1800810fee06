//! Coordination sessions: gather inputs, deliberate, reach consensus
//!
//! Each session runs as its own tokio task and walks the state machine in
//! [`super::state`] strictly in order. A failed consensus round loops back
//! to `Active` until the mode's retry budget is spent.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoordinationConfig;
use crate::decision::engine::panic_message;
use crate::decision::{DecisionResult, DecisionType, SharedDecisionEngine};
use crate::events::{CoordinationEvent, SharedEventBus};

use super::deliberation::{consensus_score, deliberate, AgentInput};
use super::mode::{CoordinationMode, ModePolicy};
use super::state::{CoordinationSession, SessionId, SessionStatus, TransitionError};
use super::transport::{CoordinationMessage, SharedTransport, TransportError};

/// Errors that end a session early
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Aggregate session statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMetrics {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub active_sessions: usize,
    /// Completed sessions over finished sessions
    pub consensus_rate: f64,
    pub average_session_duration_ms: f64,
}

#[derive(Debug, Default)]
struct SessionCounters {
    started: u64,
    completed: u64,
    failed: u64,
    total_duration_ms: i64,
}

/// Shared coordination system handle
pub type SharedCoordinationSystem = Arc<DecisionCoordinationSystem>;

/// Runs multi-agent coordination sessions on top of a decision engine
pub struct DecisionCoordinationSystem {
    engine: SharedDecisionEngine,
    transport: SharedTransport,
    event_bus: SharedEventBus,
    config: CoordinationConfig,
    active_sessions: RwLock<HashMap<SessionId, CoordinationSession>>,
    session_history: RwLock<VecDeque<CoordinationSession>>,
    tasks: Mutex<HashMap<SessionId, JoinHandle<()>>>,
    counters: RwLock<SessionCounters>,
}

impl DecisionCoordinationSystem {
    pub fn new(
        engine: SharedDecisionEngine,
        transport: SharedTransport,
        event_bus: SharedEventBus,
        config: CoordinationConfig,
    ) -> Self {
        Self {
            engine,
            transport,
            event_bus,
            config,
            active_sessions: RwLock::new(HashMap::new()),
            session_history: RwLock::new(VecDeque::new()),
            tasks: Mutex::new(HashMap::new()),
            counters: RwLock::new(SessionCounters::default()),
        }
    }

    /// Create a shared reference to this system
    pub fn shared(self) -> SharedCoordinationSystem {
        Arc::new(self)
    }

    pub fn engine(&self) -> &SharedDecisionEngine {
        &self.engine
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    /// Start a session and return its id without waiting for it.
    ///
    /// Duplicate participants are collapsed, first occurrence wins.
    pub async fn initiate_coordination_session(
        self: &Arc<Self>,
        decision_id: &str,
        decision_type: DecisionType,
        participants: Vec<String>,
        mode: CoordinationMode,
    ) -> SessionId {
        let mut unique = Vec::with_capacity(participants.len());
        for p in participants {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }

        let session = CoordinationSession::new(decision_id, decision_type, mode, unique);
        let session_id = session.session_id.clone();

        info!(
            session_id = %session_id,
            decision_id,
            %mode,
            participants = session.participants.len(),
            "Starting coordination session"
        );
        self.event_bus.publish(CoordinationEvent::SessionStarted {
            session_id: session_id.clone(),
            decision_id: decision_id.to_string(),
            mode,
            participants: session.participants.clone(),
            timestamp: Utc::now(),
        });

        self.active_sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        self.counters.write().await.started += 1;

        let system = Arc::clone(self);
        let id = session_id.clone();
        let handle = tokio::spawn(async move { system.run_session(id).await });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(session_id.clone(), handle);

        session_id
    }

    /// Session by id, active or archived
    pub async fn get_session(&self, session_id: &str) -> Option<CoordinationSession> {
        if let Some(session) = self.active_sessions.read().await.get(session_id) {
            return Some(session.clone());
        }
        self.session_history
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub async fn active_session_ids(&self) -> Vec<SessionId> {
        self.active_sessions.read().await.keys().cloned().collect()
    }

    /// Archived sessions, oldest first
    pub async fn session_history(&self) -> Vec<CoordinationSession> {
        self.session_history.read().await.iter().cloned().collect()
    }

    /// Wait for a session's task to finish and return the archived session
    pub async fn await_session(&self, session_id: &str) -> Option<CoordinationSession> {
        let handle = self.tasks.lock().await.remove(session_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(session_id, error = %e, "Coordination task ended abnormally");
                self.fail_session(session_id, &format!("session task ended: {}", e))
                    .await;
                self.archive(session_id).await;
            }
        }
        self.get_session(session_id).await
    }

    pub async fn coordination_metrics(&self) -> CoordinationMetrics {
        let counters = self.counters.read().await;
        let finished = counters.completed + counters.failed;
        CoordinationMetrics {
            sessions_started: counters.started,
            sessions_completed: counters.completed,
            sessions_failed: counters.failed,
            active_sessions: self.active_sessions.read().await.len(),
            consensus_rate: if finished > 0 {
                counters.completed as f64 / finished as f64
            } else {
                0.0
            },
            average_session_duration_ms: if finished > 0 {
                counters.total_duration_ms as f64 / finished as f64
            } else {
                0.0
            },
        }
    }

    /// Drop archived sessions that ended before `cutoff`
    pub async fn prune_history_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut history = self.session_history.write().await;
        let before = history.len();
        history.retain(|s| s.end_time.unwrap_or(s.start_time) >= cutoff);
        before - history.len()
    }

    /// Abort every running session task
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Session task
    // -----------------------------------------------------------------------

    async fn run_session(&self, session_id: SessionId) {
        let failure = match AssertUnwindSafe(self.coordinate(&session_id))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!(
                "session task panicked: {}",
                panic_message(panic.as_ref())
            )),
        };
        if let Some(reason) = failure {
            warn!(session_id = %session_id, reason = %reason, "Coordination session failed");
            self.fail_session(&session_id, &reason).await;
        }
        self.archive(&session_id).await;
        self.tasks.lock().await.retain(|_, h| !h.is_finished());
    }

    async fn coordinate(&self, session_id: &str) -> SessionResult<()> {
        let (decision_id, decision_type, mode, participants) = self
            .with_session(session_id, |s| {
                (
                    s.decision_id.clone(),
                    s.decision_type,
                    s.mode,
                    s.participants.clone(),
                )
            })
            .await?;
        let policy = mode.policy(&self.config);

        loop {
            let round = self.with_session(session_id, |s| s.retry_count).await?;

            self.advance(session_id, SessionStatus::GatheringInputs, "requesting input")
                .await?;
            let deadline = Utc::now() + chrono::Duration::seconds(self.config.input_deadline_secs as i64);
            let context = json!({
                "decision_type": decision_type,
                "mode": mode,
                "participants": participants,
                "round": round,
            });
            for agent in &participants {
                let message = CoordinationMessage::input_request(
                    agent,
                    session_id,
                    &decision_id,
                    deadline,
                    context.clone(),
                );
                self.transport.deliver(&message).await?;
            }

            let inputs = self.gather_inputs(session_id, &participants, &policy).await;
            let responded = inputs.len();
            let partial = responded < participants.len();
            self.with_session(session_id, |s| {
                s.responses_received = responded;
                s.partial_input = partial;
            })
            .await?;
            self.event_bus.publish(CoordinationEvent::InputsCollected {
                session_id: session_id.to_string(),
                received: responded,
                expected: participants.len(),
                timestamp: Utc::now(),
            });
            self.advance(
                session_id,
                SessionStatus::InputsGathered,
                &format!("{}/{} responded", responded, participants.len()),
            )
            .await?;

            self.advance(session_id, SessionStatus::Deliberating, "applying mode")
                .await?;
            let outcome = deliberate(mode, &inputs);
            self.advance(
                session_id,
                SessionStatus::DeliberationComplete,
                if outcome.is_some() { "candidate decision" } else { "no inputs" },
            )
            .await?;

            self.advance(session_id, SessionStatus::BuildingConsensus, "scoring")
                .await?;
            let score = outcome
                .as_ref()
                .map(|o| consensus_score(o, responded, participants.len()))
                .unwrap_or(0.0);
            let reached = outcome.is_some() && score >= policy.threshold;
            self.with_session(session_id, |s| s.consensus_score = Some(score))
                .await?;
            self.event_bus.publish(CoordinationEvent::ConsensusEvaluated {
                session_id: session_id.to_string(),
                score,
                threshold: policy.threshold,
                reached,
                timestamp: Utc::now(),
            });
            debug!(session_id, score, threshold = policy.threshold, reached, "Consensus evaluated");

            if let (true, Some(outcome)) = (reached, outcome) {
                self.advance(
                    session_id,
                    SessionStatus::ConsensusReached,
                    &format!("score {:.2} >= {:.2}", score, policy.threshold),
                )
                .await?;
                self.advance(session_id, SessionStatus::Finalizing, "storing decision")
                    .await?;

                let responders: Vec<String> = inputs.iter().map(|i| i.agent_id.clone()).collect();
                let mut result = DecisionResult::completed(
                    &decision_id,
                    decision_type,
                    outcome.decision,
                    outcome.confidence,
                    format!(
                        "{} coordination: {}/{} participants, consensus score {:.2}",
                        mode,
                        responded,
                        participants.len(),
                        score
                    ),
                )
                .with_participants(responders)
                .with_consensus(true);
                result.partial_input = partial;

                let stored = self.engine.finalize_coordinated_decision(result).await;
                for agent in &participants {
                    let message = CoordinationMessage::final_decision(agent, session_id, &stored)?;
                    self.transport.deliver(&message).await?;
                }

                self.with_session(session_id, |s| s.final_decision = Some(stored))
                    .await?;
                self.advance(session_id, SessionStatus::Completed, "participants notified")
                    .await?;
                return Ok(());
            }

            self.advance(
                session_id,
                SessionStatus::ConsensusFailed,
                &format!("score {:.2} < {:.2}", score, policy.threshold),
            )
            .await?;

            if round < policy.retry_attempts {
                info!(session_id, attempt = round + 1, max = policy.retry_attempts, "Retrying coordination round");
                self.advance(session_id, SessionStatus::Retrying, "consensus not reached")
                    .await?;
                self.advance(session_id, SessionStatus::Active, "new round").await?;
                continue;
            }

            let reason = format!(
                "consensus not reached after {} retries",
                policy.retry_attempts
            );
            self.fail_session(session_id, &reason).await;
            for agent in &participants {
                let message =
                    CoordinationMessage::session_failed(agent, session_id, &decision_id, &reason);
                if let Err(e) = self.transport.deliver(&message).await {
                    warn!(session_id, agent = %agent, error = %e, "Failed to send failure notice");
                }
            }
            return Ok(());
        }
    }

    /// Wait for every participant concurrently; missing or broken answers are skipped
    async fn gather_inputs(
        &self,
        session_id: &str,
        participants: &[String],
        policy: &ModePolicy,
    ) -> Vec<AgentInput> {
        let waits = participants
            .iter()
            .map(|agent| self.transport.await_response(agent, session_id, policy.timeout));

        let mut inputs = Vec::new();
        for (agent, outcome) in participants.iter().zip(join_all(waits).await) {
            match outcome {
                Ok(Some(response)) => inputs.push(AgentInput::from_response(&response)),
                Ok(None) => debug!(session_id, agent = %agent, "No response before timeout"),
                Err(e) => warn!(session_id, agent = %agent, error = %e, "Unreadable response"),
            }
        }
        inputs
    }

    async fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut CoordinationSession) -> R,
    ) -> SessionResult<R> {
        let mut sessions = self.active_sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(f(session))
    }

    async fn advance(&self, session_id: &str, to: SessionStatus, reason: &str) -> SessionResult<()> {
        let from = self
            .with_session(session_id, |s| {
                let from = s.status;
                s.transition(to, reason).map(|_| from)
            })
            .await??;

        debug!(session_id, %from, %to, reason, "Session transition");
        self.event_bus.publish(CoordinationEvent::StatusChanged {
            session_id: session_id.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn fail_session(&self, session_id: &str, reason: &str) {
        let changed = self
            .with_session(session_id, |s| {
                let from = s.status;
                s.fail(reason);
                (from != s.status).then_some(from)
            })
            .await;

        if let Ok(Some(from)) = changed {
            self.event_bus.publish(CoordinationEvent::StatusChanged {
                session_id: session_id.to_string(),
                from,
                to: SessionStatus::Failed,
                timestamp: Utc::now(),
            });
        }
    }

    /// Move a finished session from the active map into history
    async fn archive(&self, session_id: &str) {
        let Some(session) = self.active_sessions.write().await.remove(session_id) else {
            return;
        };

        {
            let mut counters = self.counters.write().await;
            match session.status {
                SessionStatus::Completed => counters.completed += 1,
                _ => counters.failed += 1,
            }
            counters.total_duration_ms += session.duration_ms();
        }

        info!(
            session_id,
            status = %session.status,
            retries = session.retry_count,
            duration_ms = session.duration_ms(),
            "Coordination session ended"
        );
        self.event_bus.publish(CoordinationEvent::SessionEnded {
            session_id: session_id.to_string(),
            status: session.status,
            retries: session.retry_count,
            timestamp: Utc::now(),
        });

        let mut history = self.session_history.write().await;
        history.push_back(session);
        while history.len() > self.config.max_session_history.max(1) {
            history.pop_front();
        }
    }
}
