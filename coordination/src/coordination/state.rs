//! Coordination session state machine - statuses, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::{DecisionResult, DecisionType, RequestId};

use super::mode::CoordinationMode;

/// Unique identifier for coordination sessions
pub type SessionId = String;

/// Status of a coordination session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, round about to start.
    Active,
    /// Input requests sent, waiting on participants.
    GatheringInputs,
    /// Input wait finished (possibly with missing participants).
    InputsGathered,
    /// Mode logic running over the inputs.
    Deliberating,
    /// Mode logic produced a candidate decision.
    DeliberationComplete,
    /// Consensus score being compared to the mode threshold.
    BuildingConsensus,
    /// Score met the threshold.
    ConsensusReached,
    /// Score fell short of the threshold.
    ConsensusFailed,
    /// Final decision being stored and announced.
    Finalizing,
    /// Decision finalized and participants notified.
    Completed,
    /// Starting another round.
    Retrying,
    /// Retries exhausted or an unrecoverable error.
    Failed,
}

impl SessionStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    ///
    /// Every non-terminal status may also move to `Failed`.
    pub fn valid_transitions(self) -> &'static [SessionStatus] {
        match self {
            Self::Active => &[Self::GatheringInputs, Self::Failed],
            Self::GatheringInputs => &[Self::InputsGathered, Self::Failed],
            Self::InputsGathered => &[Self::Deliberating, Self::Failed],
            Self::Deliberating => &[Self::DeliberationComplete, Self::Failed],
            Self::DeliberationComplete => &[Self::BuildingConsensus, Self::Failed],
            Self::BuildingConsensus => {
                &[Self::ConsensusReached, Self::ConsensusFailed, Self::Failed]
            }
            Self::ConsensusReached => &[Self::Finalizing, Self::Failed],
            Self::ConsensusFailed => &[Self::Retrying, Self::Failed],
            Self::Finalizing => &[Self::Completed, Self::Failed],
            Self::Retrying => &[Self::Active, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Whether `to` may follow this status.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::GatheringInputs => "gathering_inputs",
            Self::InputsGathered => "inputs_gathered",
            Self::Deliberating => "deliberating",
            Self::DeliberationComplete => "deliberation_complete",
            Self::BuildingConsensus => "building_consensus",
            Self::ConsensusReached => "consensus_reached",
            Self::ConsensusFailed => "consensus_failed",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A status transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid status transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub reason: String,
}

/// A coordination session and its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationSession {
    pub session_id: SessionId,
    /// Decision this session produces.
    pub decision_id: RequestId,
    pub decision_type: DecisionType,
    pub mode: CoordinationMode,
    pub participants: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub consensus_reached: bool,
    pub final_decision: Option<DecisionResult>,
    /// Rounds retried so far.
    pub retry_count: u32,
    /// Score from the most recent consensus round.
    pub consensus_score: Option<f64>,
    /// Responses received in the most recent round.
    pub responses_received: usize,
    /// Whether the most recent round ran without every participant.
    pub partial_input: bool,
    pub transitions: Vec<SessionTransition>,
    pub failure_reason: Option<String>,
}

impl CoordinationSession {
    /// Create a new session in `Active`.
    pub fn new(
        decision_id: &str,
        decision_type: DecisionType,
        mode: CoordinationMode,
        participants: Vec<String>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            decision_id: decision_id.to_string(),
            decision_type,
            mode,
            participants,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            consensus_reached: false,
            final_decision: None,
            retry_count: 0,
            consensus_score: None,
            responses_received: 0,
            partial_input: false,
            transitions: Vec::new(),
            failure_reason: None,
        }
    }

    /// Move to a new status with a reason.
    ///
    /// Terminal statuses stamp `end_time`; `Retrying` counts a retry.
    pub fn transition(&mut self, to: SessionStatus, reason: &str) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.status.valid_transitions()
                ),
            });
        }

        self.transitions.push(SessionTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.status = to;

        match to {
            SessionStatus::Retrying => self.retry_count += 1,
            SessionStatus::ConsensusReached => self.consensus_reached = true,
            SessionStatus::Failed => {
                if self.failure_reason.is_none() {
                    self.failure_reason = Some(reason.to_string());
                }
            }
            _ => {}
        }
        if to.is_terminal() {
            self.end_time = Some(Utc::now());
        }

        Ok(())
    }

    /// Move to `Failed` from any non-terminal status.
    pub fn fail(&mut self, reason: &str) {
        if self.status.is_terminal() {
            return;
        }
        self.failure_reason = Some(reason.to_string());
        // Every non-terminal status lists Failed as a valid target.
        let _ = self.transition(SessionStatus::Failed, reason);
    }

    /// Whether the session has ended.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Every status the session has held, in order.
    pub fn status_path(&self) -> Vec<SessionStatus> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        path.push(
            self.transitions
                .first()
                .map(|t| t.from)
                .unwrap_or(self.status),
        );
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }

    /// Session duration so far, or in total once ended.
    pub fn duration_ms(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} mode | {} participants | retries {} | score {}",
            self.status,
            self.mode,
            self.participants.len(),
            self.retry_count,
            self.consensus_score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "-".to_string())
        )
    }
}
