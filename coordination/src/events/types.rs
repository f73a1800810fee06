//! Event types for decision processing and coordination sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::{CoordinationMode, SessionId, SessionStatus};
use crate::decision::{DecisionStatus, DecisionType, RequestId};

/// Events published while decisions are made and sessions progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    /// The engine finished a request
    DecisionProcessed {
        request_id: RequestId,
        decision_type: DecisionType,
        status: DecisionStatus,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A coordination session was created
    SessionStarted {
        session_id: SessionId,
        decision_id: RequestId,
        mode: CoordinationMode,
        participants: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A session moved between states
    StatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// Input gathering finished
    InputsCollected {
        session_id: SessionId,
        received: usize,
        expected: usize,
        timestamp: DateTime<Utc>,
    },

    /// The consensus score was compared against the mode threshold
    ConsensusEvaluated {
        session_id: SessionId,
        score: f64,
        threshold: f64,
        reached: bool,
        timestamp: DateTime<Utc>,
    },

    /// A session reached a terminal state
    SessionEnded {
        session_id: SessionId,
        status: SessionStatus,
        retries: u32,
        timestamp: DateTime<Utc>,
    },

    /// A cleanup schedule ran
    CleanupExecuted {
        schedule: String,
        cleaned: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CoordinationEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DecisionProcessed { .. } => "decision_processed",
            Self::SessionStarted { .. } => "session_started",
            Self::StatusChanged { .. } => "status_changed",
            Self::InputsCollected { .. } => "inputs_collected",
            Self::ConsensusEvaluated { .. } => "consensus_evaluated",
            Self::SessionEnded { .. } => "session_ended",
            Self::CleanupExecuted { .. } => "cleanup_executed",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::StatusChanged { session_id, .. }
            | Self::InputsCollected { session_id, .. }
            | Self::ConsensusEvaluated { session_id, .. }
            | Self::SessionEnded { session_id, .. } => Some(session_id),
            Self::DecisionProcessed { .. } | Self::CleanupExecuted { .. } => None,
        }
    }

    /// When the event happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DecisionProcessed { timestamp, .. }
            | Self::SessionStarted { timestamp, .. }
            | Self::StatusChanged { timestamp, .. }
            | Self::InputsCollected { timestamp, .. }
            | Self::ConsensusEvaluated { timestamp, .. }
            | Self::SessionEnded { timestamp, .. }
            | Self::CleanupExecuted { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoordinationEvent::StatusChanged {
            session_id: "s-1".to_string(),
            from: SessionStatus::Active,
            to: SessionStatus::GatheringInputs,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "gathering_inputs");
        assert_eq!(event.session_id(), Some("s-1"));
    }

    #[test]
    fn test_non_session_events() {
        let event = CoordinationEvent::CleanupExecuted {
            schedule: "regular".to_string(),
            cleaned: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "cleanup_executed");
        assert!(event.session_id().is_none());
    }
}
