//! Multi-agent coordination protocol
//!
//! ```text
//! Active ─▶ GatheringInputs ─▶ InputsGathered ─▶ Deliberating ─▶ DeliberationComplete
//!   ▲                                                                    │
//!   │                                                            BuildingConsensus
//!   │                                                               │          │
//! Retrying ◀── (retries left) ── ConsensusFailed ◀──────────────────┘   ConsensusReached
//!                                      │                                       │
//!                                   Failed                       Finalizing ─▶ Completed
//! ```
//!
//! Any non-terminal state may also move straight to `Failed`.

pub mod deliberation;
pub mod mode;
pub mod state;
pub mod system;
pub mod transport;

pub use deliberation::{
    agreement_ratio, consensus_score, deliberate, AgentInput, DeliberationOutcome,
};
pub use mode::{CoordinationMode, ModePolicy};
pub use state::{CoordinationSession, SessionId, SessionStatus, SessionTransition, TransitionError};
pub use system::{
    CoordinationMetrics, DecisionCoordinationSystem, SessionError, SessionResult,
    SharedCoordinationSystem,
};
pub use transport::{
    AgentResponse, AutoResponder, ChannelTransport, CoordinationMessage, FsInboxTransport,
    MessageTransport, SharedTransport, TransportError, TransportResult,
};
