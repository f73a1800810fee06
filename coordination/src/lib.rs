//! Decision Coordination Library
//!
//! This library provides:
//! - A decision engine that routes typed requests to pluggable algorithms,
//!   with fallback results, metrics, and optional persistence
//! - Multi-agent coordination sessions that gather inputs, deliberate under
//!   one of five modes, and finalize a decision once consensus is reached
//! - Scheduled cleanup of decisions, sessions, inbox files, and metrics
//!
//! # Usage
//!
//! ```bash
//! # Run one decision request
//! decision-coordination decide --type task_assignment --context '{"task_type":"refactor","agent_id":"agent_7"}'
//!
//! # Coordinate a decision across agents over filesystem inboxes
//! decision-coordination coordinate --decision-id d-1 --mode majority --participants alpha,beta,gamma
//!
//! # Answer an input request as an agent
//! decision-coordination respond --agent alpha --session <session-id> --payload '{"decision":"ship"}'
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod cleanup;
pub mod config;
pub mod coordination;
pub mod decision;
pub mod events;

// Re-export configuration types
pub use config::{
    CleanupConfig, ConfigError, ConfigResult, CoordinationConfig, DecisionConfig, EngineConfig,
    ModeOverride,
};

// Re-export key decision types
pub use decision::{
    AlgorithmRegistry, CollaborationInterface, DecisionAlgorithm, DecisionEngine, DecisionMetrics,
    DecisionRepository, DecisionRequest, DecisionResult, DecisionStatus, DecisionType,
    InMemoryDecisionRepository, JsonFileDecisionRepository, SharedDecisionEngine,
};

// Re-export key coordination types
pub use coordination::{
    ChannelTransport, CoordinationMetrics, CoordinationMode, CoordinationSession,
    DecisionCoordinationSystem, FsInboxTransport, MessageTransport, SessionId, SessionStatus,
    SharedCoordinationSystem,
};

// Re-export event types
pub use events::{CoordinationEvent, EventBus, EventFilter, SharedEventBus};

// Re-export cleanup types
pub use cleanup::{CleanupHandle, CleanupTaskType, DecisionCleanupManager};
