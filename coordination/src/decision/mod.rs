//! Decision request lifecycle
//!
//! # Flow
//!
//! ```text
//! DecisionRequest ──▶ DecisionEngine ──▶ AlgorithmRegistry[type]
//!                          │                   │
//!                          │            validate_context ─✗─▶ fallback (failed, 0.1)
//!                          │                   │
//!                          │             make_decision ─✗─▶ fallback (failed, 0.1)
//!                          ▼                   │
//!               pending ──▶ completed ◀────────┘
//!                          │
//!                          ├─▶ DecisionRepository (optional)
//!                          └─▶ MetricsRecorder
//! ```
//!
//! Collaborative decisions go through an optional [`CollaborationInterface`];
//! without one the engine answers with the single registered algorithm and
//! marks the result `fallback_mode`.

pub mod algorithms;
pub mod collaboration;
pub mod engine;
pub mod metrics;
pub mod repository;
pub mod types;

pub use algorithms::{
    AlgorithmError, AlgorithmRegistry, AlgorithmResult, DecisionAlgorithm,
    ResourceAllocationAlgorithm, TaskAssignmentAlgorithm,
};
pub use collaboration::{CollaborationError, CollaborationInterface, CollaborationResult};
pub use engine::{DecisionEngine, PendingDecision, SharedDecisionEngine};
pub use metrics::{DecisionMetrics, DecisionRecord, MetricsRecorder};
pub use repository::{
    DecisionRepository, InMemoryDecisionRepository, JsonFileDecisionRepository,
    RepositoryError, RepositoryResult,
};
pub use types::{
    DecisionContext, DecisionPriority, DecisionRequest, DecisionResult, DecisionStatus,
    DecisionType, RequestId,
};
