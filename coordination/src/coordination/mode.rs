//! Coordination modes and their consensus policies

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CoordinationConfig;

/// How a session turns participant inputs into one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    /// Every input must agree
    Consensus,
    /// The most common input wins
    Majority,
    /// The input with the highest expertise score wins
    ExpertOpinion,
    /// The input from the highest hierarchy level wins
    Hierarchical,
    /// All inputs are merged into one aggregate
    Collaborative,
}

impl CoordinationMode {
    pub fn all() -> &'static [CoordinationMode] {
        &[
            CoordinationMode::Consensus,
            CoordinationMode::Majority,
            CoordinationMode::ExpertOpinion,
            CoordinationMode::Hierarchical,
            CoordinationMode::Collaborative,
        ]
    }

    /// Minimum consensus score for the session to succeed
    pub fn default_threshold(self) -> f64 {
        match self {
            CoordinationMode::Consensus => 1.0,
            CoordinationMode::Majority => 0.51,
            CoordinationMode::ExpertOpinion => 0.8,
            CoordinationMode::Hierarchical => 0.7,
            CoordinationMode::Collaborative => 0.6,
        }
    }

    /// Retries allowed after a failed consensus round
    pub fn default_retry_attempts(self) -> u32 {
        match self {
            CoordinationMode::Consensus => 3,
            CoordinationMode::Majority => 2,
            CoordinationMode::ExpertOpinion => 1,
            CoordinationMode::Hierarchical => 2,
            CoordinationMode::Collaborative => 3,
        }
    }

    /// Effective policy for this mode under a configuration
    pub fn policy(self, config: &CoordinationConfig) -> ModePolicy {
        let overrides = config.modes.get(&self);
        ModePolicy {
            threshold: overrides
                .and_then(|o| o.threshold)
                .unwrap_or_else(|| self.default_threshold()),
            retry_attempts: overrides
                .and_then(|o| o.retry_attempts)
                .unwrap_or_else(|| self.default_retry_attempts()),
            timeout: overrides
                .and_then(|o| o.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.gather_timeout()),
        }
    }
}

impl std::fmt::Display for CoordinationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationMode::Consensus => write!(f, "consensus"),
            CoordinationMode::Majority => write!(f, "majority"),
            CoordinationMode::ExpertOpinion => write!(f, "expert_opinion"),
            CoordinationMode::Hierarchical => write!(f, "hierarchical"),
            CoordinationMode::Collaborative => write!(f, "collaborative"),
        }
    }
}

impl std::str::FromStr for CoordinationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase().replace('-', "_");
        CoordinationMode::all()
            .iter()
            .copied()
            .find(|m| m.to_string() == wanted)
            .ok_or_else(|| format!("unknown coordination mode: {}", s))
    }
}

/// Threshold, retry budget, and input timeout for one mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModePolicy {
    pub threshold: f64,
    pub retry_attempts: u32,
    pub timeout: Duration,
}
