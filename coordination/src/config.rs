//! Configuration for the engine, coordination sessions, and cleanup
//!
//! Loaded from TOML, overridden by `DECISION_*` environment variables, or
//! taken from defaults. Every field has a default so partial files work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordination::CoordinationMode;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub engine: EngineConfig,
    pub coordination: CoordinationConfig,
    pub cleanup: CleanupConfig,
}

impl DecisionConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `DECISION_*` environment overrides in place
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("DECISION_FALLBACK_CONFIDENCE") {
            self.engine.fallback_confidence = v;
        }
        if let Some(v) = env_parse("DECISION_MAX_COMPLETED") {
            self.engine.max_completed_decisions = v;
        }
        if let Ok(root) = std::env::var("DECISION_WORKSPACE_ROOT") {
            self.coordination.workspace_root = PathBuf::from(root);
        }
        if let Some(v) = env_parse("DECISION_GATHER_TIMEOUT_SECS") {
            self.coordination.gather_timeout_secs = v;
        }
        if let Some(v) = env_parse("DECISION_POLL_INTERVAL_MS") {
            self.coordination.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("DECISION_CLEANUP_TICK_SECS") {
            self.cleanup.tick_interval_secs = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Decision engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence attached to fallback (failed) results
    pub fallback_confidence: f64,
    /// Completed decisions kept in memory before the oldest is evicted
    pub max_completed_decisions: usize,
    /// Recent decision records kept for inspection
    pub metrics_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: 0.1,
            max_completed_decisions: 10_000,
            metrics_history_limit: 1_000,
        }
    }
}

/// Per-mode override; unset fields keep the mode's default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeOverride {
    pub threshold: Option<f64>,
    pub retry_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Coordination session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Root of the per-agent inbox directories
    pub workspace_root: PathBuf,
    /// How long to wait for participant input
    pub gather_timeout_secs: u64,
    /// Poll interval for filesystem responses
    pub poll_interval_ms: u64,
    /// Deadline advertised in input requests
    pub input_deadline_secs: u64,
    /// Finished sessions kept before the oldest is evicted
    pub max_session_history: usize,
    /// Per-mode overrides
    pub modes: HashMap<CoordinationMode, ModeOverride>,
}

impl CoordinationConfig {
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("agent_workspaces"),
            gather_timeout_secs: 60,
            poll_interval_ms: 1_000,
            input_deadline_secs: 60,
            max_session_history: 500,
            modes: HashMap::new(),
        }
    }
}

/// Cleanup scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Scheduler tick
    pub tick_interval_secs: u64,
    /// Completed decisions older than this are evicted
    pub decision_retention_minutes: i64,
    /// Pending decisions older than this are considered abandoned
    pub pending_retention_minutes: i64,
    /// Archived sessions older than this are evicted
    pub session_retention_minutes: i64,
    /// Inbox/outbox files older than this are deleted
    pub inbox_retention_minutes: i64,
    /// Metrics history records older than this are dropped
    pub metrics_retention_minutes: i64,
    /// Task execution records kept
    pub max_task_history: usize,
}

impl CleanupConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            decision_retention_minutes: 60,
            pending_retention_minutes: 30,
            session_retention_minutes: 120,
            inbox_retention_minutes: 1_440,
            metrics_retention_minutes: 1_440,
            max_task_history: 100,
        }
    }
}
