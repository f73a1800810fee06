//! Decision metrics
//!
//! Aggregate counters plus a bounded history of recent decisions.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{DecisionType, RequestId};

/// Aggregate decision statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub total_decisions: u64,
    pub successful_decisions: u64,
    pub failed_decisions: u64,
    pub collaborative_decisions: u64,
    pub fallback_decisions: u64,
    /// Running mean in seconds
    pub average_processing_time: f64,
    pub decision_types: HashMap<DecisionType, u64>,
}

impl DecisionMetrics {
    /// Record one finished decision.
    ///
    /// The average is updated incrementally; history is never re-summed.
    pub fn record_decision(
        &mut self,
        decision_type: DecisionType,
        success: bool,
        processing_time: f64,
        collaborative: bool,
    ) {
        self.total_decisions += 1;
        if success {
            self.successful_decisions += 1;
        } else {
            self.failed_decisions += 1;
        }
        if collaborative {
            self.collaborative_decisions += 1;
        }

        let n = self.total_decisions as f64;
        self.average_processing_time =
            (self.average_processing_time * (n - 1.0) + processing_time) / n;

        *self.decision_types.entry(decision_type).or_insert(0) += 1;
    }

    /// Count a decision that was answered through a degraded path
    pub fn record_fallback(&mut self) {
        self.fallback_decisions += 1;
    }

    /// Fraction of decisions that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.successful_decisions as f64 / self.total_decisions as f64
        }
    }
}

/// One entry in the recent-decision history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub request_id: RequestId,
    pub decision_type: DecisionType,
    pub success: bool,
    pub collaborative: bool,
    pub fallback: bool,
    pub processing_time: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate metrics with a drop-oldest history of recent decisions
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    metrics: DecisionMetrics,
    history: VecDeque<DecisionRecord>,
    max_history: usize,
}

impl MetricsRecorder {
    /// Create a recorder keeping at most `max_history` recent records
    pub fn new(max_history: usize) -> Self {
        Self {
            metrics: DecisionMetrics::default(),
            history: VecDeque::with_capacity(max_history.min(1024)),
            max_history,
        }
    }

    /// Record a decision in the aggregate and the history
    pub fn record(&mut self, record: DecisionRecord) {
        self.metrics.record_decision(
            record.decision_type,
            record.success,
            record.processing_time,
            record.collaborative,
        );
        if record.fallback {
            self.metrics.record_fallback();
        }

        if self.max_history == 0 {
            return;
        }
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    /// Copy of the aggregate metrics
    pub fn snapshot(&self) -> DecisionMetrics {
        self.metrics.clone()
    }

    /// Borrow the aggregate metrics
    pub fn metrics(&self) -> &DecisionMetrics {
        &self.metrics
    }

    /// Most recent `n` records, newest first
    pub fn recent(&self, n: usize) -> Vec<&DecisionRecord> {
        self.history.iter().rev().take(n).collect()
    }

    /// Number of records held
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drop history records older than `cutoff`. Aggregates are untouched.
    pub fn prune_history_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.history.len();
        self.history.retain(|r| r.recorded_at >= cutoff);
        before - self.history.len()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(1000)
    }
}
