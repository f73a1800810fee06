//! Cleanup tasks, schedules, and status reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a cleanup task evicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTaskType {
    /// Completed decisions past retention
    CompletedDecisions,
    /// Pending decisions that never completed
    StalePendingDecisions,
    /// Archived coordination sessions
    SessionHistory,
    /// Old inbox/outbox files
    InboxMessages,
    /// Old per-decision metrics records
    MetricsHistory,
}

impl CleanupTaskType {
    pub fn description(self) -> &'static str {
        match self {
            Self::CompletedDecisions => "Evict completed decisions past retention",
            Self::StalePendingDecisions => "Drop pending decisions that never completed",
            Self::SessionHistory => "Prune archived coordination sessions",
            Self::InboxMessages => "Delete old inbox and outbox files",
            Self::MetricsHistory => "Trim decision metrics history",
        }
    }

    /// Importance recorded on each task; lower is more urgent
    pub fn priority(self) -> u8 {
        match self {
            Self::StalePendingDecisions => 1,
            Self::CompletedDecisions => 2,
            Self::SessionHistory => 3,
            Self::MetricsHistory => 4,
            Self::InboxMessages => 5,
        }
    }
}

impl std::fmt::Display for CleanupTaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CompletedDecisions => "completed_decisions",
            Self::StalePendingDecisions => "stale_pending_decisions",
            Self::SessionHistory => "session_history",
            Self::InboxMessages => "inbox_messages",
            Self::MetricsHistory => "metrics_history",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One execution of a cleanup task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTask {
    pub task_id: String,
    pub task_type: CleanupTaskType,
    pub description: String,
    pub priority: u8,
    pub scheduled_time: DateTime<Utc>,
    pub execution_time: Option<DateTime<Utc>>,
    pub status: CleanupTaskStatus,
    /// Number of items removed
    pub result: Option<usize>,
    pub error_message: Option<String>,
}

impl CleanupTask {
    pub fn new(task_type: CleanupTaskType, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            task_type,
            description: task_type.description().to_string(),
            priority: task_type.priority(),
            scheduled_time,
            execution_time: None,
            status: CleanupTaskStatus::Pending,
            result: None,
            error_message: None,
        }
    }

    pub fn start(&mut self) {
        self.status = CleanupTaskStatus::Running;
        self.execution_time = Some(Utc::now());
    }

    pub fn complete(&mut self, removed: usize) {
        self.status = CleanupTaskStatus::Completed;
        self.result = Some(removed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = CleanupTaskStatus::Failed;
        self.error_message = Some(error.into());
    }
}

/// A named group of tasks run on a fixed interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSchedule {
    pub schedule_id: String,
    pub name: String,
    pub interval_minutes: i64,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: DateTime<Utc>,
    pub is_active: bool,
    pub tasks: Vec<CleanupTaskType>,
}

impl CleanupSchedule {
    /// New active schedule, due immediately since it has never run
    pub fn new(name: &str, interval_minutes: i64, tasks: Vec<CleanupTaskType>, now: DateTime<Utc>) -> Self {
        Self {
            schedule_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            interval_minutes,
            last_execution: None,
            next_execution: now,
            is_active: true,
            tasks,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && (self.last_execution.is_none() || now >= self.next_execution)
    }

    /// Record a run at `now` and push the next run one interval out
    pub fn mark_executed(&mut self, now: DateTime<Utc>) {
        self.last_execution = Some(now);
        self.next_execution = now + chrono::Duration::minutes(self.interval_minutes);
    }
}

/// Snapshot of the cleanup manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStatus {
    pub schedules: Vec<CleanupSchedule>,
    pub recent_tasks: Vec<CleanupTask>,
    pub total_tasks_run: u64,
    pub total_tasks_failed: u64,
    pub total_items_cleaned: u64,
    pub scheduler_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_due() {
        let now = Utc::now();
        let mut schedule = CleanupSchedule::new("regular", 60, vec![CleanupTaskType::CompletedDecisions], now);
        // Never executed, so due right away, even against an earlier clock.
        assert!(schedule.is_due(now));
        assert!(schedule.is_due(now - chrono::Duration::minutes(5)));

        schedule.mark_executed(now);
        assert_eq!(schedule.last_execution, Some(now));
        assert!(!schedule.is_due(now + chrono::Duration::minutes(59)));
        assert!(schedule.is_due(now + chrono::Duration::minutes(60)));

        let later = now + chrono::Duration::minutes(61);
        schedule.mark_executed(later);
        assert!(!schedule.is_due(later + chrono::Duration::minutes(59)));

        schedule.is_active = false;
        assert!(!schedule.is_due(later + chrono::Duration::days(1)));
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = CleanupTask::new(CleanupTaskType::InboxMessages, Utc::now());
        assert_eq!(task.status, CleanupTaskStatus::Pending);
        task.start();
        assert!(task.execution_time.is_some());
        task.complete(4);
        assert_eq!(task.status, CleanupTaskStatus::Completed);
        assert_eq!(task.result, Some(4));
    }

    #[test]
    fn test_priorities_unique() {
        let mut priorities: Vec<u8> = [
            CleanupTaskType::CompletedDecisions,
            CleanupTaskType::StalePendingDecisions,
            CleanupTaskType::SessionHistory,
            CleanupTaskType::InboxMessages,
            CleanupTaskType::MetricsHistory,
        ]
        .iter()
        .map(|t| t.priority())
        .collect();
        priorities.sort();
        priorities.dedup();
        assert_eq!(priorities.len(), 5);
    }
}
