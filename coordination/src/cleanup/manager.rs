//! Periodic eviction of decisions, sessions, inbox files, and metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CleanupConfig;
use crate::coordination::{FsInboxTransport, SharedCoordinationSystem, TransportError};
use crate::decision::SharedDecisionEngine;
use crate::events::{CoordinationEvent, SharedEventBus};

use super::types::{CleanupSchedule, CleanupStatus, CleanupTask, CleanupTaskStatus, CleanupTaskType};

/// Error type for cleanup operations
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("Unknown cleanup schedule: {0}")]
    UnknownSchedule(String),

    #[error("Inbox cleanup failed: {0}")]
    Inbox(#[from] TransportError),
}

/// Result type for cleanup operations
pub type CleanupResult<T> = Result<T, CleanupError>;

#[derive(Debug, Default)]
struct CleanupTotals {
    tasks_run: u64,
    tasks_failed: u64,
    items_cleaned: u64,
}

/// Runs cleanup schedules against the engine and coordination system
pub struct DecisionCleanupManager {
    engine: SharedDecisionEngine,
    system: Option<SharedCoordinationSystem>,
    inbox: Option<FsInboxTransport>,
    event_bus: Option<SharedEventBus>,
    config: CleanupConfig,
    schedules: RwLock<Vec<CleanupSchedule>>,
    task_history: RwLock<VecDeque<CleanupTask>>,
    totals: RwLock<CleanupTotals>,
    running: AtomicBool,
}

impl DecisionCleanupManager {
    pub fn new(engine: SharedDecisionEngine, config: CleanupConfig) -> Self {
        Self {
            engine,
            system: None,
            inbox: None,
            event_bus: None,
            config,
            schedules: RwLock::new(Vec::new()),
            task_history: RwLock::new(VecDeque::new()),
            totals: RwLock::new(CleanupTotals::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Also prune the system's archived sessions
    pub fn with_system(mut self, system: SharedCoordinationSystem) -> Self {
        self.system = Some(system);
        self
    }

    /// Also prune inbox/outbox files
    pub fn with_inbox(mut self, inbox: FsInboxTransport) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Install the default schedules, replacing any existing ones
    pub async fn initialize(&self) {
        let now = Utc::now();
        let defaults = vec![
            CleanupSchedule::new(
                "regular",
                60,
                vec![
                    CleanupTaskType::CompletedDecisions,
                    CleanupTaskType::StalePendingDecisions,
                ],
                now,
            ),
            CleanupSchedule::new(
                "performance",
                360,
                vec![CleanupTaskType::SessionHistory, CleanupTaskType::MetricsHistory],
                now,
            ),
            CleanupSchedule::new(
                "maintenance",
                1440,
                vec![
                    CleanupTaskType::InboxMessages,
                    CleanupTaskType::CompletedDecisions,
                ],
                now,
            ),
        ];
        info!(schedules = defaults.len(), "Cleanup schedules initialized");
        *self.schedules.write().await = defaults;
    }

    /// Run every schedule due at `now`; returns items removed per schedule
    pub async fn run_due_schedules(&self, now: DateTime<Utc>) -> Vec<(String, usize)> {
        let due: Vec<String> = self
            .schedules
            .read()
            .await
            .iter()
            .filter(|s| s.is_due(now))
            .map(|s| s.name.clone())
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for name in due {
            match self.run_schedule(&name, now).await {
                Ok(cleaned) => results.push((name, cleaned)),
                Err(e) => warn!(schedule = %name, error = %e, "Cleanup schedule failed"),
            }
        }
        results
    }

    /// Run one schedule now, regardless of when it is due
    pub async fn execute_schedule(&self, name: &str) -> CleanupResult<usize> {
        self.run_schedule(name, Utc::now()).await
    }

    /// Run a single task type now, outside any schedule
    pub async fn execute_task(&self, task_type: CleanupTaskType) -> CleanupTask {
        let mut task = CleanupTask::new(task_type, Utc::now());
        self.run_task(&mut task, Utc::now()).await;
        self.record_task(task.clone()).await;
        task
    }

    async fn run_schedule(&self, name: &str, now: DateTime<Utc>) -> CleanupResult<usize> {
        let task_types = self
            .schedules
            .read()
            .await
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.tasks.clone())
            .ok_or_else(|| CleanupError::UnknownSchedule(name.to_string()))?;

        debug!(schedule = name, tasks = task_types.len(), "Running cleanup schedule");

        let mut cleaned = 0;
        for task_type in task_types {
            let mut task = CleanupTask::new(task_type, now);
            self.run_task(&mut task, now).await;
            cleaned += task.result.unwrap_or(0);
            self.record_task(task).await;
        }

        if let Some(schedule) = self
            .schedules
            .write()
            .await
            .iter_mut()
            .find(|s| s.name == name)
        {
            schedule.mark_executed(now);
        }

        info!(schedule = name, cleaned, "Cleanup schedule executed");
        if let Some(bus) = &self.event_bus {
            bus.publish(CoordinationEvent::CleanupExecuted {
                schedule: name.to_string(),
                cleaned,
                timestamp: Utc::now(),
            });
        }
        Ok(cleaned)
    }

    async fn run_task(&self, task: &mut CleanupTask, now: DateTime<Utc>) {
        task.start();
        let cutoff = |minutes: i64| now - chrono::Duration::minutes(minutes);

        let outcome: CleanupResult<usize> = match task.task_type {
            CleanupTaskType::CompletedDecisions => Ok(self
                .engine
                .evict_completed_before(cutoff(self.config.decision_retention_minutes))
                .await),
            CleanupTaskType::StalePendingDecisions => Ok(self
                .engine
                .evict_stale_pending(cutoff(self.config.pending_retention_minutes))
                .await),
            CleanupTaskType::MetricsHistory => Ok(self
                .engine
                .prune_metrics_history(cutoff(self.config.metrics_retention_minutes))
                .await),
            CleanupTaskType::SessionHistory => match &self.system {
                Some(system) => Ok(system
                    .prune_history_before(cutoff(self.config.session_retention_minutes))
                    .await),
                None => Ok(0),
            },
            CleanupTaskType::InboxMessages => match &self.inbox {
                Some(inbox) => inbox
                    .prune_older_than(cutoff(self.config.inbox_retention_minutes))
                    .await
                    .map_err(CleanupError::from),
                None => Ok(0),
            },
        };

        match outcome {
            Ok(removed) => {
                debug!(task = %task.task_type, removed, "Cleanup task completed");
                task.complete(removed);
            }
            Err(e) => {
                warn!(task = %task.task_type, error = %e, "Cleanup task failed");
                task.fail(e.to_string());
            }
        }
    }

    async fn record_task(&self, task: CleanupTask) {
        {
            let mut totals = self.totals.write().await;
            totals.tasks_run += 1;
            if task.status == CleanupTaskStatus::Failed {
                totals.tasks_failed += 1;
            }
            totals.items_cleaned += task.result.unwrap_or(0) as u64;
        }

        let mut history = self.task_history.write().await;
        history.push_back(task);
        while history.len() > self.config.max_task_history.max(1) {
            history.pop_front();
        }
    }

    /// Start the background tick loop
    pub fn schedule_cleanup(self: &Arc<Self>) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let tick_interval = self.config.tick_interval();

        let handle = tokio::spawn(async move {
            manager.running.store(true, Ordering::SeqCst);
            info!(tick_secs = tick_interval.as_secs(), "Cleanup scheduler started");

            let mut tick = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let ran = manager.run_due_schedules(Utc::now()).await;
                        if !ran.is_empty() {
                            debug!(schedules = ran.len(), "Cleanup tick ran schedules");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            manager.running.store(false, Ordering::SeqCst);
            info!("Cleanup scheduler stopped");
        });

        CleanupHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    pub async fn cleanup_status(&self) -> CleanupStatus {
        let totals = self.totals.read().await;
        CleanupStatus {
            schedules: self.schedules.read().await.clone(),
            recent_tasks: self.task_history.read().await.iter().cloned().collect(),
            total_tasks_run: totals.tasks_run,
            total_tasks_failed: totals.tasks_failed,
            total_items_cleaned: totals.items_cleaned,
            scheduler_running: self.running.load(Ordering::SeqCst),
        }
    }

    /// Turn a schedule on or off; returns false if it does not exist
    pub async fn set_schedule_active(&self, name: &str, active: bool) -> bool {
        match self
            .schedules
            .write()
            .await
            .iter_mut()
            .find(|s| s.name == name)
        {
            Some(schedule) => {
                schedule.is_active = active;
                true
            }
            None => false,
        }
    }
}

/// Handle to the background cleanup loop
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cleanup scheduler ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decision::{DecisionEngine, DecisionRequest, DecisionType};
    use serde_json::{json, Map};

    fn manager() -> (SharedDecisionEngine, Arc<DecisionCleanupManager>) {
        let engine = DecisionEngine::new(EngineConfig::default()).shared();
        let manager = DecisionCleanupManager::new(Arc::clone(&engine), CleanupConfig::default()).shared();
        (engine, manager)
    }

    async fn decide(engine: &DecisionEngine) {
        let mut context = Map::new();
        context.insert("agent_id".into(), json!("agent_1"));
        context.insert("task_type".into(), json!("refactor"));
        let request = DecisionRequest::new(DecisionType::TaskAssignment, "tester", context);
        engine.process_decision_request(request).await;
    }

    #[tokio::test]
    async fn test_initialize_defaults() {
        let (_, manager) = manager();
        manager.initialize().await;
        let status = manager.cleanup_status().await;
        let names: Vec<_> = status.schedules.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["regular", "performance", "maintenance"]);
        assert_eq!(status.schedules[1].interval_minutes, 360);
        assert!(!status.scheduler_running);
    }

    #[tokio::test]
    async fn test_due_schedules_evict() {
        let (engine, manager) = manager();
        manager.initialize().await;
        decide(&engine).await;
        assert_eq!(engine.completed_count().await, 1);

        // Every schedule runs on the first tick; the decision is still fresh.
        let now = Utc::now();
        let ran = manager.run_due_schedules(now).await;
        let names: Vec<_> = ran.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["regular", "performance", "maintenance"]);
        assert_eq!(engine.completed_count().await, 1);
        assert!(manager.run_due_schedules(now).await.is_empty());

        let later = now + chrono::Duration::hours(2);
        let ran = manager.run_due_schedules(later).await;
        assert_eq!(ran, vec![("regular".to_string(), 1)]);
        assert_eq!(engine.completed_count().await, 0);

        let status = manager.cleanup_status().await;
        assert_eq!(status.total_tasks_run, 8);
        assert_eq!(status.total_items_cleaned, 1);
        let regular = &status.schedules[0];
        assert_eq!(regular.last_execution, Some(later));
    }

    #[tokio::test]
    async fn test_schedule_runs_tasks_in_declared_order() {
        let (_, manager) = manager();
        manager.initialize().await;
        manager.execute_schedule("maintenance").await.unwrap();

        let order: Vec<_> = manager
            .cleanup_status()
            .await
            .recent_tasks
            .iter()
            .map(|t| t.task_type)
            .collect();
        assert_eq!(
            order,
            vec![CleanupTaskType::InboxMessages, CleanupTaskType::CompletedDecisions]
        );
    }

    #[tokio::test]
    async fn test_unknown_schedule() {
        let (_, manager) = manager();
        manager.initialize().await;
        assert!(matches!(
            manager.execute_schedule("hourly").await,
            Err(CleanupError::UnknownSchedule(_))
        ));
    }

    #[tokio::test]
    async fn test_task_history_capped() {
        let engine = DecisionEngine::new(EngineConfig::default()).shared();
        let config = CleanupConfig {
            max_task_history: 3,
            ..Default::default()
        };
        let manager = DecisionCleanupManager::new(engine, config);
        manager.initialize().await;
        for _ in 0..3 {
            manager.execute_schedule("regular").await.unwrap();
        }
        let status = manager.cleanup_status().await;
        assert_eq!(status.recent_tasks.len(), 3);
        assert_eq!(status.total_tasks_run, 6);
    }

    #[tokio::test]
    async fn test_inactive_schedule_skipped() {
        let (_, manager) = manager();
        manager.initialize().await;
        assert!(manager.set_schedule_active("regular", false).await);
        assert!(!manager.set_schedule_active("nope", false).await);
        let ran = manager.run_due_schedules(Utc::now()).await;
        assert!(ran.iter().all(|(name, _)| name != "regular"));
        assert_eq!(ran.len(), 2);
    }

    #[tokio::test]
    async fn test_scheduler_shutdown() {
        let (_, manager) = manager();
        manager.initialize().await;
        let handle = manager.schedule_cleanup();
        tokio::task::yield_now().await;
        handle.shutdown().await;
        assert!(!manager.cleanup_status().await.scheduler_running);
    }
}
