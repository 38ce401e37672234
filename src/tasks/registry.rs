//! # Task Registry
//!
//! In-memory table of background task records, shared between the request
//! flow that creates and polls tasks and the producers that run them.
//!
//! ## Concurrency
//!
//! One `parking_lot::Mutex` guards the whole map. Every operation holds it for
//! a constant amount of work (cleanup is linear in the number of records) and
//! never performs I/O while holding it.
//!
//! ## Terminal states
//!
//! Once a record is completed, failed or cancelled, `start`,
//! `update_progress`, `complete` and `fail` leave it untouched. `cancel`
//! reports [`TaskError::AlreadyFinished`] so callers can surface
//! "task already finished".
//!
//! ```rust
//! use affinity_core::tasks::{TaskRegistry, TaskStatus};
//!
//! let registry = TaskRegistry::new();
//! let task_id = registry.create("mining", Default::default());
//! registry.start(&task_id, "Task started");
//! registry.update_progress(&task_id, 0.5, "Halfway");
//! registry.complete(&task_id, None, "Task completed");
//!
//! let record = registry.get(&task_id).unwrap();
//! assert_eq!(record.status, TaskStatus::Completed);
//! assert_eq!(record.progress, 1.0);
//! ```

use super::record::TaskRecord;
use super::status::TaskStatus;
use crate::constants::messages;
use crate::logging::log_task_operation;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Errors reported to callers that act on a task they do not own
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task not found: {task_id}")]
    NotFound { task_id: String },
    #[error("Task already finished: {task_id} is {status}")]
    AlreadyFinished { task_id: String, status: TaskStatus },
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Thread-safe task lifecycle bookkeeping
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new PENDING record and return its id
    pub fn create(&self, task_type: &str, metadata: Map<String, Value>) -> String {
        let task_id = Uuid::new_v4().to_string();
        let record = TaskRecord::new(task_id.clone(), task_type, metadata);

        self.tasks.lock().insert(task_id.clone(), record);

        log_task_operation("create", &task_id, Some(task_type), "pending", None);
        task_id
    }

    /// Move a task to RUNNING and stamp its start time
    pub fn start(&self, task_id: &str, message: &str) {
        let applied = self.mutate_active(task_id, "start", |record| {
            if record.status == TaskStatus::Pending {
                record.status = TaskStatus::Running;
                record.started_at = Some(Utc::now());
            }
            record.message = message.to_string();
        });
        if applied {
            log_task_operation("start", task_id, None, "running", Some(message));
        }
    }

    /// Record progress, clamped to [0, 1] and never moving backwards
    pub fn update_progress(&self, task_id: &str, progress: f64, message: &str) {
        let clamped = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };

        self.mutate_active(task_id, "update_progress", |record| {
            record.progress = record.progress.max(clamped);
            if !message.is_empty() {
                record.message = message.to_string();
            }
        });
        debug!(task_id = %task_id, progress = clamped, "Task progress");
    }

    /// Mark a task COMPLETED with its result payload
    pub fn complete(&self, task_id: &str, result: Option<Value>, message: &str) {
        let applied = self.mutate_active(task_id, "complete", |record| {
            record.status = TaskStatus::Completed;
            record.completed_at = Some(Utc::now());
            record.progress = 1.0;
            record.message = message.to_string();
            record.result = result;
        });
        if applied {
            log_task_operation("complete", task_id, None, "completed", Some(message));
        }
    }

    /// Mark a task FAILED with an error description
    pub fn fail(&self, task_id: &str, error: &str, message: &str) {
        let applied = self.mutate_active(task_id, "fail", |record| {
            record.status = TaskStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error = Some(error.to_string());
            record.message = message.to_string();
        });
        if applied {
            error!(task_id = %task_id, error = %error, "❌ Task failed");
        }
    }

    /// Flip a task to CANCELLED.
    ///
    /// Bookkeeping only: a producer already running the task is not
    /// interrupted, and its later complete/fail calls are ignored.
    pub fn cancel(&self, task_id: &str) -> Result<(), TaskError> {
        {
            let mut tasks = self.tasks.lock();
            let record = tasks.get_mut(task_id).ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })?;

            if record.status.is_terminal() {
                return Err(TaskError::AlreadyFinished {
                    task_id: task_id.to_string(),
                    status: record.status,
                });
            }

            record.status = TaskStatus::Cancelled;
            record.completed_at = Some(Utc::now());
            record.message = messages::TASK_CANCELLED.to_string();
        }

        log_task_operation("cancel", task_id, None, "cancelled", None);
        Ok(())
    }

    /// Snapshot of one task
    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.lock().get(task_id).cloned()
    }

    /// Snapshot of every task
    pub fn list_all(&self) -> HashMap<String, TaskRecord> {
        self.tasks.lock().clone()
    }

    /// Snapshot of RUNNING tasks
    pub fn list_running(&self) -> HashMap<String, TaskRecord> {
        self.tasks
            .lock()
            .iter()
            .filter(|(_, record)| record.status == TaskStatus::Running)
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let tasks = self.tasks.lock();
        let mut stats = RegistryStats {
            total: tasks.len(),
            ..RegistryStats::default()
        };
        for record in tasks.values() {
            match record.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Remove every record created more than `max_age` ago, whatever its status
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        match cutoff {
            Some(cutoff) => self.cleanup_created_before(cutoff),
            None => 0,
        }
    }

    /// Remove every record created strictly before `cutoff`
    pub fn cleanup_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let removed: Vec<String> = {
            let mut tasks = self.tasks.lock();
            let expired: Vec<String> = tasks
                .iter()
                .filter(|(_, record)| record.created_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            for task_id in &expired {
                tasks.remove(task_id);
            }
            expired
        };

        for task_id in &removed {
            info!(task_id = %task_id, "🧹 Cleaned up old task");
        }
        removed.len()
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` until the handle is aborted
    pub fn spawn_cleanup_loop(
        registry: Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.cleanup(max_age);
                if removed > 0 {
                    info!(
                        removed = removed,
                        max_age_seconds = max_age.as_secs(),
                        "🧹 Task cleanup pass finished"
                    );
                }
            }
        })
    }

    /// Apply `op` to a non-terminal record; returns whether it was applied
    fn mutate_active<F>(&self, task_id: &str, operation: &str, op: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(task_id) {
            Some(record) if record.status.is_terminal() => {
                debug!(
                    task_id = %task_id,
                    operation = operation,
                    status = %record.status,
                    "Ignoring update to finished task"
                );
                false
            }
            Some(record) => {
                op(record);
                true
            }
            None => {
                debug!(
                    task_id = %task_id,
                    operation = operation,
                    "Ignoring update to unknown task"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("days_back".to_string(), json!(30));
        map
    }

    #[test]
    fn test_create_starts_pending() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("association_mining", metadata());

        let record = registry.get(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.progress, 0.0);
        assert_eq!(record.message, "association_mining task created");
        assert_eq!(record.metadata["days_back"], json!(30));
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = TaskRegistry::new();
        let a = registry.create("mining", Map::new());
        let b = registry.create("mining", Map::new());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_start_stamps_once() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());

        registry.start(&task_id, "first");
        let started_at = registry.get(&task_id).unwrap().started_at;
        registry.start(&task_id, "second");

        let record = registry.get(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.started_at, started_at);
        assert_eq!(record.message, "second");
    }

    #[test]
    fn test_progress_clamped_and_monotonic() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());
        registry.start(&task_id, "go");

        registry.update_progress(&task_id, 0.4, "forty");
        registry.update_progress(&task_id, 0.2, "");
        let record = registry.get(&task_id).unwrap();
        assert_eq!(record.progress, 0.4);
        assert_eq!(record.message, "forty");

        registry.update_progress(&task_id, 7.0, "too far");
        assert_eq!(registry.get(&task_id).unwrap().progress, 1.0);

        registry.update_progress(&task_id, -3.0, "");
        assert_eq!(registry.get(&task_id).unwrap().progress, 1.0);
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let registry = TaskRegistry::new();
        registry.update_progress("missing", 0.5, "nobody home");
        registry.complete("missing", None, "done");
        registry.fail("missing", "boom", "failed");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_complete_twice_keeps_first_timestamp() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());
        registry.start(&task_id, "go");
        registry.complete(&task_id, Some(json!({"recommendations_count": 3})), "done");

        let first = registry.get(&task_id).unwrap();
        assert_eq!(first.progress, 1.0);
        assert!(first.completed_at.is_some());

        std::thread::sleep(Duration::from_millis(5));
        registry.complete(&task_id, Some(json!({"recommendations_count": 9})), "again");

        let second = registry.get(&task_id).unwrap();
        assert_eq!(second.completed_at, first.completed_at);
        assert_eq!(second.result, Some(json!({"recommendations_count": 3})));
        assert_eq!(second.message, "done");
    }

    #[test]
    fn test_fail_records_error_without_result() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());
        registry.start(&task_id, "go");
        registry.update_progress(&task_id, 0.3, "");
        registry.fail(&task_id, "primitive exploded", "Task failed");

        let record = registry.get(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("primitive exploded"));
        assert!(record.result.is_none());
        assert!(record.completed_at.is_some());
        assert_eq!(record.progress, 0.3);
    }

    #[test]
    fn test_cancel_rules() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());
        registry.start(&task_id, "go");

        registry.cancel(&task_id).unwrap();
        let record = registry.get(&task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.message, "Task cancelled");
        assert!(record.completed_at.is_some());

        assert_eq!(
            registry.cancel(&task_id),
            Err(TaskError::AlreadyFinished {
                task_id: task_id.clone(),
                status: TaskStatus::Cancelled,
            })
        );
        assert_eq!(
            registry.cancel("missing"),
            Err(TaskError::NotFound {
                task_id: "missing".to_string()
            })
        );

        // A producer finishing after cancellation does not rewrite the record
        registry.complete(&task_id, Some(json!({})), "late");
        assert_eq!(registry.get(&task_id).unwrap().status, TaskStatus::Cancelled);
    }

    /// Collects the `operation` field of every `TASK_OPERATION` event
    #[derive(Clone, Default)]
    struct OperationLog(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for OperationLog {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            #[derive(Default)]
            struct Visitor {
                message: String,
                operation: Option<String>,
            }

            impl tracing::field::Visit for Visitor {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    match field.name() {
                        "message" => self.message = format!("{value:?}"),
                        "operation" => self.operation = Some(format!("{value:?}")),
                        _ => {}
                    }
                }
            }

            let mut visitor = Visitor::default();
            event.record(&mut visitor);
            if !visitor.message.ends_with("TASK_OPERATION") {
                return;
            }
            if let Some(operation) = visitor.operation {
                self.0.lock().push(operation);
            }
        }
    }

    #[test]
    fn test_start_logs_only_when_applied() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = OperationLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());

        tracing::subscriber::with_default(subscriber, || {
            let registry = TaskRegistry::new();
            let task_id = registry.create("mining", Map::new());
            registry.start(&task_id, "go");
            registry.complete(&task_id, None, "done");

            registry.start(&task_id, "restart");
            registry.start("missing", "go");

            let record = registry.get(&task_id).unwrap();
            assert_eq!(record.status, TaskStatus::Completed);
            assert_eq!(record.message, "done");
        });

        let starts = log.0.lock().iter().filter(|op| op.as_str() == "start").count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_list_running_and_stats() {
        let registry = TaskRegistry::new();
        let running = registry.create("mining", Map::new());
        let pending = registry.create("mining", Map::new());
        let done = registry.create("mining", Map::new());
        registry.start(&running, "go");
        registry.start(&done, "go");
        registry.complete(&done, None, "done");

        let running_tasks = registry.list_running();
        assert_eq!(running_tasks.len(), 1);
        assert!(running_tasks.contains_key(&running));
        assert_eq!(registry.list_all().len(), 3);

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert!(registry.get(&pending).is_some());
    }

    #[test]
    fn test_cleanup_removes_old_records_regardless_of_status() {
        let registry = TaskRegistry::new();
        let running = registry.create("mining", Map::new());
        registry.start(&running, "go");
        let _pending = registry.create("mining", Map::new());

        assert_eq!(registry.cleanup(Duration::from_secs(3_600)), 0);
        assert_eq!(registry.len(), 2);

        let removed = registry.cleanup_created_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_serializes_for_api() {
        let registry = TaskRegistry::new();
        let task_id = registry.create("mining", Map::new());
        let value = serde_json::to_value(registry.get(&task_id).unwrap()).unwrap();
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["task_id"], json!(task_id));
        assert!(value["created_at"].is_string());
        assert!(value["completed_at"].is_null());
    }

    #[tokio::test]
    async fn test_cleanup_loop_runs() {
        let registry = Arc::new(TaskRegistry::new());
        registry.create("mining", Map::new());

        let handle = TaskRegistry::spawn_cleanup_loop(
            Arc::clone(&registry),
            Duration::from_millis(20),
            Duration::ZERO,
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert!(registry.is_empty());
    }
}
