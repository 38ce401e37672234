#![allow(dead_code)]

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

use affinity_core::tasks::{TaskRecord, TaskRegistry};
use std::time::Duration;

/// Poll until the task reaches a terminal state or `timeout` passes
pub async fn wait_for_terminal(
    registry: &TaskRegistry,
    task_id: &str,
    timeout: Duration,
) -> Option<TaskRecord> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(record) = registry.get(task_id) {
            if record.is_finished() {
                return Some(record);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
