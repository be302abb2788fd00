//! Execution progress tracking.
//!
//! `ProgressStore` is an injected, keyed store shared by concurrent runs.
//! Each run only touches its own `execution_id` entry.

use super::depth::ResearchDepth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Progress snapshot emitted after each phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub execution_id: Uuid,
    pub progress_percent: u8,
    pub current_task: String,
    pub completed_tasks: Vec<String>,
}

/// Stored state of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub topic: String,
    pub depth: ResearchDepth,
    pub status: ExecutionStatus,
    pub progress_percent: u8,
    pub current_task: String,
    pub completed_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            execution_id: self.execution_id,
            progress_percent: self.progress_percent,
            current_task: self.current_task.clone(),
            completed_tasks: self.completed_tasks.clone(),
        }
    }

    fn finish_current_task(&mut self) {
        if !self.current_task.is_empty()
            && self.completed_tasks.last() != Some(&self.current_task)
        {
            self.completed_tasks.push(self.current_task.clone());
        }
    }
}

/// Keyed store of execution progress.
#[derive(Debug, Default)]
pub struct ProgressStore {
    records: RwLock<HashMap<Uuid, ExecutionRecord>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running execution and return its id.
    pub fn create(&self, topic: &str, depth: ResearchDepth) -> Uuid {
        let execution_id = Uuid::new_v4();
        let now = Utc::now();
        let record = ExecutionRecord {
            execution_id,
            topic: topic.to_string(),
            depth,
            status: ExecutionStatus::Running,
            progress_percent: 0,
            current_task: String::new(),
            completed_tasks: Vec::new(),
            error: None,
            started_at: now,
            updated_at: now,
        };
        self.write().insert(execution_id, record);
        execution_id
    }

    /// Move an execution to a new task. The previous task is marked completed.
    ///
    /// Progress never decreases. Returns `None` for unknown ids.
    pub fn update(&self, id: Uuid, progress_percent: u8, task: &str) -> Option<ProgressUpdate> {
        let mut records = self.write();
        let record = records.get_mut(&id)?;
        record.finish_current_task();
        record.current_task = task.to_string();
        record.progress_percent = record.progress_percent.max(progress_percent.min(100));
        record.updated_at = Utc::now();
        Some(record.snapshot())
    }

    pub fn complete(&self, id: Uuid) -> Option<ProgressUpdate> {
        let mut records = self.write();
        let record = records.get_mut(&id)?;
        record.finish_current_task();
        record.current_task = "completed".to_string();
        record.status = ExecutionStatus::Completed;
        record.progress_percent = 100;
        record.updated_at = Utc::now();
        Some(record.snapshot())
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> Option<ProgressUpdate> {
        let mut records = self.write();
        let record = records.get_mut(&id)?;
        record.status = ExecutionStatus::Failed;
        record.error = Some(error.into());
        record.updated_at = Utc::now();
        Some(record.snapshot())
    }

    /// Remove an execution from the store.
    pub fn evict(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.write().remove(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, ExecutionRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receives progress updates from a running pipeline.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Sink that discards every update.
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}
