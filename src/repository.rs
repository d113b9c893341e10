//! Owned storage for the task service's live task list.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::models::event::TaskPayload;

pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task under the next free id. Any `id` in `fields` is
    /// ignored.
    async fn create(&self, fields: Map<String, JsonValue>) -> TaskRepositoryResult<TaskPayload>;

    async fn get(&self, id: i64) -> TaskRepositoryResult<Option<TaskPayload>>;

    /// Merges `fields` into the stored task in one step and returns the
    /// result, or `None` when it does not exist. `id` in `fields` is ignored.
    async fn update(
        &self,
        id: i64,
        fields: Map<String, JsonValue>,
    ) -> TaskRepositoryResult<Option<TaskPayload>>;

    /// Removes and returns the task, or `None` when it does not exist.
    async fn delete(&self, id: i64) -> TaskRepositoryResult<Option<TaskPayload>>;
}

#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    #[error("task storage failure: {0}")]
    Persistence(String),
}

/// Ids come from a counter that never goes backwards, so a deleted task's
/// id is never handed out again.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<TaskState>>,
}

#[derive(Debug, Default)]
struct TaskState {
    last_id: i64,
    tasks: BTreeMap<i64, TaskPayload>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl std::fmt::Display) -> TaskRepositoryError {
    TaskRepositoryError::Persistence(err.to_string())
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, fields: Map<String, JsonValue>) -> TaskRepositoryResult<TaskPayload> {
        let mut state = self.state.write().map_err(poisoned)?;

        state.last_id += 1;
        let mut task = TaskPayload::new(state.last_id);
        task.merge(fields);

        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: i64) -> TaskRepositoryResult<Option<TaskPayload>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn update(
        &self,
        id: i64,
        fields: Map<String, JsonValue>,
    ) -> TaskRepositoryResult<Option<TaskPayload>> {
        let mut state = self.state.write().map_err(poisoned)?;

        Ok(state.tasks.get_mut(&id).map(|task| {
            task.merge(fields);
            task.clone()
        }))
    }

    async fn delete(&self, id: i64) -> TaskRepositoryResult<Option<TaskPayload>> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state.tasks.remove(&id))
    }
}
