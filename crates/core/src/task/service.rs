//! Task service
//!
//! Validation, filtering and logging on top of a [`TaskRepository`].

use std::sync::Arc;

use tracing::{error, info};

use super::model::{NewTask, Task, TaskFilter, TaskUpdate};
use super::repository::TaskRepository;
use crate::{Error, Result};

#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repository: Arc<dyn TaskRepository>) -> Self {
        Self { repository }
    }

    pub async fn add(&self, task: NewTask) -> Result<Task> {
        if task.description.trim().is_empty() {
            return Err(Error::InvalidInput("Description cannot be empty".to_string()));
        }

        match self.repository.create(task).await {
            Ok(created) => {
                info!(id = created.id, status = %created.status, "Created task");
                Ok(created)
            }
            Err(e) => {
                error!(error = %e, "Failed to create task");
                Err(e)
            }
        }
    }

    /// List tasks in insertion order, keeping those matching `filter`
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.repository.list().await.map_err(|e| {
            error!(error = %e, "Failed to list tasks");
            e
        })?;
        Ok(tasks.into_iter().filter(|t| filter.matches(t)).collect())
    }

    pub async fn get(&self, id: u64) -> Result<Task> {
        match self.repository.get(id).await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(Error::TaskNotFound(id)),
            Err(e) => {
                error!(id, error = %e, "Failed to load task");
                Err(e)
            }
        }
    }

    pub async fn update(&self, id: u64, update: TaskUpdate) -> Result<Task> {
        if update
            .description
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            return Err(Error::InvalidInput("Description cannot be empty".to_string()));
        }

        match self.repository.update(id, update).await {
            Ok(updated) => {
                info!(id, status = %updated.status, "Updated task");
                Ok(updated)
            }
            Err(e) => {
                log_failure("update", id, &e);
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: u64) -> Result<Task> {
        match self.repository.delete(id).await {
            Ok(removed) => {
                info!(id, "Deleted task");
                Ok(removed)
            }
            Err(e) => {
                log_failure("delete", id, &e);
                Err(e)
            }
        }
    }
}

fn log_failure(action: &str, id: u64, e: &Error) {
    if e.is_not_found() {
        info!(id, action, "Task not found");
    } else {
        error!(id, action, error = %e, "Task operation failed");
    }
}
