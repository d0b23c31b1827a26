//! Task repository trait
//!
//! Defines the interface for task storage operations.

use async_trait::async_trait;

use super::model::{NewTask, Task, TaskUpdate};
use crate::Result;

/// Repository interface for task CRUD operations
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Store a new task, assigning its id and timestamps
    async fn create(&self, task: NewTask) -> Result<Task>;

    /// Get all tasks in insertion order
    async fn list(&self) -> Result<Vec<Task>>;

    /// Get a task by ID
    async fn get(&self, id: u64) -> Result<Option<Task>>;

    /// Apply a partial update to an existing task
    async fn update(&self, id: u64, update: TaskUpdate) -> Result<Task>;

    /// Delete a task by ID, returning the removed record
    async fn delete(&self, id: u64) -> Result<Task>;
}
