//! Application state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracker_core::task::{FileTaskStore, TaskService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    tasks_file: PathBuf,
    task_service: TaskService,
}

impl AppState {
    /// Open the task store at `tasks_file`
    pub async fn new(tasks_file: PathBuf) -> tracker_core::Result<Self> {
        let task_store = FileTaskStore::open(tasks_file.clone()).await?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                tasks_file,
                task_service: TaskService::new(Arc::new(task_store)),
            }),
        })
    }

    /// Get reference to the task service
    pub fn task_service(&self) -> &TaskService {
        &self.inner.task_service
    }

    pub fn tasks_file(&self) -> &Path {
        &self.inner.tasks_file
    }
}
