//! File-based task storage implementation
//!
//! Stores tasks as a JSON array in a single file on disk. Appends overwrite
//! the closing marker with a single positioned write; updates and deletes
//! parse the whole array, edit it and rewrite the file.
//!
//! The rewrite truncates before writing, so a crash in between leaves an
//! empty or partial file.

use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::codec::{self, CLOSING_MARKER, EMPTY_DOCUMENT};
use super::model::{self, NewTask, Task, TaskUpdate};
use super::repository::TaskRepository;
use crate::{Error, Result};

/// Bookkeeping that must match the file's current bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoreState {
    /// Offset where the closing marker begins
    offset: u64,
    /// Highest id handed out so far
    last_id: u64,
    /// Number of records in the file
    len: usize,
}

impl StoreState {
    fn new(tasks: &[Task], document_len: usize) -> Self {
        Self {
            offset: (document_len - CLOSING_MARKER.len()) as u64,
            last_id: tasks.iter().map(|t| t.id).max().unwrap_or(0),
            len: tasks.len(),
        }
    }
}

/// File-based task store using a JSON array
///
/// Every operation holds one lock for its whole duration and opens its own
/// file handle. Modifying the file behind the store's back is not supported.
pub struct FileTaskStore {
    /// Path to the JSON file
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileTaskStore {
    /// Open the store at `path`
    ///
    /// A missing or empty file is created with the empty array. An existing
    /// file must parse as an array of tasks; if it is not laid out one record
    /// per line it is rewritten in that layout once.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = Self::load_state(&path)
            .await
            .map_err(|e| Error::StoreInit {
                path: path.clone(),
                source: Box::new(e),
            })?;

        info!(
            path = %path.display(),
            tasks = state.len,
            next_id = state.last_id + 1,
            "Opened task store"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_state(path: &Path) -> Result<StoreState> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(Error::io("create directory", parent))?;
        }

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::io("read", path)(e)),
        };

        if content.is_empty() {
            write_document(path, EMPTY_DOCUMENT).await?;
            return Ok(StoreState::new(&[], EMPTY_DOCUMENT.len()));
        }

        let tasks = codec::decode_document(&content).map_err(Error::corrupt(path))?;
        let canonical = codec::encode_document(&tasks)?;
        if canonical != content {
            warn!(path = %path.display(), "Task file is not in canonical layout, rewriting");
            write_document(path, &canonical).await?;
        }

        Ok(StoreState::new(&tasks, canonical.len()))
    }

    async fn read_tasks(&self) -> Result<Vec<Task>> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(Error::io("read", &self.path))?;
        codec::decode_document(&content).map_err(Error::corrupt(&self.path))
    }

    /// Replace the whole file with `tasks` and resync the bookkeeping
    async fn rewrite(&self, state: &mut StoreState, tasks: &[Task]) -> Result<()> {
        let document = codec::encode_document(tasks)?;
        write_document(&self.path, &document).await?;
        *state = StoreState {
            last_id: state.last_id,
            ..StoreState::new(tasks, document.len())
        };
        Ok(())
    }
}

async fn write_document(path: &Path, document: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(Error::io("open", path))?;
    file.write_all(document.as_bytes())
        .await
        .map_err(Error::io("write", path))?;
    file.flush().await.map_err(Error::io("flush", path))?;
    Ok(())
}

#[async_trait]
impl TaskRepository for FileTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let mut state = self.state.lock().await;

        let task = task.into_task(state.last_id + 1, model::now());
        let chunk = codec::append_chunk(&task, state.len == 0)?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(Error::io("open", &self.path))?;
        file.seek(SeekFrom::Start(state.offset))
            .await
            .map_err(Error::io("seek", &self.path))?;
        file.write_all(chunk.as_bytes())
            .await
            .map_err(Error::io("write", &self.path))?;
        file.flush().await.map_err(Error::io("flush", &self.path))?;

        state.offset += (chunk.len() - CLOSING_MARKER.len()) as u64;
        state.last_id = task.id;
        state.len += 1;

        debug!(id = task.id, offset = state.offset, "Appended task");
        Ok(task)
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let _state = self.state.lock().await;
        self.read_tasks().await
    }

    async fn get(&self, id: u64) -> Result<Option<Task>> {
        let tasks = self.list().await?;
        Ok(tasks.into_iter().find(|t| t.id == id))
    }

    async fn update(&self, id: u64, update: TaskUpdate) -> Result<Task> {
        let mut state = self.state.lock().await;

        let mut tasks = self.read_tasks().await?;
        let position = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::TaskNotFound(id))?;
        update.apply_to(&mut tasks[position], model::now());

        self.rewrite(&mut state, &tasks).await?;

        debug!(id, "Updated task");
        Ok(tasks.swap_remove(position))
    }

    async fn delete(&self, id: u64) -> Result<Task> {
        let mut state = self.state.lock().await;

        let mut tasks = self.read_tasks().await?;
        let position = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::TaskNotFound(id))?;
        let removed = tasks.remove(position);

        self.rewrite(&mut state, &tasks).await?;

        debug!(id, remaining = state.len, "Deleted task");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileTaskStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        let store = FileTaskStore::open(&path).await.unwrap();
        (store, temp_dir)
    }

    async fn file_content(store: &FileTaskStore) -> String {
        fs::read_to_string(store.path()).await.unwrap()
    }

    async fn create_n(store: &FileTaskStore, n: usize) -> Vec<Task> {
        let mut created = Vec::with_capacity(n);
        for i in 0..n {
            created.push(store.create(NewTask::new(format!("Task {}", i))).await.unwrap());
        }
        created
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let (store, _temp) = create_test_store().await;

        assert_eq!(file_content(&store).await, "[\n\n]");
        let state = *store.state.lock().await;
        assert_eq!(state.offset, 2);
        assert_eq!(state.last_id, 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("tasks.json");

        FileTaskStore::open(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), EMPTY_DOCUMENT);
    }

    #[tokio::test]
    async fn test_open_existing_empty_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        std::fs::write(&path, "[\n\n]").unwrap();

        let store = FileTaskStore::open(&path).await.unwrap();
        let created = store.create(NewTask::new("first")).await.unwrap();

        assert_eq!(created.id, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let result = FileTaskStore::open(&path).await;
        match result {
            Err(Error::StoreInit { source, .. }) => {
                assert!(matches!(*source, Error::Corrupt { .. }));
            }
            Err(e) => panic!("Expected StoreInit error, got: {:?}", e),
            Ok(_) => panic!("Expected StoreInit error"),
        }
    }

    #[tokio::test]
    async fn test_open_normalizes_pretty_printed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[
  {
    "Id": 3,
    "Description": "pretty",
    "Status": 1,
    "CreatedAt": "2009-11-17 20:34:58.651",
    "UpdatedAt": "2009-11-17 20:34:58.651"
  }
]
"#,
        )
        .unwrap();

        let store = FileTaskStore::open(&path).await.unwrap();
        let content = file_content(&store).await;
        assert!(content.starts_with("[\n{\"Id\":3,"));
        assert!(content.ends_with("}\n]"));

        let created = store.create(NewTask::new("next")).await.unwrap();
        assert_eq!(created.id, 4);
        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let (store, _temp) = create_test_store().await;

        let first = store.create(NewTask::new("write spec")).await.unwrap();
        assert_eq!(first.id, 1);
        let first_line = codec::encode_record(&first).unwrap();
        assert_eq!(file_content(&store).await, format!("[\n{}\n]", first_line));

        let second = store
            .create(NewTask::new("review spec").with_status(TaskStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(second.id, 2);
        let second_line = codec::encode_record(&second).unwrap();
        assert_eq!(
            file_content(&store).await,
            format!("[\n{},\n{}\n]", first_line, second_line)
        );

        store.delete(1).await.unwrap();
        assert_eq!(file_content(&store).await, format!("[\n{}\n]", second_line));
        assert_eq!(store.list().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn test_create_task() {
        let (store, _temp) = create_test_store().await;

        let created = store
            .create(NewTask::new("Test task").with_status(TaskStatus::Done))
            .await
            .unwrap();

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0], created);
        assert_eq!(tasks[0].description, "Test task");
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[0].created_at, tasks[0].updated_at);
        assert!(tasks[0].id > 0);
    }

    #[tokio::test]
    async fn test_file_stays_valid_after_every_append() {
        let (store, _temp) = create_test_store().await;

        for i in 1..=10u64 {
            let created = store.create(NewTask::new(format!("Task {}", i))).await.unwrap();
            assert_eq!(created.id, i);

            let content = file_content(&store).await;
            let parsed = codec::decode_document(&content).unwrap();
            assert_eq!(parsed.len() as u64, i);
            assert!(content.ends_with(CLOSING_MARKER));
        }
    }

    #[tokio::test]
    async fn test_get_task() {
        let (store, _temp) = create_test_store().await;
        let created = create_n(&store, 3).await;

        let retrieved = store.get(created[1].id).await.unwrap();
        assert_eq!(retrieved, Some(created[1].clone()));

        // Test non-existent task
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_task() {
        let (store, _temp) = create_test_store().await;
        let created = create_n(&store, 3).await;
        let before = file_content(&store).await;

        let updated = store
            .update(
                2,
                TaskUpdate::default()
                    .description("Updated description")
                    .status(TaskStatus::InProgress),
            )
            .await
            .unwrap();

        assert_eq!(updated.id, 2);
        assert_eq!(updated.description, "Updated description");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.created_at, created[1].created_at);
        assert!(updated.updated_at > updated.created_at);

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1], updated);

        // Untouched records keep their exact lines and positions
        let after = file_content(&store).await;
        let before_lines: Vec<&str> = before.lines().collect();
        let after_lines: Vec<&str> = after.lines().collect();
        assert_eq!(before_lines.len(), after_lines.len());
        assert_eq!(before_lines[1], after_lines[1]);
        assert_ne!(before_lines[2], after_lines[2]);
        assert_eq!(before_lines[3], after_lines[3]);
    }

    #[tokio::test]
    async fn test_immediate_update_is_strictly_later() {
        let (store, _temp) = create_test_store().await;

        for i in 0..50 {
            let created = store.create(NewTask::new(format!("Task {}", i))).await.unwrap();
            let updated = store
                .update(created.id, TaskUpdate::default().status(TaskStatus::Done))
                .await
                .unwrap();
            assert!(updated.updated_at > updated.created_at);
            assert_eq!(store.get(created.id).await.unwrap(), Some(updated));
        }
    }

    #[tokio::test]
    async fn test_failed_append_does_not_advance_state() {
        let (store, _temp) = create_test_store().await;
        store.create(NewTask::new("first")).await.unwrap();
        let content = file_content(&store).await;
        let before = *store.state.lock().await;

        fs::remove_file(store.path()).await.unwrap();
        let err = store.create(NewTask::new("lost")).await.unwrap_err();
        assert!(matches!(err, Error::Io { op: "open", .. }));
        assert_eq!(*store.state.lock().await, before);

        fs::write(store.path(), &content).await.unwrap();
        let created = store.create(NewTask::new("second")).await.unwrap();
        assert_eq!(created.id, 2);

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            codec::decode_document(&file_content(&store).await).unwrap(),
            tasks
        );
    }

    #[tokio::test]
    async fn test_append_after_update() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 2).await;

        store
            .update(1, TaskUpdate::default().description("a much longer description than before"))
            .await
            .unwrap();
        let created = store.create(NewTask::new("after update")).await.unwrap();

        assert_eq!(created.id, 3);
        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(tasks[0].description, "a much longer description than before");
    }

    #[tokio::test]
    async fn test_update_nonexistent_task() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 2).await;
        let before = file_content(&store).await;

        let result = store.update(42, TaskUpdate::default().description("nope")).await;

        match result.unwrap_err() {
            Error::TaskNotFound(42) => {}
            e => panic!("Expected TaskNotFound error, got: {:?}", e),
        }
        assert_eq!(file_content(&store).await, before);
    }

    #[tokio::test]
    async fn test_delete_only_task() {
        let (store, _temp) = create_test_store().await;
        let created = store.create(NewTask::new("Task to delete")).await.unwrap();

        let removed = store.delete(created.id).await.unwrap();
        assert_eq!(removed, created);

        assert_eq!(file_content(&store).await, EMPTY_DOCUMENT);
        assert!(store.list().await.unwrap().is_empty());

        // Ids are not reused within the same store
        let next = store.create(NewTask::new("again")).await.unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(store.list().await.unwrap(), vec![next]);
    }

    #[tokio::test]
    async fn test_delete_last_of_many() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 5).await;

        store.delete(5).await.unwrap();

        let content = file_content(&store).await;
        assert!(!content.contains(",\n]"));
        let tasks = codec::decode_document(&content).unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let created = store.create(NewTask::new("tail")).await.unwrap();
        assert_eq!(created.id, 6);
        assert_eq!(store.list().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_delete_middle_task() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 5).await;

        store.delete(3).await.unwrap();

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_delete_first_task() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 2).await;

        store.delete(1).await.unwrap();

        let content = file_content(&store).await;
        assert!(content.starts_with("[\n{\"Id\":2,"));
        assert_eq!(codec::decode_document(&content).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_task() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 2).await;
        let before = file_content(&store).await;

        let err = store.delete(7).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(file_content(&store).await, before);
    }

    #[tokio::test]
    async fn test_update_matches_exact_id() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 12).await;

        store
            .update(1, TaskUpdate::default().description("only one"))
            .await
            .unwrap();

        let tasks = store.list().await.unwrap();
        let changed: Vec<u64> = tasks
            .iter()
            .filter(|t| t.description == "only one")
            .map(|t| t.id)
            .collect();
        assert_eq!(changed, vec![1]);
        assert_eq!(tasks[9].description, "Task 9");
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        // Create store and add tasks
        {
            let store = FileTaskStore::open(&path).await.unwrap();
            create_n(&store, 3).await;
            store.delete(2).await.unwrap();
        }

        // Create new store instance and verify data persisted
        {
            let store = FileTaskStore::open(&path).await.unwrap();
            let tasks = store.list().await.unwrap();
            assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);

            let created = store.create(NewTask::new("resumed")).await.unwrap();
            assert_eq!(created.id, 4);
        }
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let (store, _temp) = create_test_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create(NewTask::new(format!("Task {}", i))).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.len(), 20);
        assert!(tasks.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_list_reports_corruption() {
        let (store, _temp) = create_test_store().await;
        create_n(&store, 1).await;
        std::fs::write(store.path(), "[\n{\"Id\":1,\n]").unwrap();

        let err = store.list().await.unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }
}
