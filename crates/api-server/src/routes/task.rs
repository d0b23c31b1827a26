//! Task API endpoints
//!
//! RESTful API for task CRUD operations.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use tracker_core::task::{
    NewTask, StatusMatch, Task, TaskFilter, TaskStatus, TaskUpdate, TIMESTAMP_FORMAT,
};
use tracker_core::Error;

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    #[serde(default)]
    pub status: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub not_status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: u64,
    pub description: String,
    pub status: TaskStatus,
    pub status_label: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            description: task.description,
            status: task.status,
            status_label: task.status.to_string(),
            created_at: task.created_at.format(TIMESTAMP_FORMAT).to_string(),
            updated_at: task.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::TaskNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!("Task request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Malformed bodies are input errors, reported in the same shape as the rest
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: rejection.body_text(),
            }),
        )
    })
}

fn parse_status(raw: Option<i64>) -> Result<Option<TaskStatus>, ApiError> {
    raw.map(|code| {
        u8::try_from(code)
            .map_err(|_| Error::InvalidInput(format!("Unknown task status {}", code)))
            .and_then(TaskStatus::try_from)
    })
    .transpose()
    .map_err(api_error)
}

impl ListTasksQuery {
    fn into_filter(self) -> Result<TaskFilter, ApiError> {
        let parse = |raw: Option<String>| -> Result<Option<TaskStatus>, ApiError> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => s.parse().map(Some).map_err(api_error),
            }
        };

        let status = match (parse(self.status)?, parse(self.not_status)?) {
            (Some(_), Some(_)) => {
                return Err(api_error(Error::InvalidInput(
                    "status and notStatus cannot be combined".to_string(),
                )))
            }
            (Some(s), None) => Some(StatusMatch::Is(s)),
            (None, Some(s)) => Some(StatusMatch::IsNot(s)),
            (None, None) => None,
        };

        Ok(TaskFilter {
            status,
            description: self.description.filter(|d| !d.is_empty()),
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /tasks - List tasks, optionally filtered
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let filter = query.into_filter()?;
    let tasks = state.task_service().list(&filter).await.map_err(api_error)?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// POST /tasks - Create a new task
async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let req = json_body(payload)?;
    let mut task = NewTask::new(req.description);
    if let Some(status) = parse_status(req.status)? {
        task = task.with_status(status);
    }

    let created = state.task_service().add(task).await.map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(created))))
}

/// GET /tasks/{id} - Get a single task
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.task_service().get(id).await.map_err(api_error)?;
    Ok(Json(TaskResponse::from(task)))
}

/// PUT /tasks/{id} - Update description and/or status
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let req = json_body(payload)?;
    let update = TaskUpdate {
        description: req.description,
        status: parse_status(req.status)?,
    };

    let updated = state
        .task_service()
        .update(id, update)
        .await
        .map_err(api_error)?;

    Ok(Json(TaskResponse::from(updated)))
}

/// DELETE /tasks/{id} - Delete a task
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.task_service().delete(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}
