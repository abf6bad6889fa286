use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::info;

use crate::app::error::TaskError;
use crate::app::generator::DescriptionGenerator;
use crate::app::models::{Priority, ReorderItem, Task, TaskPatch};
use crate::app::service::TaskService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
    pub generator: Arc<DescriptionGenerator>,
}

// Build the todo API router.
// Routes:
// - `GET    /api/todos` list in display order
// - `POST   /api/todos` create
// - `GET    /api/todos/{id}` get
// - `PUT    /api/todos/{id}` partial update
// - `DELETE /api/todos/{id}` delete
// - `PATCH  /api/todos/{id}/toggle` flip completion
// - `POST   /api/todos/reorder` batch order update
// - `POST   /api/generate-description` suggest a description for a title
// - `GET    /health`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/reorder", post(reorder_todos))
        .route(
            "/api/todos/{id}",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/api/todos/{id}/toggle", patch(toggle_todo))
        .route("/api/generate-description", post(generate_description))
        .route("/health", get(health))
        .with_state(state)
}

// Service calls block (sqlite, blocking http), keep them off the async workers
async fn blocking<T, F>(work: F) -> Result<T, TaskError>
where
    F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TaskError::Backend(format!("worker task failed: {e}")))?
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, TaskError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| TaskError::Validation(rejection.body_text()))
}

fn task_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, TaskError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| TaskError::Validation(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
struct CreateTodoRequest {
    title: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "any_priority")]
    priority: Option<Priority>,
}

// Create never fails on priority: anything but a string counts as absent
fn any_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Priority>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => Some(Priority::parse(&raw)),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct UpdateTodoRequest {
    title: Option<String>,
    description: Option<String>,
    completed: Option<bool>,
    priority: Option<Priority>,
    order: Option<i64>,
}

impl From<UpdateTodoRequest> for TaskPatch {
    fn from(req: UpdateTodoRequest) -> Self {
        TaskPatch {
            title: req.title,
            description: req.description,
            completed: req.completed,
            priority: req.priority,
            order: req.order,
        }
    }
}

// Entries without both fields are ignored, like the browser client expects
#[derive(Debug, Deserialize)]
struct ReorderEntry {
    id: Option<i64>,
    order: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    todo_orders: Option<Vec<ReorderEntry>>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /api/todos
// ---------------------------------------------------------------------------

async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Task>>, TaskError> {
    let tasks = blocking(move || state.service.list()).await?;
    Ok(Json(tasks))
}

// ---------------------------------------------------------------------------
// POST /api/todos
// ---------------------------------------------------------------------------

async fn create_todo(
    State(state): State<AppState>,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, TaskError> {
    let req = body(payload)?;
    let title = req
        .title
        .ok_or_else(|| TaskError::Validation("Title is required".into()))?;

    let task = blocking(move || state.service.create(&title, req.description, req.priority)).await?;
    info!(id = task.id, "todo created");
    Ok((StatusCode::CREATED, Json(task)))
}

// ---------------------------------------------------------------------------
// GET /api/todos/{id}
// ---------------------------------------------------------------------------

async fn get_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Task>, TaskError> {
    let id = task_id(path)?;
    let task = blocking(move || state.service.get(id)).await?;
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// PUT /api/todos/{id}
// ---------------------------------------------------------------------------

async fn update_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateTodoRequest>, JsonRejection>,
) -> Result<Json<Task>, TaskError> {
    let id = task_id(path)?;
    let patch = TaskPatch::from(body(payload)?);
    let task = blocking(move || state.service.update(id, patch)).await?;
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// DELETE /api/todos/{id}
// ---------------------------------------------------------------------------

async fn delete_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, TaskError> {
    let id = task_id(path)?;
    blocking(move || state.service.delete(id)).await?;
    info!(id, "todo deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// PATCH /api/todos/{id}/toggle
// ---------------------------------------------------------------------------

async fn toggle_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Task>, TaskError> {
    let id = task_id(path)?;
    let task = blocking(move || state.service.toggle(id)).await?;
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// POST /api/todos/reorder
// ---------------------------------------------------------------------------

async fn reorder_todos(
    State(state): State<AppState>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<Value>, TaskError> {
    let entries = body(payload)?
        .todo_orders
        .ok_or_else(|| TaskError::Validation("todo_orders is required".into()))?;
    let items: Vec<ReorderItem> = entries
        .into_iter()
        .filter_map(|entry| Some(ReorderItem {
            id: entry.id?,
            order: entry.order?,
        }))
        .collect();

    let summary = blocking(move || state.service.reorder(&items)).await?;
    Ok(Json(json!({
        "success": true,
        "applied": summary.applied,
        "skipped": summary.skipped,
    })))
}

// ---------------------------------------------------------------------------
// POST /api/generate-description
// ---------------------------------------------------------------------------

async fn generate_description(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, TaskError> {
    let title = body(payload)?
        .title
        .ok_or_else(|| TaskError::Validation("Title is required".into()))?;
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(TaskError::Validation("Title cannot be empty".into()));
    }

    let description = blocking(move || Ok(state.generator.generate(&title))).await?;
    Ok(Json(json!({
        "description": description,
        "success": true,
    })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
