use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use serde_json::{Map, Value as JsonValue, json};
use tokio::sync::Mutex;
use tracing::error;

use crate::{
    api::health_response,
    clients::health::HealthChecker,
    models::event::{EventType, TaskPayload},
    publisher::EventPublisher,
    repository::{TaskRepository, TaskRepositoryError},
};

/// Set to `false` on a successful mutation whose event never reached the
/// broker.
pub const EVENT_PUBLISHED_HEADER: &str = "x-event-published";

pub struct TaskApiState {
    repository: Arc<dyn TaskRepository>,
    publisher: EventPublisher,
    health_checker: HealthChecker,
    // Held across a mutation and its publish so events leave in the same
    // order the mutations were applied.
    mutations: Mutex<()>,
}

impl TaskApiState {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        publisher: EventPublisher,
        health_checker: HealthChecker,
    ) -> Self {
        Self {
            repository,
            publisher,
            health_checker,
            mutations: Mutex::new(()),
        }
    }
}

pub fn router(state: Arc<TaskApiState>) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn create_task(
    State(state): State<Arc<TaskApiState>>,
    Json(fields): Json<Map<String, JsonValue>>,
) -> Response {
    let _guard = state.mutations.lock().await;

    let task = match state.repository.create(fields).await {
        Ok(task) => task,
        Err(e) => return storage_failure(e),
    };

    let published = publish(&state, EventType::Created, &task).await;
    task_response(StatusCode::CREATED, &task, published)
}

async fn update_task(
    State(state): State<Arc<TaskApiState>>,
    Path(id): Path<i64>,
    Json(fields): Json<Map<String, JsonValue>>,
) -> Response {
    let _guard = state.mutations.lock().await;

    let task = match state.repository.update(id, fields).await {
        Ok(Some(task)) => task,
        Ok(None) => return task_not_found(),
        Err(e) => return storage_failure(e),
    };

    let published = publish(&state, EventType::Updated, &task).await;
    task_response(StatusCode::OK, &task, published)
}

async fn delete_task(State(state): State<Arc<TaskApiState>>, Path(id): Path<i64>) -> Response {
    let _guard = state.mutations.lock().await;

    let task = match state.repository.delete(id).await {
        Ok(Some(task)) => task,
        Ok(None) => return task_not_found(),
        Err(e) => return storage_failure(e),
    };

    let published = publish(&state, EventType::Deleted, &task).await;
    task_response(StatusCode::OK, &task, published)
}

async fn health_check(State(state): State<Arc<TaskApiState>>) -> impl IntoResponse {
    health_response(state.health_checker.check_all().await)
}

/// The mutation has already been applied; a publish failure only degrades
/// the response.
async fn publish(state: &TaskApiState, event_type: EventType, task: &TaskPayload) -> bool {
    state
        .publisher
        .publish_task_event(event_type, task)
        .await
        .is_ok()
}

fn task_response(status: StatusCode, task: &TaskPayload, published: bool) -> Response {
    let mut response = (status, Json(task)).into_response();

    if !published {
        response
            .headers_mut()
            .insert(EVENT_PUBLISHED_HEADER, HeaderValue::from_static("false"));
    }

    response
}

fn task_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Task not found" })),
    )
        .into_response()
}

fn storage_failure(e: TaskRepositoryError) -> Response {
    error!(error = %e, "Task storage failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Task storage failure" })),
    )
        .into_response()
}
