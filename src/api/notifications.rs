use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::json;
use tracing::error;

use crate::{
    api::health_response,
    clients::{health::HealthChecker, store::NotificationStore},
};

pub struct NotificationApiState {
    pub store: Arc<dyn NotificationStore>,
    pub health_checker: HealthChecker,
}

pub fn router(state: Arc<NotificationApiState>) -> Router {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn list_notifications(State(state): State<Arc<NotificationApiState>>) -> Response {
    match state.store.list_all().await {
        Ok(notifications) => (StatusCode::OK, Json(notifications)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to fetch notifications");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch notifications" })),
            )
                .into_response()
        }
    }
}

async fn health_check(State(state): State<Arc<NotificationApiState>>) -> impl IntoResponse {
    health_response(state.health_checker.check_all().await)
}
