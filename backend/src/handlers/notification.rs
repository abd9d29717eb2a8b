//! Notification and task HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::services::NotificationService;
use crate::AppState;

/// List the current user's notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    let service = NotificationService::new(state.store.clone());

    match service.notifications(&current_user.0).await {
        Ok(notifications) => (StatusCode::OK, Json(notifications)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_unread_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> impl IntoResponse {
    let service = NotificationService::new(state.store.clone());

    match service.unread_count(&current_user.0).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "unread": count }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Mark a notification as read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let service = NotificationService::new(state.store.clone());

    match service.mark_read(&current_user.0, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// List the current user's tasks
pub async fn list_tasks(State(state): State<AppState>, current_user: CurrentUser) -> impl IntoResponse {
    let service = NotificationService::new(state.store.clone());

    match service.tasks(&current_user.0).await {
        Ok(tasks) => (StatusCode::OK, Json(tasks)).into_response(),
        Err(e) => e.into_response(),
    }
}
