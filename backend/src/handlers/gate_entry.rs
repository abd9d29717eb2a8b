//! Gate entry HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{CreateGateEntryInput, GateEntryStatus};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::GateEntryService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GateEntryQuery {
    /// Status label, e.g. "Awaiting GRN"
    pub status: Option<String>,
}

/// List gate entries, newest first
pub async fn list_gate_entries(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<GateEntryQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref().map(|s| {
        GateEntryStatus::from_str(s).ok_or_else(|| AppError::validation("status", "Unknown gate entry status"))
    }) {
        Some(Err(e)) => return e.into_response(),
        Some(Ok(status)) => Some(status),
        None => None,
    };

    let service = GateEntryService::new(state.store.clone());

    match service.list_gate_entries(&current_user.0, status).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a gate entry
pub async fn get_gate_entry(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let service = GateEntryService::new(state.store.clone());

    match service.get_gate_entry(&current_user.0, id).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a gate entry
pub async fn create_gate_entry(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateGateEntryInput>,
) -> impl IntoResponse {
    let service = GateEntryService::new(state.store.clone());

    match service.create_gate_entry(&current_user.0, input).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => e.into_response(),
    }
}
